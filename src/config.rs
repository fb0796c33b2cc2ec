use rand::Rng;
use serde::Deserialize;
use std::path::PathBuf;

use crate::spotify::accounts::DEFAULT_ACCOUNTS_URL;
use crate::spotify::client::DEFAULT_API_URL;

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Port to listen on
    pub port: u16,
    /// Path to the SQLite database
    pub database_path: PathBuf,
    pub spotify: SpotifyConfig,
    pub link: LinkConfig,
}

/// Client registration with the playback service
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct SpotifyConfig {
    pub client_id: String,
    pub client_secret: String,
    /// Where the provider sends users back after granting access
    pub redirect_uri: String,
    pub accounts_url: String,
    pub api_url: String,
    pub scopes: Vec<String>,
}

/// Account linking settings
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Key for signing link states. A random key is used when unset, which
    /// invalidates pending links on restart.
    pub secret: Option<String>,
    /// Minutes a pending link stays valid
    pub expiry_minutes: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let data_dir = dirs::data_dir().unwrap_or_else(|| PathBuf::from("."));
        Self {
            port: 8080,
            database_path: data_dir.join("jamsync").join("jamsync.db"),
            spotify: SpotifyConfig::default(),
            link: LinkConfig::default(),
        }
    }
}

impl Default for SpotifyConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            redirect_uri: "http://localhost:8080/api/spotify/login/callback".to_string(),
            accounts_url: DEFAULT_ACCOUNTS_URL.to_string(),
            api_url: DEFAULT_API_URL.to_string(),
            scopes: vec![
                "user-read-playback-state".to_string(),
                "user-modify-playback-state".to_string(),
                "user-read-currently-playing".to_string(),
                "user-library-read".to_string(),
            ],
        }
    }
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            secret: None,
            expiry_minutes: 10,
        }
    }
}

impl std::fmt::Debug for SpotifyConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpotifyConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("redirect_uri", &self.redirect_uri)
            .field("accounts_url", &self.accounts_url)
            .field("api_url", &self.api_url)
            .field("scopes", &self.scopes)
            .finish()
    }
}

impl std::fmt::Debug for LinkConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkConfig")
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .field("expiry_minutes", &self.expiry_minutes)
            .finish()
    }
}

impl ServerConfig {
    /// Load configuration with priority: env vars > config file > defaults
    pub fn load(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        // Start with defaults
        let mut config = Self::default();

        // Explicit path, then JAMSYNC_CONFIG, then ~/.config
        let path = config_path
            .or_else(|| std::env::var("JAMSYNC_CONFIG").ok().map(PathBuf::from))
            .unwrap_or_else(Self::default_config_path);
        if path.exists() {
            // Keys missing from the file keep their defaults
            let contents = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadError(path.clone(), e))?;
            config = serde_yaml::from_str(&contents)
                .map_err(|e| ConfigError::ParseError(path.clone(), e))?;
        }

        // Apply environment variable overrides
        if let Ok(port) = std::env::var("JAMSYNC_PORT") {
            config.port = port
                .parse()
                .map_err(|_| ConfigError::InvalidValue("JAMSYNC_PORT".to_string(), port))?;
        }
        if let Ok(db_path) = std::env::var("JAMSYNC_DATABASE_PATH") {
            config.database_path = PathBuf::from(db_path);
        }
        if let Ok(client_id) = std::env::var("JAMSYNC_SPOTIFY_CLIENT_ID") {
            config.spotify.client_id = client_id;
        }
        if let Ok(client_secret) = std::env::var("JAMSYNC_SPOTIFY_CLIENT_SECRET") {
            config.spotify.client_secret = client_secret;
        }
        if let Ok(redirect_uri) = std::env::var("JAMSYNC_SPOTIFY_REDIRECT_URI") {
            config.spotify.redirect_uri = redirect_uri;
        }
        if let Ok(secret) = std::env::var("JAMSYNC_LINK_SECRET") {
            config.link.secret = Some(secret);
        }

        Ok(config)
    }

    /// Checks settings the server cannot run without.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.spotify.client_id.is_empty() {
            return Err(ConfigError::MissingSetting("spotify.client_id"));
        }
        if self.spotify.client_secret.is_empty() {
            return Err(ConfigError::MissingSetting("spotify.client_secret"));
        }
        Ok(())
    }

    /// Default config file path: ~/.config/jamsync/config.yaml
    pub fn default_config_path() -> PathBuf {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        home.join(".config").join("jamsync").join("config.yaml")
    }
}

impl LinkConfig {
    /// The configured signing key, or a random one.
    pub fn secret_bytes(&self) -> Vec<u8> {
        match &self.secret {
            Some(secret) => secret.as_bytes().to_vec(),
            None => {
                // Pending links will not survive a restart
                tracing::warn!("link.secret not set, using a random key");
                let mut bytes = [0u8; 32];
                rand::rng().fill(&mut bytes);
                bytes.to_vec()
            }
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    ReadError(PathBuf, std::io::Error),
    ParseError(PathBuf, serde_yaml::Error),
    InvalidValue(String, String),
    MissingSetting(&'static str),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::ReadError(path, e) => {
                write!(f, "Failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::ParseError(path, e) => {
                write!(
                    f,
                    "Failed to parse config file '{}': {}",
                    path.display(),
                    e
                )
            }
            ConfigError::InvalidValue(name, value) => {
                write!(f, "Invalid value for {}: '{}'", name, value)
            }
            ConfigError::MissingSetting(name) => write!(f, "Missing required setting: {}", name),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert!(config.database_path.to_string_lossy().contains("jamsync.db"));
        assert_eq!(config.link.expiry_minutes, 10);
        assert_eq!(config.spotify.accounts_url, "https://accounts.spotify.com");
        assert!(config
            .spotify
            .redirect_uri
            .ends_with("/api/spotify/login/callback"));
    }

    #[test]
    fn test_load_no_file_uses_defaults() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("nonexistent.yaml");

        let config = ServerConfig::load(Some(config_path)).unwrap();
        assert_eq!(config.link.expiry_minutes, 10);
    }

    #[test]
    fn test_load_from_file() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(file, "database_path: /custom/path/db.sqlite").unwrap();
        writeln!(file, "spotify:").unwrap();
        writeln!(file, "  client_secret: shh").unwrap();
        writeln!(file, "  scopes: [user-read-playback-state]").unwrap();
        writeln!(file, "link:").unwrap();
        writeln!(file, "  expiry_minutes: 5").unwrap();

        let config = ServerConfig::load(Some(config_path)).unwrap();
        assert_eq!(
            config.database_path,
            PathBuf::from("/custom/path/db.sqlite")
        );
        assert_eq!(config.spotify.client_secret, "shh");
        assert_eq!(config.spotify.scopes, vec!["user-read-playback-state"]);
        // Unset nested fields keep their defaults
        assert_eq!(config.spotify.api_url, "https://api.spotify.com/v1");
        assert_eq!(config.link.expiry_minutes, 5);
    }

    #[test]
    fn test_env_var_overrides_file() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(file, "spotify:").unwrap();
        writeln!(file, "  client_id: fromfile").unwrap();

        std::env::set_var("JAMSYNC_SPOTIFY_CLIENT_ID", "fromenv");

        let config = ServerConfig::load(Some(config_path)).unwrap();
        assert_eq!(config.spotify.client_id, "fromenv");

        std::env::remove_var("JAMSYNC_SPOTIFY_CLIENT_ID");
    }

    #[test]
    fn test_invalid_yaml_error() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(file, "invalid: yaml: content: [").unwrap();

        let result = ServerConfig::load(Some(config_path));
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }

    #[test]
    fn test_validate_requires_client_credentials() {
        let mut config = ServerConfig::default();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingSetting("spotify.client_id"))
        ));

        config.spotify.client_id = "id".to_string();
        config.spotify.client_secret = "secret".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let mut config = ServerConfig::default();
        config.spotify.client_secret = "top-secret".to_string();
        config.link.secret = Some("link-key".to_string());

        let debug = format!("{:?}", config);
        assert!(!debug.contains("top-secret"));
        assert!(!debug.contains("link-key"));
    }

    #[test]
    fn test_secret_bytes() {
        let link = LinkConfig {
            secret: Some("abc".to_string()),
            expiry_minutes: 10,
        };
        assert_eq!(link.secret_bytes(), b"abc".to_vec());

        let random = LinkConfig::default();
        assert_eq!(random.secret_bytes().len(), 32);
    }
}
