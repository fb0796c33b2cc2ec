//! Jamsync Admin CLI
//!
//! Administration tool for managing users of the sync server.
//!
//! # Usage
//!
//! ```bash
//! jamsync-admin user add erik
//! jamsync-admin user list
//! jamsync-admin user remove erik
//! ```
//!
//! Uses the same configuration as the server (`JAMSYNC_CONFIG`,
//! `JAMSYNC_DATABASE_PATH`). Run `user remove` while the server is stopped:
//! a running server keeps its own copy of the group index.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use jamsync::accounts::AccountService;
use jamsync::config::ServerConfig;
use jamsync::db::{init_db, GroupRepository, UserRepository};
use jamsync::registry::{GroupRegistry, RandomLeader};

// ============================================================================
// CLI Structure
// ============================================================================

#[derive(Parser)]
#[command(name = "jamsync-admin")]
#[command(version)]
#[command(about = "Jamsync server administration tool")]
struct Cli {
    /// Path to the config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage users
    User(UserCommand),
}

#[derive(Args)]
struct UserCommand {
    #[command(subcommand)]
    command: UserSubcommand,
}

#[derive(Subcommand)]
enum UserSubcommand {
    /// Add a new user and print its API key
    Add {
        /// Unique user name
        username: String,
    },
    /// List all users
    List,
    /// Remove a user, leaving its group first
    Remove {
        /// User name
        username: String,
    },
}

// ============================================================================
// Commands
// ============================================================================

type CmdResult = Result<(), Box<dyn std::error::Error>>;

async fn add_user(users: &UserRepository, username: String) -> CmdResult {
    let user = users.create(&username).await?;

    println!("Added user: {}", user.username);
    println!("  ID: {}", user.id);
    println!("  API key: {}", user.api_key);

    Ok(())
}

async fn list_users(users: &UserRepository) -> CmdResult {
    let all = users.list().await?;

    if all.is_empty() {
        println!("No users registered.");
        return Ok(());
    }

    println!("{:<8} {:<24} {:<24} {:<8}", "ID", "USERNAME", "GROUP", "LINKED");
    println!("{}", "-".repeat(66));

    for user in &all {
        println!(
            "{:<8} {:<24} {:<24} {:<8}",
            user.id,
            user.username,
            user.group_name.as_deref().unwrap_or("-"),
            if user.linked { "yes" } else { "no" }
        );
    }

    println!();
    println!("Total: {} user(s)", all.len());

    Ok(())
}

async fn remove_user(
    users: &UserRepository,
    registry: GroupRegistry,
    username: String,
) -> CmdResult {
    let Some(user) = users.get_by_username(&username).await? else {
        return Err(format!("User '{}' not found", username).into());
    };

    // Leaves the group and deletes the row in one transaction
    let accounts = AccountService::new(Arc::new(registry));
    accounts.delete_user(user.id).await?;

    println!("Removed user: {}", username);

    Ok(())
}

// ============================================================================
// Main
// ============================================================================

async fn run(cli: Cli) -> CmdResult {
    let config = ServerConfig::load(cli.config)?;
    let pool = init_db(&config.database_path).await?;
    let users = Arc::new(UserRepository::new(pool.clone()));

    match cli.command {
        Commands::User(user_cmd) => match user_cmd.command {
            UserSubcommand::Add { username } => add_user(&users, username).await,
            UserSubcommand::List => list_users(&users).await,
            UserSubcommand::Remove { username } => {
                let registry = GroupRegistry::load(
                    Arc::new(GroupRepository::new(pool)),
                    Arc::new(RandomLeader),
                )
                .await?;
                remove_user(&users, registry, username).await
            }
        },
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
