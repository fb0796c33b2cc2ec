mod credential;
mod group;
mod personality;
mod playback;
mod user;

pub use credential::Credential;
pub use group::{Group, GroupSummary};
pub use personality::{AudioFeatures, Personality};
pub use playback::{PlaybackInstruction, PlaybackState};
pub use user::{User, UserId};
