//! Listening groups that follow their leader's playback.
//!
//! Users join named groups; the founder leads, and a departing leader is
//! succeeded by a random remaining member. The leader can push its current
//! playback to every other member's player through the [`dispatcher`],
//! which resolves each member's access token via the [`broker`].

pub mod accounts;
pub mod broker;
pub mod config;
pub mod db;
pub mod dispatcher;
pub mod link;
pub mod models;
pub mod personality;
pub mod registry;
pub mod server;
pub mod spotify;

#[cfg(test)]
mod test_support;
