//! Quest server
//!
//! Quest definitions, per-player progression with runtime branching, and the
//! storage and HTTP surfaces a host game server talks to.

pub mod api;
pub mod area;
pub mod config;
pub mod error;
pub mod extension;
pub mod player;
pub mod quest;
pub mod storage;

pub use error::QuestError;
