//! # ScoreHall Core
//!
//! Error taxonomy, configuration and domain records shared by every ScoreHall crate.

pub mod config;
pub mod error;
pub mod types;

pub use config::ScoreHallConfig;
pub use error::{Result, ScoreHallError};
