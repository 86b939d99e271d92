//! # ScoreHall Gateway
//! HTTP API over the platform: reset, tenant provisioning, billing and `/api/me`.

pub mod routes;
pub mod server;

pub use server::{AppState, build_router, start};
