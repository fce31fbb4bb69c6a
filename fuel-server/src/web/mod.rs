//! Web layer for the fuel station server.
//!
//! Provides JSON endpoints over the station store, region counts and a
//! server-sent event feed of realtime price changes.

mod dto;
mod routes;
mod state;

pub use dto::*;
pub use routes::{AppError, create_router};
pub use state::AppState;
