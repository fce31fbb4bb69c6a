//! Fuel station data server.
//!
//! Pulls station rows from a paginated backend, caches them with a fallback
//! dataset for outages, merges realtime price updates and serves the result
//! as JSON, map points and per-region counts.

pub mod backend;
pub mod config;
pub mod domain;
pub mod realtime;
pub mod regions;
pub mod spatial;
pub mod store;
pub mod web;
