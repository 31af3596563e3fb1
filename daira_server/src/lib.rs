//! HTTP binding for the `daira_auth` authentication core.
//!
//! Exposes registration, login, refresh, logout and profile endpoints over
//! axum, plus environment-driven configuration and logging setup.

pub mod api;
pub mod config;
pub mod logging;
