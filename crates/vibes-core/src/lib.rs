//! Core Vibes library (Microsoft sign-in session, persistence, config).

pub mod auth;
pub mod config;
pub mod store;
