//! Showcase notification worker.
//!
//! Hosts the notification queue workers, the digest scheduler, the Postgres
//! `NOTIFY` bridge, and a small HTTP surface for health checks and external
//! scheduler ticks.

pub mod config;
pub mod error;
pub mod listener;
pub mod router;
pub mod routes;
pub mod state;
