//! Domain logic for the showcase notification engine.
//!
//! This crate has zero internal dependencies so it can be shared by the
//! repository layer, the notification engine, and the worker binary.

pub mod cadence;
pub mod digest;
pub mod discussion;
pub mod error;
pub mod recipients;
pub mod types;
