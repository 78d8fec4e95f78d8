//! Hyper database engine
//!
//! `hyperd` speaks the PostgreSQL wire protocol, so extracts are read with
//! `tokio-postgres`. The engine either attaches to a running `hyperd` or
//! spawns one for the lifetime of the run.

mod engine;

pub use engine::HyperdEngine;
