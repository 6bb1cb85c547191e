//! Infrastructure shared by the catalog and its collaborators.
//!
//! Storage plumbing (db, pool, broker, store), request scoping (cancel, time),
//! configuration, logging and output.

pub mod broker;
pub mod cancel;
pub mod config;
pub mod db;
pub mod error;
pub mod output;
pub mod pool;
pub mod schemas;
pub mod store;
pub mod telemetry;
pub mod time;
