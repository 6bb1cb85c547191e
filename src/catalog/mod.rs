//! Expression and module catalog.

pub mod commands;
pub mod expressions;
pub mod facade;
pub mod model;
pub mod modules;
pub mod semver;
pub mod sqlite;
pub mod storage;

pub use facade::Catalog;
