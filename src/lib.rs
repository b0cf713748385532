//! Chat relay server library.
//! This crate exposes internal modules for integration testing.
//! The binary entry point is in main.rs.

pub mod command;
pub mod config;
pub mod dispatch;
pub mod event;
pub mod ingest;
pub mod server;
pub mod session;
pub mod shutdown;
