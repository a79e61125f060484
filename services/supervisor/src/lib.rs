//! roomvisor supervisor library.
//!
//! The crate ships a `supervisor` binary; the library surface exists for
//! integration testing and for embedding the coordinator with other
//! backends.

pub mod adapters;
pub mod api;
pub mod capacity;
pub mod config;
pub mod coordinator;
pub mod db;
pub mod notify;
pub mod queue;
pub mod state;
