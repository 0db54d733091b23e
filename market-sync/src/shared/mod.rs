/// Shared modules for Market Sync
pub mod alerts;
pub mod backoff;
pub mod coalescer;
pub mod config;
pub mod error;
pub mod rest;
pub mod scheduler;
pub mod status;
pub mod store;
pub mod sync;
pub mod transport;
pub mod types;
pub mod websocket;

#[cfg(test)]
pub(crate) mod testing;
