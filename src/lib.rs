// ===============================
// src/lib.rs
// ===============================
pub mod config;
pub mod domain;
pub mod error;
pub mod feed;
pub mod history;
pub mod metrics;
pub mod pipeline;
pub mod positions;
pub mod recorder;
pub mod server;
pub mod store;
pub mod strategy;
pub mod system;
