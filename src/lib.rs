pub mod config;
pub mod error;
pub mod geometry;
pub mod ingest;
pub mod listener;
pub mod osc;
pub mod protocol;
pub mod pump;
pub mod session;
pub mod skeleton;
