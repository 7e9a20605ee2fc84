#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod badge;
pub mod config;
pub mod error;
pub mod event;
pub mod plugin;
pub mod server;
pub mod settings;
pub mod telemetry;
pub mod util;

pub type Result<T> = std::result::Result<T, error::Error>;
