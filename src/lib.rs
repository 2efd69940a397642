pub mod cli;
pub mod config;
pub mod error;
pub mod metrics;
pub mod output;

pub use error::{KgadgetError, Result};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
