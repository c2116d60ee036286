pub mod commands;
pub mod config;
pub mod error;

pub use commands::*;
pub use config::*;
pub use error::*;
