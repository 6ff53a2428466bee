pub mod agents;
pub mod api;
pub mod config;
pub mod health;
pub mod lifecycle;
pub mod subsystems;
pub mod types;

#[cfg(test)]
mod testing;

pub use config::Config;
pub use types::*;
