#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod gate;
pub mod grading;
pub mod lock;
pub mod model;
pub mod sidebar;
pub mod time;

#[cfg(test)]
mod testing;

pub use config::GatingConfig;
pub use error::Error;
pub use time::Clock;
