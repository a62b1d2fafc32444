#![forbid(unsafe_code)]

//! Game server supervisor with git-backed world snapshots.

pub mod backup;
pub mod config;
pub mod console;
pub mod duration;
pub mod errors;
pub mod process;
pub mod shell;
pub mod vcs;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
