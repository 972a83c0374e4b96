pub mod backup;
mod cli;
pub mod commands;
pub mod config;
pub mod content;
pub mod error;
pub mod gpt;
mod io;
pub mod layout;
pub mod plan;
pub mod report;
pub mod sparse;
pub mod types;
pub mod utils;

pub use cli::DiskAction;
pub use commands::run;
pub use error::PlanError;
