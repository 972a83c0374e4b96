pub mod config;
pub mod disk;
