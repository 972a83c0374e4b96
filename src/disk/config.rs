use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// `[build]` section of the configuration file. Command line values win.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct BuildConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
    /// Searched after `-I` directories.
    #[serde(default)]
    pub include: Vec<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partition_only: Option<bool>,
}

impl BuildConfig {
    pub fn with_defaults() -> Self {
        Self {
            file: Some(PathBuf::from("partitions.txt")),
            include: vec![PathBuf::from("images")],
            size: None,
            partition_only: Some(false),
        }
    }
}
