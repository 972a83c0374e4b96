use serde::Serialize;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct PartitionTarget {
    pub offset_bytes: u64,
    pub size_bytes: u64,
}

/// Content source of a record. `optional` is set by a leading `-` marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRef {
    pub path: String,
    pub optional: bool,
}

/// One record of the partition description, fields exactly as written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionSpec {
    pub line: usize,
    pub name: String,
    pub size: Option<String>,
    pub align: Option<String>,
    pub part_type: Option<String>,
    pub format: Option<String>,
    pub file: Option<FileRef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedPartition {
    pub index: u32,
    pub start_sector: u64,
    pub end_sector: u64,
    pub name: String,
    pub size_kb: u64,
    pub align_kb: u64,
    pub part_type: String,
    pub format: String,
    pub file: Option<PathBuf>,
    pub grow: bool,
}

impl ResolvedPartition {
    pub fn len_sectors(&self) -> u64 {
        self.end_sector - self.start_sector + 1
    }

    pub fn target(&self) -> PartitionTarget {
        PartitionTarget {
            offset_bytes: self.start_sector * super::gpt::lb_size_bytes(),
            size_bytes: self.len_sectors() * super::gpt::lb_size_bytes(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Plan {
    pub partitions: Vec<ResolvedPartition>,
    pub total_size_kb: u64,
    pub warnings: Vec<String>,
}

impl Plan {
    /// Planned totals are capped at `plan::MAX_IMAGE_KB`, so this cannot overflow.
    pub fn total_size_bytes(&self) -> u64 {
        self.total_size_kb * 1024
    }
}

#[derive(Serialize)]
pub struct PartitionInfo {
    pub index: u32,
    pub name: String,
    pub first_lba: u64,
    pub last_lba: u64,
    pub start_bytes: u64,
    pub size_bytes: u64,
}

#[derive(Serialize)]
pub struct DiskInfo {
    pub disk: String,
    pub size_bytes: u64,
    pub partitions: Vec<PartitionInfo>,
}
