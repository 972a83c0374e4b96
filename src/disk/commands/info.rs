use anyhow::{Context, Result};
use log::debug;
use std::path::Path;

use super::super::gpt::{map_partitions, open_gpt};
use super::super::types::DiskInfo;

pub fn info(disk: &Path, json: bool) -> Result<()> {
    let info = disk_info(disk)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&info)?);
        return Ok(());
    }

    println!(
        "Disk: {} ({} M, {} bytes)",
        info.disk,
        format_mib(info.size_bytes),
        info.size_bytes
    );
    if info.partitions.is_empty() {
        println!("No GPT partitions found.");
        return Ok(());
    }

    for p in info.partitions {
        println!(
            "{:>3} {:<16} lba={}..={} start={} M size={} M",
            p.index,
            p.name,
            p.first_lba,
            p.last_lba,
            format_mib(p.start_bytes),
            format_mib(p.size_bytes)
        );
    }
    Ok(())
}

pub fn disk_info(disk: &Path) -> Result<DiskInfo> {
    let size_bytes = std::fs::metadata(disk)
        .with_context(|| format!("failed to stat {}", disk.display()))?
        .len();

    let partitions = match open_gpt(disk, false) {
        Ok(gdisk) => map_partitions(&gdisk)?,
        Err(e) => {
            debug!("{}: {e}", disk.display());
            Vec::new()
        }
    };

    Ok(DiskInfo {
        disk: disk.display().to_string(),
        size_bytes,
        partitions,
    })
}

fn format_mib(bytes: u64) -> String {
    const MIB: u64 = 1024 * 1024;
    if bytes.is_multiple_of(MIB) {
        format!("{}", bytes / MIB)
    } else {
        format!("{:.1}", bytes as f64 / MIB as f64)
    }
}
