//! Rebuild a writable GPT region from an `sgdisk --backup` blob.
//!
//! Input sectors: `[MBR][primary header][secondary header][32 table sectors]`.
//! Output sectors: `[MBR][primary header][table][table][secondary header]`, the
//! table repeated so the same bytes serve the primary and the secondary copy.

use anyhow::{anyhow, bail, Context, Result};
use log::info;
use std::path::Path;

use super::gpt::lb_size_bytes;

pub const TABLE_SECTORS: usize = 32;
pub const BACKUP_SECTORS: usize = 3 + TABLE_SECTORS;
pub const REASSEMBLED_SECTORS: usize = 3 + 2 * TABLE_SECTORS;

pub fn reassemble_backup(blob: &[u8]) -> Result<Vec<u8>> {
    let sector = lb_size_bytes() as usize;
    if blob.len() != BACKUP_SECTORS * sector {
        bail!(
            "GPT backup must be {} bytes ({} sectors), got {}",
            BACKUP_SECTORS * sector,
            BACKUP_SECTORS,
            blob.len()
        );
    }

    let mbr = sectors(blob, 0, 1);
    let primary = sectors(blob, 1, 1);
    let secondary = sectors(blob, 2, 1);
    let table = sectors(blob, 3, TABLE_SECTORS);

    let mut out = Vec::with_capacity(REASSEMBLED_SECTORS * sector);
    out.extend_from_slice(mbr);
    out.extend_from_slice(primary);
    out.extend_from_slice(table);
    out.extend_from_slice(table);
    out.extend_from_slice(secondary);
    Ok(out)
}

fn sectors(blob: &[u8], lba: usize, count: usize) -> &[u8] {
    let sector = lb_size_bytes() as usize;
    &blob[lba * sector..(lba + count) * sector]
}

pub fn reassemble_file(input: &Path, output: &Path) -> Result<()> {
    let blob = std::fs::read(input)
        .map_err(|e| anyhow!("failed to read GPT backup {}: {e}", input.display()))?;
    let out = reassemble_backup(&blob)?;
    std::fs::write(output, &out)
        .with_context(|| format!("failed to write {}", output.display()))?;
    info!(
        "reassembled {} into {} ({} sectors)",
        input.display(),
        output.display(),
        REASSEMBLED_SECTORS
    );
    Ok(())
}
