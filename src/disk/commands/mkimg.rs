use anyhow::{bail, Context, Result};
use log::info;
use std::io::{ErrorKind, Seek, SeekFrom, Write};
use std::path::Path;

use super::super::gpt::lb_size_bytes;
use super::super::plan::GPT_RESERVED_SECTORS;

/// Allocate a zero-filled (sparse where the filesystem allows) image of
/// `size_bytes`. Without `overwrite` an existing file is left untouched.
pub fn mkimg(path: &Path, size_bytes: u64, overwrite: bool) -> Result<()> {
    let gpt_bytes = 2 * GPT_RESERVED_SECTORS * lb_size_bytes();
    if size_bytes < gpt_bytes {
        bail!("image size {size_bytes} bytes cannot hold a primary and backup GPT ({gpt_bytes} bytes)");
    }
    if block_device_size(path)?.is_some() {
        bail!("{} is a block device, not an image file", path.display());
    }
    if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;
    }

    let mut options = std::fs::OpenOptions::new();
    options.write(true);
    if overwrite {
        options.create(true).truncate(true);
    } else {
        options.create_new(true);
    }
    let image = match options.open(path) {
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            bail!("{} already exists, use --overwrite to replace it", path.display())
        }
        other => other.with_context(|| format!("failed to create image {}", path.display()))?,
    };
    image
        .set_len(size_bytes)
        .with_context(|| format!("failed to size {} to {size_bytes} bytes", path.display()))?;
    info!("allocated image {} ({} bytes)", path.display(), size_bytes);
    Ok(())
}

/// Size in bytes when `path` is an existing block device.
#[cfg(unix)]
pub fn block_device_size(path: &Path) -> Result<Option<u64>> {
    use std::os::unix::fs::FileTypeExt;

    let Ok(meta) = std::fs::metadata(path) else {
        return Ok(None);
    };
    if !meta.file_type().is_block_device() {
        return Ok(None);
    }
    let mut dev = std::fs::File::open(path)
        .with_context(|| format!("failed to open device {}", path.display()))?;
    let size = dev
        .seek(SeekFrom::End(0))
        .with_context(|| format!("failed to size device {}", path.display()))?;
    Ok(Some(size))
}

#[cfg(not(unix))]
pub fn block_device_size(_path: &Path) -> Result<Option<u64>> {
    Ok(None)
}

/// Zero the primary and backup GPT regions of an existing device.
pub fn wipe_device(path: &Path, size_bytes: u64) -> Result<()> {
    let region = GPT_RESERVED_SECTORS * lb_size_bytes();
    if size_bytes < region * 2 {
        bail!("device {} too small for GPT", path.display());
    }
    let mut dev = std::fs::OpenOptions::new()
        .write(true)
        .open(path)
        .with_context(|| format!("failed to open device {}", path.display()))?;
    let zeros = vec![0u8; region as usize];
    for offset in [0, size_bytes - region] {
        dev.seek(SeekFrom::Start(offset))?;
        dev.write_all(&zeros)
            .with_context(|| format!("failed to wipe {} at {offset}", path.display()))?;
    }
    dev.sync_all()?;
    info!("wiped partition metadata on {}", path.display());
    Ok(())
}
