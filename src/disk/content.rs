use anyhow::{bail, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn};
use std::{
    fs::{File, OpenOptions},
    io::{self, BufReader, Seek, SeekFrom},
    path::Path,
    str::FromStr,
};

use super::io::PartitionIo;
use super::sparse::{is_sparse, unsparse};
use super::types::{Plan, ResolvedPartition};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentFormat {
    Raw,
    Sparse,
}

impl FromStr for ContentFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "raw" => Ok(ContentFormat::Raw),
            "sparse" => Ok(ContentFormat::Sparse),
            other => bail!("unknown content format '{other}' (expected raw or sparse)"),
        }
    }
}

/// Resolve every content format before anything touches the target.
pub fn resolve_formats(plan: &Plan) -> Result<Vec<ContentFormat>> {
    plan.partitions
        .iter()
        .map(|p| {
            p.format
                .parse::<ContentFormat>()
                .with_context(|| format!("partition {} '{}'", p.index, p.name))
        })
        .collect()
}

/// Copy the partition's source file into its byte range of `disk`.
/// Returns the number of bytes the partition now holds from the source.
pub fn write_content(disk: &Path, part: &ResolvedPartition, format: ContentFormat) -> Result<u64> {
    let Some(src) = part.file.as_deref() else {
        return Ok(0);
    };
    let target = part.target();

    let mut source = File::open(src).with_context(|| format!("failed to open {}", src.display()))?;
    let source_len = source
        .metadata()
        .with_context(|| format!("failed to stat {}", src.display()))?
        .len();

    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .open(disk)
        .with_context(|| format!("failed to open disk {}", disk.display()))?;
    let mut part_io = PartitionIo::new(file, target.offset_bytes, target.size_bytes);

    let written = match format {
        ContentFormat::Raw => {
            if source_len > part_io.len() {
                bail!(
                    "{} ({} bytes) does not fit partition '{}' ({} bytes)",
                    src.display(),
                    source_len,
                    part.name,
                    part_io.len()
                );
            }
            if is_sparse(&mut source)? {
                warn!(
                    "{} looks like a sparse image but partition '{}' is written raw",
                    src.display(),
                    part.name
                );
            }
            source.seek(SeekFrom::Start(0))?;
            let pb = progress_bar(source_len, &part.name)?;
            let copied = io::copy(&mut pb.wrap_read(BufReader::new(source)), &mut part_io)
                .with_context(|| format!("failed to copy {} into '{}'", src.display(), part.name))?;
            pb.finish_and_clear();
            copied
        }
        ContentFormat::Sparse => {
            let pb = progress_bar(part_io.len(), &part.name)?;
            let expanded = unsparse(&mut BufReader::new(source), &mut part_io, target.size_bytes, |n| {
                pb.inc(n)
            })
            .with_context(|| format!("failed to unsparse {} into '{}'", src.display(), part.name))?;
            pb.finish_and_clear();
            expanded
        }
    };

    part_io.sync()
        .with_context(|| format!("failed to sync {}", disk.display()))?;
    info!(
        "wrote {} ({} bytes) to partition {} '{}'",
        src.display(),
        written,
        part.index,
        part.name
    );
    Ok(written)
}

fn progress_bar(len: u64, name: &str) -> Result<ProgressBar> {
    let pb = ProgressBar::new(len);
    let style = ProgressStyle::with_template(
        "{msg} {spinner:.green} {bytes}/{total_bytes} ({percent}%) [{bar:40.cyan/blue}] {eta}",
    )?
    .progress_chars("=>-");
    pb.set_style(style);
    pb.set_message(name.to_string());
    Ok(pb)
}
