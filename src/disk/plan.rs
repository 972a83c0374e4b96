//! Partition layout planner.
//!
//! Folds the ordered [`PartitionSpec`] list into a [`Plan`]: a running sector
//! cursor is aligned, advanced by each record's size and clamped away from the
//! protective MBR and primary GPT (LBA 0..=33). The total image size is derived
//! from the final cursor, and a trailing zero-size record grows to the end of
//! the usable area once that size is known.

use log::{debug, warn};
use std::path::{Path, PathBuf};

use super::error::{PlanError, PlanResult};
use super::types::{PartitionSpec, Plan, ResolvedPartition};
use super::utils::{align_up, parse_size_kb};

/// Protective MBR + primary header + 32 sectors of partition entries.
pub const GPT_RESERVED_SECTORS: u64 = 34;
pub const SECTORS_PER_KB: u64 = 2;
pub const TRAILING_PADDING_KB: u64 = 1024;
pub const MIN_IMAGE_KB: u64 = 16 * 1024;
/// Largest image whose byte length still fits in a `u64`.
pub const MAX_IMAGE_KB: u64 = u64::MAX / 1024;

#[derive(Debug, Clone, Default)]
pub struct PlanOptions {
    /// Searched in order, first match wins.
    pub include_dirs: Vec<PathBuf>,
    pub requested_size_kb: Option<u64>,
    /// Skip content file resolution.
    pub partition_only: bool,
}

#[derive(Debug, Default)]
struct Cursor {
    sector: u64,
    index: u32,
}

enum Step {
    Skip,
    Reserve,
    Emit(ResolvedPartition),
}

pub fn plan(specs: &[PartitionSpec], opts: &PlanOptions) -> PlanResult<Plan> {
    let mut cursor = Cursor::default();
    let mut partitions: Vec<ResolvedPartition> = Vec::new();
    let mut warnings = Vec::new();

    for (pos, spec) in specs.iter().enumerate() {
        match cursor.step(spec, opts, &mut warnings)? {
            Step::Skip | Step::Reserve => continue,
            Step::Emit(part) => {
                let grow = part.grow;
                partitions.push(part);
                if grow {
                    let ignored = specs.len() - pos - 1;
                    if ignored > 0 {
                        let msg = format!(
                            "line {}: grow partition '{}' is not last, ignoring {} following record(s)",
                            spec.line, spec.name, ignored
                        );
                        warn!("{msg}");
                        warnings.push(msg);
                    }
                    break;
                }
            }
        }
    }

    let total_size_kb = image_size_kb(cursor.sector, opts.requested_size_kb)?;

    if let Some(last) = partitions.last_mut()
        && last.grow
    {
        last.end_sector = total_size_kb * SECTORS_PER_KB - GPT_RESERVED_SECTORS;
        debug!(
            "grow partition {} '{}' resolved to {}..={}",
            last.index, last.name, last.start_sector, last.end_sector
        );
    }

    Ok(Plan {
        partitions,
        total_size_kb,
        warnings,
    })
}

impl Cursor {
    fn step(
        &mut self,
        spec: &PartitionSpec,
        opts: &PlanOptions,
        warnings: &mut Vec<String>,
    ) -> PlanResult<Step> {
        let Some(size) = spec.size.as_deref().filter(|s| !s.trim().is_empty()) else {
            debug!("line {}: no size, skipped", spec.line);
            return Ok(Step::Skip);
        };
        let size_kb = field_kb(spec.line, "size", size)?;
        let align_kb = match spec.align.as_deref() {
            Some(align) => field_kb(spec.line, "align", align)?,
            None => 0,
        };

        let too_big = |field: &'static str, value: &str| PlanError::MalformedSize {
            line: spec.line,
            field,
            value: value.to_string(),
        };

        let mut start = align_kb
            .checked_mul(SECTORS_PER_KB)
            .and_then(|align| align_up(self.sector, align))
            .ok_or_else(|| too_big("align", spec.align.as_deref().unwrap_or_default()))?;
        self.sector = size_kb
            .checked_mul(SECTORS_PER_KB)
            .and_then(|sectors| start.checked_add(sectors))
            .filter(|&end| end / SECTORS_PER_KB + TRAILING_PADDING_KB <= MAX_IMAGE_KB)
            .ok_or_else(|| too_big("size", size))?;

        if spec.name.is_empty() {
            debug!(
                "line {}: reserved {}..{} without a table entry",
                spec.line, start, self.sector
            );
            return Ok(Step::Reserve);
        }

        // The clamp shifts the cursor again on top of the size advance above.
        if start < GPT_RESERVED_SECTORS {
            start = GPT_RESERVED_SECTORS;
            self.sector = self
                .sector
                .checked_add(start)
                .filter(|&end| end / SECTORS_PER_KB + TRAILING_PADDING_KB <= MAX_IMAGE_KB)
                .ok_or_else(|| too_big("size", size))?;
        }

        let file = match (&spec.file, opts.partition_only) {
            (Some(file), false) => match resolve_file(&file.path, &opts.include_dirs) {
                Some(path) => Some(path),
                None if file.optional => {
                    let msg = format!(
                        "line {}: optional file '{}' for '{}' not found, leaving partition empty",
                        spec.line, file.path, spec.name
                    );
                    warn!("{msg}");
                    warnings.push(msg);
                    None
                }
                None => {
                    return Err(PlanError::MissingFile {
                        line: spec.line,
                        file: file.path.clone(),
                    });
                }
            },
            _ => None,
        };

        self.index += 1;
        let part = ResolvedPartition {
            index: self.index,
            start_sector: start,
            end_sector: self.sector - 1,
            name: spec.name.clone(),
            size_kb,
            align_kb,
            part_type: spec.part_type.clone().unwrap_or_default(),
            format: spec.format.clone().unwrap_or_default(),
            file,
            grow: size_kb == 0,
        };
        debug!(
            "line {}: partition {} '{}' {}..={} cursor={}",
            spec.line, part.index, part.name, part.start_sector, part.end_sector, self.sector
        );
        Ok(Step::Emit(part))
    }
}

fn field_kb(line: usize, field: &'static str, raw: &str) -> PlanResult<u64> {
    parse_size_kb(raw).map_err(|_| PlanError::MalformedSize {
        line,
        field,
        value: raw.to_string(),
    })
}

fn image_size_kb(cursor: u64, requested_kb: Option<u64>) -> PlanResult<u64> {
    let required_kb = (cursor / SECTORS_PER_KB + TRAILING_PADDING_KB).max(MIN_IMAGE_KB);
    match requested_kb {
        Some(requested_kb) if requested_kb > MAX_IMAGE_KB => Err(PlanError::ImageTooLarge {
            requested_kb,
            max_kb: MAX_IMAGE_KB,
        }),
        Some(requested_kb) if requested_kb < required_kb => Err(PlanError::SizeMismatch {
            required_kb,
            requested_kb,
        }),
        Some(requested_kb) => Ok(requested_kb),
        None => Ok(required_kb),
    }
}

/// Look `file` up in `include_dirs` in order and canonicalize the first hit.
pub fn resolve_file(file: &str, include_dirs: &[PathBuf]) -> Option<PathBuf> {
    let candidate = Path::new(file);
    if candidate.is_absolute() {
        return candidate
            .is_file()
            .then(|| std::fs::canonicalize(candidate).ok())
            .flatten();
    }
    include_dirs
        .iter()
        .map(|dir| dir.join(candidate))
        .find(|path| path.is_file())
        .and_then(|path| std::fs::canonicalize(path).ok())
}
