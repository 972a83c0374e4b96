use anyhow::{anyhow, Context, Result};
use std::path::Path;

use super::error::{PlanError, PlanResult};
use super::types::{FileRef, PartitionSpec};

/// Prefix marking a content file whose absence is only a warning.
pub const OPTIONAL_FILE_MARKER: char = '-';

const MAX_FIELDS: usize = 6;
const GPT_NAME_MAX_UNITS: usize = 36;

pub fn parse_description_file(path: &Path) -> Result<Vec<PartitionSpec>> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read description file {}: {e}", path.display()))?;
    parse_description(&content)
        .with_context(|| format!("failed to parse description file {}", path.display()))
}

/// Parse `name,size,align,type,format,file` records, one per line.
pub fn parse_description(content: &str) -> PlanResult<Vec<PartitionSpec>> {
    let mut specs = Vec::new();
    for (idx, raw) in content.lines().enumerate() {
        let line = idx + 1;
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        specs.push(parse_record(line, trimmed)?);
    }
    Ok(specs)
}

fn parse_record(line: usize, raw: &str) -> PlanResult<PartitionSpec> {
    let fields: Vec<&str> = raw.split(',').map(str::trim).collect();
    if fields.len() > MAX_FIELDS {
        return Err(PlanError::InvalidSpec {
            line,
            reason: format!(
                "expected at most {MAX_FIELDS} fields (name,size,align,type,format,file), got {}",
                fields.len()
            ),
        });
    }

    let field = |i: usize| {
        fields
            .get(i)
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string())
    };

    let name = fields.first().copied().unwrap_or_default().to_string();
    if name.encode_utf16().count() > GPT_NAME_MAX_UNITS {
        return Err(PlanError::InvalidSpec {
            line,
            reason: format!("partition name '{name}' exceeds {GPT_NAME_MAX_UNITS} characters"),
        });
    }

    let file = match field(5) {
        Some(f) => Some(parse_file_ref(line, &f)?),
        None => None,
    };

    Ok(PartitionSpec {
        line,
        name,
        size: field(1),
        align: field(2),
        part_type: field(3),
        format: field(4),
        file,
    })
}

fn parse_file_ref(line: usize, raw: &str) -> PlanResult<FileRef> {
    match raw.strip_prefix(OPTIONAL_FILE_MARKER) {
        Some(rest) if rest.trim().is_empty() => Err(PlanError::InvalidSpec {
            line,
            reason: "optional file marker without a file name".to_string(),
        }),
        Some(rest) => Ok(FileRef {
            path: rest.trim().to_string(),
            optional: true,
        }),
        None => Ok(FileRef {
            path: raw.to_string(),
            optional: false,
        }),
    }
}
