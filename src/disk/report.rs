use anyhow::Result;

use super::types::{Plan, ResolvedPartition};

/// `index,start,end,name,sizeKB,align,type,format,resolvedFilePath`
pub fn report_line(part: &ResolvedPartition) -> String {
    format!(
        "{},{},{},{},{},{},{},{},{}",
        part.index,
        part.start_sector,
        part.end_sector,
        part.name,
        part.size_kb,
        part.align_kb,
        part.part_type,
        part.format,
        part.file
            .as_deref()
            .map(|p| p.display().to_string())
            .unwrap_or_default()
    )
}

pub fn render(plan: &Plan, json: bool) -> Result<String> {
    if json {
        return Ok(serde_json::to_string_pretty(plan)?);
    }
    Ok(plan
        .partitions
        .iter()
        .map(report_line)
        .collect::<Vec<_>>()
        .join("\n"))
}
