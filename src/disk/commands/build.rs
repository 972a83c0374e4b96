use anyhow::{anyhow, bail, Context, Result};
use log::{info, warn};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use super::super::content::{resolve_formats, write_content};
use super::super::gpt::{resolve_types, write_table};
use super::super::layout::parse_description_file;
use super::super::plan::{plan, PlanOptions};
use super::super::report::render;
use super::super::types::Plan;
use super::super::utils::confirm_or_yes;
use super::mkimg::{block_device_size, mkimg, wipe_device};

#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    pub description: PathBuf,
    pub output: Option<PathBuf>,
    /// Extra search directories, tried before the defaults.
    pub include_dirs: Vec<PathBuf>,
    pub size_kb: Option<u64>,
    pub partition_only: bool,
    pub report: bool,
    pub json: bool,
    pub yes: bool,
}

pub fn build(opts: &BuildOptions) -> Result<Plan> {
    let specs = parse_description_file(&opts.description)?;

    let output = match (&opts.output, opts.report) {
        (_, true) => None,
        (Some(out), false) => Some(out.as_path()),
        (None, false) => bail!("an output image or device is required unless --report is given"),
    };

    let device_bytes = match output {
        Some(out) => block_device_size(out)?,
        None => None,
    };
    let requested_size_kb = opts.size_kb.or(device_bytes.map(|b| b / 1024));

    let plan_opts = PlanOptions {
        include_dirs: search_path(&opts.description, &opts.include_dirs),
        requested_size_kb,
        partition_only: opts.partition_only,
    };
    let plan = plan(&specs, &plan_opts)
        .with_context(|| format!("failed to plan {}", opts.description.display()))?;

    let Some(output) = output else {
        println!("{}", render(&plan, opts.json)?);
        return Ok(plan);
    };

    let types = resolve_types(&plan)?;
    let formats = resolve_formats(&plan)?;

    let disk_bytes = match device_bytes {
        Some(dev_bytes) => {
            if plan.total_size_bytes() > dev_bytes {
                bail!(
                    "device {} holds {} bytes, layout needs {}",
                    output.display(),
                    dev_bytes,
                    plan.total_size_bytes()
                );
            }
            let prompt = format!(
                "This will destroy the partition table on {}. Continue?",
                output.display()
            );
            confirm_or_yes(opts.yes, &prompt)?;
            wipe_device(output, dev_bytes)?;
            dev_bytes
        }
        None => {
            if output.exists() {
                let prompt = format!("Overwrite existing image {}?", output.display());
                confirm_or_yes(opts.yes, &prompt)?;
            }
            mkimg(output, plan.total_size_bytes(), true)?;
            plan.total_size_bytes()
        }
    };

    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .open(output)
        .map_err(|e| anyhow!("failed to open {}: {e}", output.display()))?;
    write_table(file, disk_bytes, &plan, &types)?;

    if opts.partition_only {
        info!("partition-only mode, skipping content");
    } else {
        for (part, format) in plan.partitions.iter().zip(formats) {
            write_content(output, part, format)?;
        }
    }

    if !plan.warnings.is_empty() {
        warn!("finished with {} warning(s)", plan.warnings.len());
    }
    info!(
        "built {} with {} partition(s), {}K",
        output.display(),
        plan.partitions.len(),
        plan.total_size_kb
    );
    Ok(plan)
}

/// `extra` in order, then the description's directory, then the current directory.
pub fn search_path(description: &Path, extra: &[PathBuf]) -> Vec<PathBuf> {
    let desc_dir = description
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    let mut dirs: Vec<PathBuf> = Vec::new();
    for dir in extra
        .iter()
        .cloned()
        .chain([desc_dir, PathBuf::from(".")])
    {
        if !dirs.contains(&dir) {
            dirs.push(dir);
        }
    }
    dirs
}
