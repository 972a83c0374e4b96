use anyhow::{anyhow, Result};

use super::backup::reassemble_file;
use super::cli::DiskAction;
use super::config::BuildConfig;
use super::utils::parse_size_kb;

pub mod build;
pub mod info;
pub mod mkimg;

pub fn run(action: DiskAction, config: Option<&BuildConfig>) -> Result<()> {
    match action {
        DiskAction::Build {
            file,
            output,
            include,
            size,
            partition_only,
            report,
            json,
            yes,
        } => {
            let description = file
                .or_else(|| config.and_then(|c| c.file.clone()))
                .ok_or_else(|| {
                    anyhow!("partition description not specified. Use --file or set it in config file.")
                })?;

            let mut include_dirs = include;
            if let Some(cfg) = config {
                include_dirs.extend(cfg.include.iter().cloned());
            }

            let size_kb = match size.or_else(|| config.and_then(|c| c.size.clone())) {
                Some(size) => Some(parse_size_kb(&size).map_err(|_| anyhow!("invalid size: {size}"))?),
                None => None,
            };

            let partition_only =
                partition_only || config.and_then(|c| c.partition_only).unwrap_or(false);

            build::build(&build::BuildOptions {
                description,
                output,
                include_dirs,
                size_kb,
                partition_only,
                report,
                json,
                yes,
            })?;
            Ok(())
        }
        DiskAction::Mkimg {
            output,
            size,
            overwrite,
        } => {
            let size_bytes = parse_size_kb(&size)
                .ok()
                .and_then(|kb| kb.checked_mul(1024))
                .ok_or_else(|| anyhow!("invalid size: {size}"))?;
            mkimg::mkimg(&output, size_bytes, overwrite)
        }
        DiskAction::Info { disk, json } => info::info(&disk, json),
        DiskAction::Reassemble { input, output } => reassemble_file(&input, &output),
    }
}
