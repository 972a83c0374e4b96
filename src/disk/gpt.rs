use anyhow::{anyhow, bail, Result};
use gpt::{
    disk::LogicalBlockSize,
    mbr::ProtectiveMBR,
    partition_types::{self, OperatingSystem, Type},
    GptConfig,
};
use log::{debug, info};
use std::{fs::File, path::Path, str::FromStr};
use uuid::Uuid;

use super::plan::GPT_RESERVED_SECTORS;
use super::types::{PartitionInfo, Plan};

const LB_SIZE_BYTES: u64 = 512;

/// sgdisk style short type codes.
const SHORT_TYPE_CODES: &[(&str, &str)] = &[
    ("0700", "EBD0A0A2-B9E5-4433-87C0-68B6B72699C7"),
    ("0c01", "E3C9E316-0B5C-4DB8-817D-F92DF00215AE"),
    ("8200", "0657FD6D-A4AB-43C4-84E5-0933C84B4F4F"),
    ("8300", "0FC63DAF-8483-4772-8E79-3D69D8477DE4"),
    ("8302", "933AC7E1-2EB4-4F13-B844-0E14E2AEF915"),
    ("8304", "4F68BCE3-E8CD-4DB1-96E7-FBCAF984B709"),
    ("8305", "B921B045-1DF0-41C3-AF44-4C6F280D3FAE"),
    ("8e00", "E6D6D379-F507-44C2-A23C-238F2A3DF928"),
    ("fd00", "A19D880F-05FC-4D3B-A006-743F0F84911E"),
    ("ef00", "C12A7328-F81F-11D2-BA4B-00A0C93EC93B"),
    ("ef01", "024DEE41-33E7-11D3-9D69-0008C781F39F"),
    ("ef02", "21686148-6449-6E6F-744E-656564454649"),
    ("a002", "49A4D17F-93A3-45C1-A0DE-F50B2EBE2599"),
    ("a003", "4177C722-9E92-4AAB-8644-43502BFD5506"),
    ("a004", "EF32A33B-A409-486C-9141-9FFB711F6266"),
    ("a006", "38F428E6-D326-425D-9140-6E0EA133647C"),
    ("a007", "A893EF21-E428-470A-9E55-0668FD91A2D9"),
    ("a008", "DC76DDA9-5AC1-491C-AF42-A82591580C0D"),
];

pub fn open_gpt(disk: &Path, writable: bool) -> Result<gpt::GptDisk<File>> {
    GptConfig::new()
        .writable(writable)
        .logical_block_size(LogicalBlockSize::Lb512)
        .open(disk)
        .map_err(|e| anyhow!("failed to open GPT: {e}"))
}

pub fn map_partitions(gdisk: &gpt::GptDisk<File>) -> Result<Vec<PartitionInfo>> {
    let mut out = Vec::new();
    for (idx, part) in gdisk.partitions().iter() {
        if !part.is_used() {
            continue;
        }
        let start = part
            .bytes_start(LogicalBlockSize::Lb512)
            .map_err(|e| anyhow!("invalid partition start: {e}"))?;
        let size = part
            .bytes_len(LogicalBlockSize::Lb512)
            .map_err(|e| anyhow!("invalid partition size: {e}"))?;
        out.push(PartitionInfo {
            index: *idx,
            name: part.name.clone(),
            first_lba: part.first_lba,
            last_lba: part.last_lba,
            start_bytes: start,
            size_bytes: size,
        });
    }
    out.sort_by_key(|p| p.index);
    Ok(out)
}

/// Empty means Linux filesystem; otherwise a short code (`ef00`) or a full GUID.
pub fn parse_partition_type(code: &str) -> Result<Type> {
    let code = code.trim();
    if code.is_empty() {
        return Ok(partition_types::LINUX_FS);
    }

    let guid = match SHORT_TYPE_CODES
        .iter()
        .find(|(short, _)| short.eq_ignore_ascii_case(code))
    {
        Some((_, guid)) => *guid,
        None if code.len() == 4 => bail!("unknown partition type code '{code}'"),
        None => code,
    };

    let guid = Uuid::from_str(guid).map_err(|e| anyhow!("invalid partition type '{code}': {e}"))?;
    Ok(Type {
        guid,
        os: OperatingSystem::None,
    })
}

/// Resolve every partition type before anything touches the target.
pub fn resolve_types(plan: &Plan) -> Result<Vec<Type>> {
    plan.partitions
        .iter()
        .map(|p| {
            parse_partition_type(&p.part_type)
                .map_err(|e| anyhow!("partition {} '{}': {e}", p.index, p.name))
        })
        .collect()
}

/// Write a protective MBR and a fresh GPT holding every planned partition.
pub fn write_table(mut file: File, disk_bytes: u64, plan: &Plan, types: &[Type]) -> Result<()> {
    let total_lba = disk_bytes / LB_SIZE_BYTES;
    if total_lba < GPT_RESERVED_SECTORS * 2 {
        bail!("disk too small for GPT");
    }

    let mbr = ProtectiveMBR::with_lb_size(u32::try_from(total_lba - 1).unwrap_or(0xFF_FF_FF_FF));
    mbr.overwrite_lba0(&mut file)
        .map_err(|e| anyhow!("failed to write protective MBR: {e}"))?;

    let mut gdisk = GptConfig::new()
        .writable(true)
        .logical_block_size(LogicalBlockSize::Lb512)
        .create_from_device(file, None)
        .map_err(|e| anyhow!("failed to create GPT: {e}"))?;

    let header = gdisk.header();
    let usable_first = header.first_usable;
    let usable_last = header.last_usable;
    debug!("usable LBA range {usable_first}..={usable_last}");

    for (part, part_type) in plan.partitions.iter().zip(types) {
        if part.start_sector < usable_first || part.end_sector > usable_last {
            bail!(
                "partition {} '{}' ({}..={}) is outside usable LBA range {}..={}",
                part.index,
                part.name,
                part.start_sector,
                part.end_sector,
                usable_first,
                usable_last
            );
        }
        gdisk
            .add_partition_at(
                &part.name,
                part.index,
                part.start_sector,
                part.len_sectors(),
                part_type.clone(),
                0,
            )
            .map_err(|e| anyhow!("failed to add partition {}: {e}", part.name))?;
        info!(
            "partition {} '{}' {}..={}",
            part.index, part.name, part.start_sector, part.end_sector
        );
    }

    gdisk
        .write()
        .map_err(|e| anyhow!("failed to write GPT: {e}"))?;
    Ok(())
}

pub fn lb_size_bytes() -> u64 {
    LB_SIZE_BYTES
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_defaults_to_linux_fs() {
        assert_eq!(parse_partition_type("").unwrap(), partition_types::LINUX_FS);
    }

    #[test]
    fn test_short_type_codes() {
        let esp = parse_partition_type("EF00").unwrap();
        assert_eq!(
            esp.guid,
            Uuid::from_str("C12A7328-F81F-11D2-BA4B-00A0C93EC93B").unwrap()
        );
        let swap = parse_partition_type("8200").unwrap();
        assert_eq!(
            swap.guid,
            Uuid::from_str("0657FD6D-A4AB-43C4-84E5-0933C84B4F4F").unwrap()
        );
    }

    #[test]
    fn test_guid_type() {
        let t = parse_partition_type("21686148-6449-6E6F-744E-656564454649").unwrap();
        assert_eq!(
            t.guid,
            Uuid::from_str("21686148-6449-6E6F-744E-656564454649").unwrap()
        );
    }

    #[test]
    fn test_unknown_type() {
        assert!(parse_partition_type("zz99").is_err());
        assert!(parse_partition_type("not-a-guid").is_err());
    }
}
