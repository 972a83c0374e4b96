use std::fs;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use gptimg::disk::backup::reassemble_file;
use gptimg::disk::commands::{build, mkimg};
use gptimg::disk::{gpt as disk_gpt, PlanError};
use serial_test::serial;
use tempfile::TempDir;

const SECTOR: u64 = 512;

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn read_at(path: &Path, offset: u64, len: usize) -> Vec<u8> {
    let mut file = fs::File::open(path).expect("open image");
    file.seek(SeekFrom::Start(offset)).expect("seek");
    let mut buf = vec![0u8; len];
    file.read_exact(&mut buf).expect("read");
    buf
}

/// One RAW block of 0x11 followed by one FILL block of 0xA5.
fn write_sparse(path: &Path) {
    let blk: u32 = 4096;
    let mut img = Vec::new();
    img.extend_from_slice(&0xED26_FF3Au32.to_le_bytes());
    img.extend_from_slice(&1u16.to_le_bytes());
    img.extend_from_slice(&0u16.to_le_bytes());
    img.extend_from_slice(&28u16.to_le_bytes());
    img.extend_from_slice(&12u16.to_le_bytes());
    img.extend_from_slice(&blk.to_le_bytes());
    img.extend_from_slice(&2u32.to_le_bytes());
    img.extend_from_slice(&2u32.to_le_bytes());
    img.extend_from_slice(&0u32.to_le_bytes());

    img.extend_from_slice(&0xCAC1u16.to_le_bytes());
    img.extend_from_slice(&0u16.to_le_bytes());
    img.extend_from_slice(&1u32.to_le_bytes());
    img.extend_from_slice(&(12 + blk).to_le_bytes());
    img.extend(std::iter::repeat_n(0x11u8, blk as usize));

    img.extend_from_slice(&0xCAC2u16.to_le_bytes());
    img.extend_from_slice(&0u16.to_le_bytes());
    img.extend_from_slice(&1u32.to_le_bytes());
    img.extend_from_slice(&16u32.to_le_bytes());
    img.extend_from_slice(&[0xA5; 4]);

    fs::write(path, img).expect("write sparse image");
}

#[test]
fn build_image_workflow() {
    init_logger();
    let temp = TempDir::new().expect("temp dir");
    let desc = temp.path().join("partitions.txt");
    let disk = temp.path().join("out/disk.img");
    let boot_bin: Vec<u8> = (0..1000u32).map(|i| (i % 251) as u8).collect();
    fs::write(temp.path().join("boot.bin"), &boot_bin).expect("write boot");
    write_sparse(&temp.path().join("data.simg"));

    fs::write(
        &desc,
        "# name,size,align,type,format,file\n\
         boot,1M,1024,ef00,,boot.bin\n\
         ,1M\n\
         data,16K,4,8300,sparse,data.simg\n\
         misc,8K,,,,-missing.img\n\
         rootfs,0,1024\n",
    )
    .expect("write description");

    let plan = build::build(&build::BuildOptions {
        description: desc,
        output: Some(disk.clone()),
        yes: true,
        ..Default::default()
    })
    .expect("build");

    assert_eq!(plan.total_size_kb, 16384);
    assert_eq!(plan.warnings.len(), 1);
    assert_eq!(fs::metadata(&disk).expect("disk exists").len(), 16384 * 1024);

    let gdisk = disk_gpt::open_gpt(&disk, false).expect("open gpt");
    let parts = disk_gpt::map_partitions(&gdisk).expect("map partitions");
    let layout: Vec<(u32, &str, u64, u64)> = parts
        .iter()
        .map(|p| (p.index, p.name.as_str(), p.first_lba, p.last_lba))
        .collect();
    assert_eq!(
        layout,
        vec![
            (1, "boot", 34, 2081),
            (2, "data", 4136, 4167),
            (3, "misc", 4168, 4183),
            (4, "rootfs", 6144, 16384 * 2 - 34),
        ]
    );

    assert_eq!(read_at(&disk, 34 * SECTOR, boot_bin.len()), boot_bin);

    let data = read_at(&disk, 4136 * SECTOR, 8192);
    assert!(data[..4096].iter().all(|&b| b == 0x11));
    assert!(data[4096..].iter().all(|&b| b == 0xA5));

    let misc = read_at(&disk, 4168 * SECTOR, 8 * 1024);
    assert!(misc.iter().all(|&b| b == 0));
}

#[test]
fn report_mode_touches_nothing() {
    init_logger();
    let temp = TempDir::new().expect("temp dir");
    let desc = temp.path().join("partitions.txt");
    let disk = temp.path().join("disk.img");
    fs::write(&desc, "boot,1024,1,ef00\nsystem,0,1\n").expect("write description");

    let plan = build::build(&build::BuildOptions {
        description: desc,
        output: Some(disk.clone()),
        report: true,
        ..Default::default()
    })
    .expect("report");

    assert!(!disk.exists());
    assert_eq!(plan.partitions.len(), 2);
    assert_eq!(plan.partitions[0].start_sector, 34);
    assert_eq!(plan.partitions[0].end_sector, 2081);
    assert_eq!(plan.partitions[1].start_sector, 2082);
    assert_eq!(plan.partitions[1].end_sector, 16384 * 2 - 34);
}

#[test]
fn requested_size_too_small_fails_before_writing() {
    init_logger();
    let temp = TempDir::new().expect("temp dir");
    let desc = temp.path().join("partitions.txt");
    let disk = temp.path().join("disk.img");
    fs::write(&desc, "big,32M\n").expect("write description");

    let err = build::build(&build::BuildOptions {
        description: desc,
        output: Some(disk.clone()),
        size_kb: Some(16 * 1024),
        yes: true,
        ..Default::default()
    })
    .expect_err("size mismatch");

    assert!(matches!(
        err.downcast_ref::<PlanError>(),
        Some(PlanError::SizeMismatch { .. })
    ));
    assert!(!disk.exists());
}

#[test]
fn missing_required_file_fails_before_writing() {
    init_logger();
    let temp = TempDir::new().expect("temp dir");
    let desc = temp.path().join("partitions.txt");
    let disk = temp.path().join("disk.img");
    fs::write(&desc, "boot,1M,,,,boot.bin\n").expect("write description");

    let err = build::build(&build::BuildOptions {
        description: desc,
        output: Some(disk.clone()),
        yes: true,
        ..Default::default()
    })
    .expect_err("missing file");

    assert!(matches!(
        err.downcast_ref::<PlanError>(),
        Some(PlanError::MissingFile { .. })
    ));
    assert!(!disk.exists());
}

#[test]
fn oversized_raw_content_is_rejected() {
    init_logger();
    let temp = TempDir::new().expect("temp dir");
    let desc = temp.path().join("partitions.txt");
    let disk = temp.path().join("disk.img");
    fs::write(temp.path().join("big.bin"), vec![0x5Au8; 8 * 1024]).expect("write big.bin");
    fs::write(&desc, "small,4K,,,,big.bin
").expect("write description");

    let err = build::build(&build::BuildOptions {
        description: desc,
        output: Some(disk.clone()),
        yes: true,
        ..Default::default()
    })
    .expect_err("content larger than partition");

    assert!(format!("{err:#}").contains("does not fit"), "{err:#}");
}

#[test]
fn unknown_type_code_fails_before_writing() {
    init_logger();
    let temp = TempDir::new().expect("temp dir");
    let desc = temp.path().join("partitions.txt");
    let disk = temp.path().join("disk.img");
    fs::write(&desc, "boot,1M,,ef00
data,1M,,zz99
").expect("write description");

    let err = build::build(&build::BuildOptions {
        description: desc,
        output: Some(disk.clone()),
        yes: true,
        ..Default::default()
    })
    .expect_err("unknown type code");

    assert!(format!("{err:#}").contains("zz99"), "{err:#}");
    assert!(!disk.exists());
}

#[test]
fn unknown_content_format_fails_before_writing() {
    init_logger();
    let temp = TempDir::new().expect("temp dir");
    let desc = temp.path().join("partitions.txt");
    let disk = temp.path().join("disk.img");
    fs::write(&desc, "boot,1M
rootfs,0,,,ext4
").expect("write description");

    let err = build::build(&build::BuildOptions {
        description: desc,
        output: Some(disk.clone()),
        yes: true,
        ..Default::default()
    })
    .expect_err("unknown content format");

    assert!(format!("{err:#}").contains("ext4"), "{err:#}");
    assert!(!disk.exists());
}

#[test]
fn partition_only_skips_content() {
    init_logger();
    let temp = TempDir::new().expect("temp dir");
    let desc = temp.path().join("partitions.txt");
    let disk = temp.path().join("disk.img");
    fs::write(&desc, "boot,1M,,,,boot.bin\nroot,0\n").expect("write description");

    let plan = build::build(&build::BuildOptions {
        description: desc,
        output: Some(disk.clone()),
        size_kb: Some(32 * 1024),
        partition_only: true,
        yes: true,
        ..Default::default()
    })
    .expect("build");

    assert_eq!(plan.total_size_kb, 32 * 1024);
    assert_eq!(plan.partitions[0].file, None);

    let gdisk = disk_gpt::open_gpt(&disk, false).expect("open gpt");
    let parts = disk_gpt::map_partitions(&gdisk).expect("map partitions");
    assert_eq!(parts.len(), 2);
    assert_eq!(parts[1].last_lba, 32 * 1024 * 2 - 34);
}

#[test]
#[serial]
fn include_search_falls_back_to_current_dir() {
    init_logger();
    let temp = TempDir::new().expect("temp dir");
    let conf = temp.path().join("conf");
    let images = temp.path().join("images");
    fs::create_dir_all(&conf).expect("conf dir");
    fs::create_dir_all(&images).expect("images dir");
    fs::write(temp.path().join("a.img"), b"cwd").expect("write a");
    fs::write(images.join("b.img"), b"include").expect("write b");
    fs::write(conf.join("b.img"), b"conf").expect("write conf b");
    let desc = conf.join("partitions.txt");
    fs::write(&desc, "a,1M,,,,a.img\nb,1M,,,,b.img\n").expect("write description");

    let old_cwd = std::env::current_dir().expect("cwd");
    std::env::set_current_dir(temp.path()).expect("chdir");
    let result = build::build(&build::BuildOptions {
        description: desc,
        include_dirs: vec![images.clone()],
        report: true,
        ..Default::default()
    });
    std::env::set_current_dir(old_cwd).expect("restore cwd");

    let plan = result.expect("report");
    assert_eq!(
        plan.partitions[0].file.as_deref(),
        Some(fs::canonicalize(temp.path().join("a.img")).expect("canon a").as_path())
    );
    assert_eq!(
        plan.partitions[1].file.as_deref(),
        Some(fs::canonicalize(images.join("b.img")).expect("canon b").as_path())
    );
}

#[test]
fn reassemble_backup_file() {
    let temp = TempDir::new().expect("temp dir");
    let input = temp.path().join("gpt.backup");
    let output = temp.path().join("gpt.bin");
    let blob: Vec<u8> = (0..35u8)
        .flat_map(|n| std::iter::repeat_n(n, SECTOR as usize))
        .collect();
    fs::write(&input, &blob).expect("write backup");

    reassemble_file(&input, &output).expect("reassemble");

    let out = fs::read(&output).expect("read output");
    assert_eq!(out.len(), 67 * SECTOR as usize);
    assert_eq!(out[SECTOR as usize], 1);
    assert_eq!(out[2 * SECTOR as usize], 3);
    assert_eq!(out[34 * SECTOR as usize], 3);
    assert_eq!(out[66 * SECTOR as usize], 2);
}

#[test]
fn wipe_clears_gpt_regions() {
    let temp = TempDir::new().expect("temp dir");
    let disk = temp.path().join("dev.img");
    fs::write(&disk, vec![0xFFu8; 256 * 1024]).expect("write fake device");

    mkimg::wipe_device(&disk, 256 * 1024).expect("wipe");

    let data = fs::read(&disk).expect("read");
    let region = 34 * SECTOR as usize;
    assert!(data[..region].iter().all(|&b| b == 0));
    assert!(data[data.len() - region..].iter().all(|&b| b == 0));
    assert!(data[region..data.len() - region].iter().all(|&b| b == 0xFF));
}
