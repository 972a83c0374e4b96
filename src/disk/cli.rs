use clap::Subcommand;
use std::path::PathBuf;

#[derive(Subcommand, Debug)]
pub enum DiskAction {
    /// Plan a GPT layout from a partition description and build the image
    Build {
        /// Partition description file (name,size,align,type,format,file per line)
        #[arg(short = 'f', long, value_name = "PATH")]
        file: Option<PathBuf>,

        /// Output image file or block device
        #[arg(short, long, value_name = "PATH", required_unless_present = "report")]
        output: Option<PathBuf>,

        /// Extra directory to search for partition content files (repeatable)
        #[arg(short = 'I', long = "include", value_name = "DIR")]
        include: Vec<PathBuf>,

        /// Target image size (KiB, or with K/M/G suffix)
        #[arg(short, long, value_name = "SIZE")]
        size: Option<String>,

        /// Create the partition table only, do not write partition contents
        #[arg(long)]
        partition_only: bool,

        /// Print the planned layout and exit without touching any disk
        #[arg(long)]
        report: bool,

        /// JSON report output
        #[arg(long, requires = "report")]
        json: bool,

        /// Skip confirmation
        #[arg(short = 'y', long)]
        yes: bool,
    },

    /// Create a blank disk image
    Mkimg {
        /// Image path
        #[arg(short, long, value_name = "PATH")]
        output: PathBuf,

        /// Image size (KiB, or with K/M/G suffix)
        #[arg(long, value_name = "SIZE")]
        size: String,

        /// Allow overwrite existing file
        #[arg(long)]
        overwrite: bool,
    },

    /// Show disk and partition info
    Info {
        /// Disk image or device
        #[arg(long, value_name = "PATH")]
        disk: PathBuf,

        /// JSON output
        #[arg(long)]
        json: bool,
    },

    /// Rebuild primary + secondary GPT sectors from an sgdisk backup file
    Reassemble {
        /// sgdisk --backup file (35 sectors)
        #[arg(short, long, value_name = "PATH")]
        input: PathBuf,

        /// Output file (67 sectors)
        #[arg(short, long, value_name = "PATH")]
        output: PathBuf,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[command(subcommand)]
        action: DiskAction,
    }

    #[test]
    fn test_info_takes_disk_flag() {
        let cli = TestCli::try_parse_from(["gptimg", "info", "--disk", "disk.img", "--json"]).unwrap();
        match cli.action {
            DiskAction::Info { disk, json } => {
                assert_eq!(disk, PathBuf::from("disk.img"));
                assert!(json);
            }
            other => panic!("unexpected action {other:?}"),
        }

        assert!(TestCli::try_parse_from(["gptimg", "info", "disk.img"]).is_err());
    }

    #[test]
    fn test_build_requires_output_unless_report() {
        assert!(TestCli::try_parse_from(["gptimg", "build", "-f", "parts.txt"]).is_err());
        assert!(TestCli::try_parse_from(["gptimg", "build", "-f", "parts.txt", "--report"]).is_ok());
    }
}
