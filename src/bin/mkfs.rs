//! Formats a fresh filesystem in a local-directory bucket.

use std::env;
use std::path::PathBuf;
use std::process::exit;
use std::sync::Arc;

use logfs::filesystem::FormatConfig;
use logfs::object_store::LocalDirectoryStore;

struct Args {
    bucket_dir: Option<PathBuf>,
    bucket_name: Option<String>,
    block_size: u32,
    blocks_per_segment: u32,
    fs_size_hint: u64,
    help: bool,
}

impl Default for Args {
    fn default() -> Self {
        let defaults = FormatConfig::default();
        Self {
            bucket_dir: None,
            bucket_name: None,
            block_size: defaults.block_size,
            blocks_per_segment: defaults.blocks_per_segment,
            fs_size_hint: defaults.fs_size_hint,
            help: false,
        }
    }
}

fn print_usage() {
    eprintln!("Usage: mkfs [options] <bucket-directory> <bucket-name>");
    eprintln!();
    eprintln!("Options:");
    eprintln!(" -h, --help              prints usage");
    eprintln!(" --block-size <bytes>    block size in bytes (default 4096)");
    eprintln!(" --blocks-per-segment <n> blocks per segment (default 512)");
    eprintln!(" --size-hint <blocks>    filesystem size hint, in blocks (default 32768)");
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Args {
    let mut res = Args::default();
    let mut positional = Vec::new();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-h" | "--help" => res.help = true,
            "--block-size" => {
                res.block_size = args.next().and_then(|v| v.parse().ok()).unwrap_or_else(|| {
                    eprintln!("mkfs: --block-size requires a numeric value");
                    exit(1);
                });
            }
            "--blocks-per-segment" => {
                res.blocks_per_segment = args.next().and_then(|v| v.parse().ok()).unwrap_or_else(|| {
                    eprintln!("mkfs: --blocks-per-segment requires a numeric value");
                    exit(1);
                });
            }
            "--size-hint" => {
                res.fs_size_hint = args.next().and_then(|v| v.parse().ok()).unwrap_or_else(|| {
                    eprintln!("mkfs: --size-hint requires a numeric value");
                    exit(1);
                });
            }
            other => positional.push(other.to_string()),
        }
    }
    if let Some(dir) = positional.first() {
        res.bucket_dir = Some(PathBuf::from(dir));
    }
    if let Some(name) = positional.get(1) {
        res.bucket_name = Some(name.clone());
    }
    res
}

fn main() {
    env_logger::init();

    let args = parse_args(env::args().skip(1));
    if args.help {
        print_usage();
        exit(0);
    }
    let bucket_dir = args.bucket_dir.unwrap_or_else(|| {
        print_usage();
        exit(1);
    });
    let bucket_name = args.bucket_name.unwrap_or_else(|| {
        print_usage();
        exit(1);
    });

    let backend = Arc::new(LocalDirectoryStore::new(&bucket_dir, &bucket_name));
    let config = FormatConfig {
        bucket_name: bucket_name.clone(),
        block_size: args.block_size,
        blocks_per_segment: args.blocks_per_segment,
        fs_size_hint: args.fs_size_hint,
    };

    logfs::format(backend, config).unwrap_or_else(|e| {
        eprintln!("mkfs: {e}");
        exit(1);
    });
    println!("formatted {bucket_name} in {}", bucket_dir.display());
}
