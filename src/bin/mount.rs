//! Mounts a filesystem at a local path over FUSE.
//!
//! The backend chain is built bottom-up: the concrete store at the base,
//! wrapped by an [`AsyncWriter`] for bounded-concurrency uploads, wrapped by
//! a [`DiskCache`], wrapped by a [`MemoryCache`] closest to the log. Reads
//! therefore check memory, then disk, then go async/remote on a miss.

use std::env;
use std::path::PathBuf;
use std::process::exit;
use std::sync::Arc;

use logfs::cache::{AsyncWriter, DiskCache, MemoryCache};
use logfs::object_store::LocalDirectoryStore;
use logfs::{FileSystem, MountConfig, ObjectStore};

struct Args {
    bucket_dir: Option<PathBuf>,
    bucket_name: Option<String>,
    mount_point: Option<PathBuf>,
    memory_cache_segments: usize,
    disk_cache_segments: usize,
    disk_cache_dir: PathBuf,
    write_queue_depth: usize,
    write_threads: usize,
    checkpoint_frequency_seconds: i64,
    help: bool,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            bucket_dir: None,
            bucket_name: None,
            mount_point: None,
            memory_cache_segments: 64,
            disk_cache_segments: 256,
            disk_cache_dir: env::temp_dir(),
            write_queue_depth: 8,
            write_threads: 4,
            checkpoint_frequency_seconds: MountConfig::default().checkpoint_frequency_seconds,
            help: false,
        }
    }
}

fn print_usage() {
    eprintln!("Usage: mount [options] <bucket-directory> <bucket-name> <mount-point>");
    eprintln!();
    eprintln!("Options:");
    eprintln!(" -h, --help                   prints usage");
    eprintln!(" --memory-cache-segments <n>  segments kept in the in-process LRU (default 64)");
    eprintln!(" --disk-cache-segments <n>    segments kept in the on-disk LRU (default 256)");
    eprintln!(" --disk-cache-dir <path>      parent directory for the disk cache's scratch dir");
    eprintln!(" --write-queue-depth <n>      max segments in flight to the backend (default 8)");
    eprintln!(" --write-threads <n>          upload worker threads (default 4)");
    eprintln!(" --checkpoint-seconds <n>     checkpoint interval in seconds (default 60)");
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Args {
    let mut res = Args::default();
    let mut positional = Vec::new();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-h" | "--help" => res.help = true,
            "--memory-cache-segments" => {
                res.memory_cache_segments = next_numeric(&mut args, "--memory-cache-segments");
            }
            "--disk-cache-segments" => {
                res.disk_cache_segments = next_numeric(&mut args, "--disk-cache-segments");
            }
            "--disk-cache-dir" => {
                res.disk_cache_dir = args.next().map(PathBuf::from).unwrap_or_else(|| {
                    eprintln!("mount: --disk-cache-dir requires a path");
                    exit(1);
                });
            }
            "--write-queue-depth" => {
                res.write_queue_depth = next_numeric(&mut args, "--write-queue-depth");
            }
            "--write-threads" => {
                res.write_threads = next_numeric(&mut args, "--write-threads");
            }
            "--checkpoint-seconds" => {
                res.checkpoint_frequency_seconds = next_numeric(&mut args, "--checkpoint-seconds");
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
    if let Some(mp) = positional.get(2) {
        res.mount_point = Some(PathBuf::from(mp));
    }
    res
}

fn next_numeric<T: std::str::FromStr>(args: &mut impl Iterator<Item = String>, flag: &str) -> T {
    args.next().and_then(|v| v.parse().ok()).unwrap_or_else(|| {
        eprintln!("mount: {flag} requires a numeric value");
        exit(1);
    })
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
    let mount_point = args.mount_point.unwrap_or_else(|| {
        print_usage();
        exit(1);
    });

    let base = LocalDirectoryStore::new(&bucket_dir, &bucket_name);
    let async_writer = AsyncWriter::new(Arc::new(base), args.write_queue_depth, args.write_threads);
    let disk_cache = DiskCache::new(Arc::new(async_writer), args.disk_cache_dir.clone(), args.disk_cache_segments)
        .unwrap_or_else(|e| {
            eprintln!("mount: failed to set up disk cache: {e}");
            exit(1);
        });
    let memory_cache = MemoryCache::new(Arc::new(disk_cache), args.memory_cache_segments);
    let backend: Arc<dyn ObjectStore> = Arc::new(memory_cache);

    let config = MountConfig {
        checkpoint_frequency_seconds: args.checkpoint_frequency_seconds,
    };
    let fs = FileSystem::mount(backend, config).unwrap_or_else(|e| {
        eprintln!("mount: failed to mount {bucket_name}: {e}");
        exit(1);
    });

    log::info!("mounting {bucket_name} at {}", mount_point.display());
    let options = vec![fuser::MountOption::FSName(format!("logfs:{bucket_name}"))];
    if let Err(e) = fuser::mount2(fs, &mount_point, &options) {
        eprintln!("mount: {e}");
        exit(1);
    }
}
