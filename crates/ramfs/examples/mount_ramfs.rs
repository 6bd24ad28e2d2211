//! Example: Mount an empty RAM filesystem with FUSE.
//!
//! Usage:
//!   cargo run -p ramfs --features fuse --example mount_ramfs -- <mountpoint> [options]
//!
//! Options:
//!   --stats              Show live statistics (updates every 2s)
//!   --quota-mb <n>       Block quota in MiB (default: 4096)
//!   --config <path>      JSON file with FsOptions
//!
//! Example:
//!   RUST_LOG=ramfs=debug cargo run -p ramfs --features fuse --example mount_ramfs -- \
//!       /tmp/ramfs --stats --quota-mb 64

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use ramfs::{FsOptions, FsStats, RamFs};
use tracing_subscriber::EnvFilter;

/// Command line arguments.
struct Args {
    mountpoint: PathBuf,
    show_stats: bool,
    quota_mb: Option<u64>,
    config: Option<PathBuf>,
}

impl Args {
    /// Parse command line arguments.
    ///
    /// # Returns
    /// Parsed arguments, or None if usage was printed.
    fn parse() -> Option<Self> {
        let args: Vec<String> = std::env::args().collect();

        if args.len() < 2 || args.iter().any(|a| a == "--help" || a == "-h") {
            Self::print_usage(&args[0]);
            return None;
        }

        let mut mountpoint: Option<PathBuf> = None;
        let mut show_stats: bool = false;
        let mut quota_mb: Option<u64> = None;
        let mut config: Option<PathBuf> = None;

        let mut i: usize = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--stats" => show_stats = true,
                "--quota-mb" => {
                    i += 1;
                    quota_mb = Some(args.get(i)?.parse().ok()?);
                }
                "--config" => {
                    i += 1;
                    config = Some(PathBuf::from(args.get(i)?));
                }
                arg if !arg.starts_with('-') => {
                    if mountpoint.is_none() {
                        mountpoint = Some(PathBuf::from(arg));
                    }
                }
                _ => {
                    eprintln!("Unknown option: {}", args[i]);
                    Self::print_usage(&args[0]);
                    return None;
                }
            }
            i += 1;
        }

        Some(Self {
            mountpoint: mountpoint?,
            show_stats,
            quota_mb,
            config,
        })
    }

    /// Print usage information.
    ///
    /// # Arguments
    /// * `program` - Program name for usage message
    fn print_usage(program: &str) {
        eprintln!("Usage: {} <mountpoint> [options]", program);
        eprintln!();
        eprintln!("Options:");
        eprintln!("  --stats              Show live statistics (updates every 2s)");
        eprintln!("  --quota-mb <n>       Block quota in MiB (default: 4096)");
        eprintln!("  --config <path>      JSON file with filesystem options");
    }
}

/// Print a statistics snapshot.
///
/// # Arguments
/// * `stats` - Collected filesystem stats
fn print_stats(stats: &FsStats) {
    println!("--- ramfs (up {}s) ---", stats.uptime_secs);
    println!(
        "blocks: {} used / {} total ({} free, {} B each)",
        stats.used_blocks, stats.total_blocks, stats.free_blocks, stats.block_size
    );
    println!(
        "inodes: {}  readdir sessions: {}  footprint: {} B",
        stats.inode_count, stats.readdir_sessions, stats.footprint_bytes
    );
}

/// Spawn a background thread that prints stats periodically.
///
/// # Arguments
/// * `fs` - Filesystem to query
/// * `running` - Atomic flag to control thread lifetime
/// * `interval_secs` - Interval between stats updates
fn spawn_stats_thread(
    fs: Arc<RamFs>,
    running: Arc<AtomicBool>,
    interval_secs: u64,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        while running.load(Ordering::SeqCst) {
            print_stats(&fs.stats());
            thread::sleep(Duration::from_secs(interval_secs));
        }
    })
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args: Args = match Args::parse() {
        Some(a) => a,
        None => std::process::exit(1),
    };

    let mut options: FsOptions = match &args.config {
        Some(path) => FsOptions::from_json(&std::fs::read_to_string(path)?)?,
        None => FsOptions::default(),
    };
    if let Some(mb) = args.quota_mb {
        options = options.with_quota_bytes(mb * 1024 * 1024);
    }

    if !args.mountpoint.exists() {
        std::fs::create_dir_all(&args.mountpoint)?;
    }

    let running: Arc<AtomicBool> = Arc::new(AtomicBool::new(true));
    let r: Arc<AtomicBool> = running.clone();
    ctrlc::set_handler(move || {
        println!("\nReceived SIGINT, unmounting...");
        r.store(false, Ordering::SeqCst);
    })?;

    let fs: Arc<RamFs> = Arc::new(RamFs::new(options)?);
    println!("Mounting ramfs at: {}", args.mountpoint.display());
    let session = ramfs::spawn_mount(fs.clone(), &args.mountpoint)?;

    let stats_handle: Option<thread::JoinHandle<()>> = if args.show_stats {
        Some(spawn_stats_thread(fs.clone(), running.clone(), 2))
    } else {
        println!("Press Ctrl+C to unmount and exit.");
        None
    };

    while running.load(Ordering::SeqCst) {
        thread::sleep(Duration::from_millis(100));
    }

    drop(session);

    if let Some(handle) = stats_handle {
        let _ = handle.join();
    }
    Ok(())
}
