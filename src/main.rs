//! iostatd - iostat metrics collector.
//!
//! Runs the iostat utility (sysstat package), parses its periodic tabular
//! report into canonical metric keys and prints the latest readings as a
//! plain table or JSON. Supports one-shot and watch modes.
//!
//! Usage:
//!   iostatd                                          # print every metric once
//!   iostatd -w                                       # reprint every interval
//!   iostatd --json '/intel/linux/iostat/device/*/await'
//!   IOSTAT_PATH=/opt/sysstat/bin iostatd             # custom binary location

use tikv_jemallocator::Jemalloc;
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use clap::Parser;
use tracing::{Level, info};
use tracing_subscriber::EnvFilter;

use iostatd::collector::{CommandRunner, IostatCollector, Metric, MockCmd, RealCmd};

/// iostat metrics collector.
#[derive(Parser)]
#[command(name = "iostatd", about = "iostat metrics collector", version)]
struct Args {
    /// Report interval in seconds passed to iostat.
    #[arg(short, long, default_value = "1")]
    interval: u64,

    /// Metric requests: canonical keys or single-wildcard patterns
    /// (e.g. "/intel/linux/iostat/device/*/await"). Default: every metric.
    #[arg(value_name = "METRIC")]
    requests: Vec<String>,

    /// Keep collecting and reprinting every interval until interrupted.
    #[arg(short, long)]
    watch: bool,

    /// Print metrics as JSON instead of a plain table.
    #[arg(long)]
    json: bool,

    /// Replay a canned report instead of running iostat (demo mode).
    #[arg(long)]
    mock: bool,

    /// Increase logging verbosity (-v for debug, -vv for trace). Default is info level.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode - only show errors.
    #[arg(short, long)]
    quiet: bool,
}

/// Initializes the tracing subscriber with the appropriate log level.
fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let filter = EnvFilter::from_default_env()
        .add_directive(format!("iostatd={}", level).parse().expect("valid directive"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn main() {
    let args = Args::parse();
    init_logging(args.verbose, args.quiet);

    let result = if args.mock {
        run(IostatCollector::new(MockCmd::typical_report()), &args)
    } else {
        run(
            IostatCollector::new(RealCmd::new()).with_interval(args.interval),
            &args,
        )
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run<C: CommandRunner + 'static>(
    collector: IostatCollector<C>,
    args: &Args,
) -> Result<(), Box<dyn std::error::Error>> {
    let version = collector.start()?;
    info!("iostatd {} started, sysstat {}", env!("CARGO_PKG_VERSION"), version);

    let requests = if args.requests.is_empty() {
        collector.metric_types()
    } else {
        args.requests.clone()
    };
    info!(requests = requests.len(), interval = args.interval, "collecting");

    let running = Arc::new(AtomicBool::new(true));
    if args.watch {
        let r = Arc::clone(&running);
        ctrlc::set_handler(move || r.store(false, Ordering::SeqCst))?;
    }

    loop {
        let metrics = collector.collect(&requests)?;
        print_metrics(&metrics, args.json);

        if !args.watch || !running.load(Ordering::SeqCst) {
            return Ok(());
        }
        std::thread::sleep(Duration::from_secs(args.interval.max(1)));
        if !running.load(Ordering::SeqCst) {
            return Ok(());
        }
    }
}

fn print_metrics(metrics: &[Metric], json: bool) {
    if json {
        match serde_json::to_string_pretty(metrics) {
            Ok(out) => println!("{}", out),
            Err(e) => eprintln!("Error: failed to serialize metrics: {}", e),
        }
        return;
    }

    for metric in metrics {
        match metric.value {
            Some(v) => println!("{}\t{}", metric.namespace, v),
            None => println!("{}\t-", metric.namespace),
        }
    }
}
