use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use parhash::memory::MemoryMonitor;
use parhash::{
    Algorithm, HashConfig, OrderedSink, Pipeline, ResultSink, SystemMemory, ThreadCount,
    ThrottlePolicy, WriterSink,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

/// Command-line interface for parhash
#[derive(Parser, Debug)]
#[command(
    name = "parhash",
    version,
    about = "Hash a file in fixed-size parts using parallel workers"
)]
struct Cli {
    /// Size of each part in bytes
    #[arg(value_name = "CHUNK_SIZE")]
    chunk_size: usize,

    /// Number of hashing threads, or "auto" for one per logical core
    #[arg(value_name = "THREADS")]
    threads: ThreadCount,

    /// File to hash
    #[arg(value_name = "FILE")]
    file: PathBuf,

    /// Hash algorithm applied to each part
    #[arg(short, long, value_enum, default_value_t = Algorithm::Sha256)]
    algorithm: Algorithm,

    /// Print parts in file order instead of completion order
    #[arg(long)]
    ordered: bool,

    /// Disables the progress bar
    #[arg(long)]
    no_progress: bool,

    /// Print run statistics to stderr when done
    #[arg(long)]
    summary: bool,

    /// Pause reading while free memory is below this percentage of total memory
    #[arg(long, value_name = "PERCENT", default_value_t = parhash::config::DEFAULT_SWAP_BOUNDARY_PERCENT,
        value_parser = clap::value_parser!(u8).range(0..=100))]
    swap_boundary: u8,

    /// Do not reserve one chunk of free memory per worker before reading
    #[arg(long)]
    no_working_set_check: bool,
}

fn main() -> ExitCode {
    // Initialize logging using env_logger and PARHASH_LOG
    env_logger::Builder::from_env(env_logger::Env::new().filter("PARHASH_LOG")).init();

    let cli = Cli::parse();

    let monitor = match SystemMemory::new() {
        Ok(m) => Arc::new(m),
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    let available = match monitor.available_bytes() {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let config = match HashConfig::new(cli.chunk_size, cli.threads, &cli.file, available) {
        Ok(config) => config
            .with_algorithm(cli.algorithm)
            .with_throttle(ThrottlePolicy {
                swap_boundary_percent: cli.swap_boundary,
                reserve_working_set: !cli.no_working_set_check,
                ..ThrottlePolicy::default()
            }),
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::from(2);
        }
    };

    let pb = if cli.no_progress {
        None
    } else {
        let pb = ProgressBar::new(0);
        pb.set_style(
            ProgressStyle::with_template(
                "[{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta}) {msg}",
            )
            .unwrap()
            .progress_chars("##-"),
        );
        pb.set_message("Hashing...");
        Some(pb)
    };

    let writer = match pb.as_ref() {
        Some(pb) => WriterSink::stdout().with_progress(pb.clone()),
        None => WriterSink::stdout(),
    };
    let sink: Arc<dyn ResultSink> = if cli.ordered {
        Arc::new(OrderedSink::new(writer))
    } else {
        Arc::new(writer)
    };

    let mut pipeline = Pipeline::new(config, sink, monitor);
    if let Some(pb) = pb {
        pipeline = pipeline.with_progress(pb);
    }

    match pipeline.start().and_then(|running| running.wait()) {
        Ok(summary) => {
            if cli.summary {
                eprintln!("{}", parhash::utils::summary_table(&summary));
            }
            eprintln!("Hashing completed successfully.");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Hashing failed: {}", e);
            ExitCode::FAILURE
        }
    }
}
