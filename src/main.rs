use clap::Parser;
use emutime::config::{self, SchedulingModel};
use emutime::workload::Workload;
use log::info;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(version, about = "Drive the emulated timing core with a synthetic workload")]
struct Args {
    /// Path to probe config (defaults to the user config directory)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Dispatch events on a background thread against the host clock
    #[arg(long)]
    multicore: bool,

    /// Number of CPU ticks to run in single-core mode
    #[arg(long)]
    cycles: Option<u64>,

    /// Maximum ticks per scheduler slice
    #[arg(long)]
    slice: Option<i64>,

    /// Milliseconds of host time to run in multicore mode
    #[arg(long)]
    duration_ms: Option<u64>,

    /// Print every firing in dispatch order
    #[arg(long)]
    trace: bool,

    /// Write the effective settings back to the config file
    #[arg(long)]
    save_config: bool,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();
    let filter = if args.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter)).init();

    let config_path = args.config.unwrap_or_else(config::default_config_path);
    let mut cfg = config::load_from_file(&config_path);
    if args.multicore {
        cfg.model = SchedulingModel::Multicore;
    }
    if let Some(cycles) = args.cycles {
        cfg.cycles = cycles;
    }
    if let Some(slice) = args.slice {
        cfg.max_slice_length = slice;
    }
    if let Some(duration_ms) = args.duration_ms {
        cfg.duration_ms = duration_ms;
    }

    if args.save_config {
        match config::save_to_file(&config_path, &cfg) {
            Ok(()) => info!("Saved probe config to {}", config_path.display()),
            Err(e) => eprintln!("Failed to save config {}: {e}", config_path.display()),
        }
    }

    info!("Starting {:?} probe", cfg.model);
    let report = match Workload::new(cfg).run() {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Timing probe failed: {e}");
            return ExitCode::FAILURE;
        }
    };

    if args.trace {
        for f in &report.firings {
            println!("{:>14} {:<10} +{}ns", f.due, f.name, f.lateness);
        }
    }
    print!("{report}");
    ExitCode::SUCCESS
}
