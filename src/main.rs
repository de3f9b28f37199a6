//! # Broker Benchmark Suite - Main Entry Point
//!
//! The binary runs the scenario matrix against the in-process loopback
//! broker and writes the report files.
//!
//! 1. **Initialize logging**: colorized console output, optional log file
//! 2. **Parse arguments**: defaults, then `--config`, then flags
//! 3. **Select scenarios**: `--test` and `--kind` filters
//! 4. **Run**: every selected scenario, trial by trial
//! 5. **Report**: CSV, delivery log, time series, summary and console table
//!
//! ## Exit Codes
//!
//! - `0` on success (including `--list`)
//! - `2` for an invalid configuration, an invalid filter or an empty selection
//! - `1` for any other fatal error, such as an unwritable output directory

use anyhow::Result;
use broker_bench::{
    cli::Args,
    logging::init_logging,
    report::{print_summary_table, ResultsManager},
    BenchError, BenchmarkSuite, LoopbackBroker,
};
use clap::Parser;
use std::io::IsTerminal;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // The guard flushes the file layer when main returns.
    let _log_guard = match init_logging(args.verbose, args.quiet, args.log_file.as_deref()) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("{:#}", e);
            return ExitCode::from(1);
        }
    };

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::from(exit_code(&e))
        }
    }
}

async fn run(args: Args) -> Result<()> {
    let config = args.into_config()?;
    let filter = args.filter()?;

    let broker = Arc::new(LoopbackBroker::new(args.loopback_options()));
    let mut suite = BenchmarkSuite::new(config, broker.clone())?
        .status_line(!args.quiet && std::io::stderr().is_terminal());

    let selection = suite.select(filter.as_ref(), args.kind)?;

    if args.list {
        for line in suite.listing(&selection) {
            println!("{}", line);
        }
        return Ok(());
    }

    info!("Starting Broker Benchmark Suite v{}", broker_bench::VERSION);
    suite.run(&selection).await;
    broker.shutdown();

    let events = suite.deliveries().drain();
    let results = ResultsManager::new(&args.output_dir);
    results.write_all(suite.aggregator(), &events)?;
    info!("Results written to {}", results.output_dir().display());
    print_summary_table(suite.aggregator());

    info!("Broker Benchmark Suite completed");
    Ok(())
}

fn exit_code(e: &anyhow::Error) -> u8 {
    e.downcast_ref::<BenchError>().map_or(1, BenchError::exit_code)
}
