//! # orca_decoder_cli
//!
//! Part of the orca_decoder crate family.
//!
//! This is the command line application to decode ORCA run files.
//!
//! ## Use
//!
//! Make a template configuration file with
//!
//! ```bash
//! orca_decoder_cli -p config.yaml new
//! ```
//!
//! fill out the input files and the decoder map, and then decode with
//!
//! ```bash
//! orca_decoder_cli -p config.yaml
//! ```
//!
//! Progress is shown per worker in the terminal. The detailed log, including integrity
//! warnings and the per-module summary of each file, is written to `orca_decoder.log`.
use clap::{Arg, Command};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use indicatif_log_bridge::LogWrapper;
use std::path::{Path, PathBuf};
use std::sync::{mpsc, Arc};

use liborca_decoder::config::Config;
use liborca_decoder::error::{ProcessorError, RecordError};
use liborca_decoder::process::{create_subsets, process_subset};
use liborca_decoder::summary::DecodeSummary;
use liborca_decoder::worker_status::{BarColor, WorkerStatus};

/// What the CLI keeps of a decoded file once its tables are dropped
struct FileOutcome {
    path: PathBuf,
    summary: DecodeSummary,
    error: Option<RecordError>,
}

/// Route the library log to a file
fn init_file_log(path: &Path) -> Result<(), spdlog::Error> {
    let file_sink = Arc::new(
        spdlog::sink::FileSink::builder()
            .path(path)
            .formatter(Box::new(spdlog::formatter::PatternFormatter::new(
                spdlog::formatter::pattern!(
                    "[{date_short} {time_short}] - [thread: {tid}] - [{^{level}}] - {payload}{eol}"
                ),
            )))
            .truncate(true)
            .build()?,
    );
    let logger = Arc::new(
        spdlog::Logger::builder()
            .flush_level_filter(spdlog::LevelFilter::All)
            .sink(file_sink)
            .build()?,
    );
    spdlog::set_default_logger(logger);
    Ok(())
}

fn bar_style(color: &BarColor) -> ProgressStyle {
    let color = match color {
        BarColor::CYAN => "cyan",
        BarColor::MAGENTA => "magenta",
        BarColor::RED => "red",
        BarColor::GREEN => "green",
    };
    ProgressStyle::with_template(&format!(
        "Worker {{prefix}} [{{bar:40.{color}/blue}}] {{percent:>3}}% {{msg}}"
    ))
    .unwrap_or_else(|_| ProgressStyle::default_bar())
}

fn main() {
    // Create a cli
    let matches = Command::new("orca_decoder_cli")
        .arg_required_else_help(true)
        .subcommand(Command::new("new").about("Make a template configuration yaml file"))
        .arg(
            Arg::new("path")
                .short('p')
                .long("path")
                .required(true)
                .help("Path to the configuration file"),
        )
        .get_matches();

    // Initialize feedback
    let logger = simplelog::TermLogger::new(
        simplelog::LevelFilter::Info,
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    );

    let pb_manager = MultiProgress::new();

    if let Err(e) = LogWrapper::new(pb_manager.clone(), logger).try_init() {
        eprintln!("Could not create logging/progress: {e}");
        return;
    }

    let log_path = PathBuf::from("./orca_decoder.log");
    if let Err(e) = init_file_log(&log_path) {
        log::error!("Could not create log file {}: {e}", log_path.display());
        return;
    }
    spdlog::info!("Starting ORCA decoder");

    // Parse the cli
    let config_path = match matches.get_one::<String>("path") {
        Some(path) => PathBuf::from(path),
        None => {
            log::error!("A configuration path is required");
            return;
        }
    };

    if let Some(("new", _)) = matches.subcommand() {
        log::info!(
            "Making a template config at {}...",
            config_path.to_string_lossy()
        );
        match Config::default().write_config_file(&config_path) {
            Ok(()) => log::info!("Done."),
            Err(e) => log::error!("{e}"),
        }
        return;
    }

    // Load our config
    log::info!("Loading config from {}...", config_path.to_string_lossy());
    let config = match Config::read_config_file(&config_path) {
        Ok(c) => c,
        Err(e) => {
            log::error!("{e}");
            return;
        }
    };
    if !config.is_n_threads_valid() {
        log::error!("Number of workers must be at least 1, found {}", config.n_threads);
        return;
    }
    log::info!("Config successfully loaded.");
    let total_size: u64 = config
        .input_files
        .iter()
        .filter_map(|path| std::fs::metadata(path).ok())
        .map(|meta| meta.len())
        .sum();
    log::info!(
        "Input files: {} with total size {}",
        config.input_files.len(),
        human_bytes::human_bytes(total_size as f64)
    );
    for missing in config.missing_input_files() {
        log::warn!("Input file {} does not exist and will be skipped", missing.display());
    }
    match &config.channel_table_path {
        Some(path) => log::info!("Channel table: {}", path.to_string_lossy()),
        None => log::info!("Channel table: None"),
    }
    for entry in config.decoders.iter() {
        log::info!("Data id {} -> {}", entry.data_id, entry.module);
    }

    // Spawn the workers, one bar each
    let (tx, rx) = mpsc::channel::<WorkerStatus>();
    let mut workers = Vec::new();
    let mut bars = Vec::new();
    for subset in create_subsets(&config) {
        // Dont make empty workers
        if subset.is_empty() {
            continue;
        }
        let worker_id = workers.len();
        let bar = pb_manager.add(ProgressBar::new(100));
        bar.set_style(bar_style(&BarColor::CYAN));
        bar.set_prefix(worker_id.to_string());
        bars.push(bar);

        let conf = config.clone();
        let worker_tx = tx.clone();
        workers.push(std::thread::spawn(move || {
            let mut outcomes = Vec::new();
            process_subset(conf, worker_tx, worker_id, subset, |file| {
                outcomes.push(FileOutcome {
                    path: file.path,
                    summary: file.summary,
                    error: file.error,
                })
            })?;
            Ok::<_, ProcessorError>(outcomes)
        }));
    }
    // Only the workers hold senders now, so the channel closes when they are all done
    drop(tx);

    for status in rx.iter() {
        if let Some(bar) = bars.get(status.worker_id) {
            bar.set_style(bar_style(&status.color));
            bar.set_message(status.file_name.clone());
            bar.set_position((status.progress * 100.0) as u64);
        }
    }

    let mut total = DecodeSummary::new();
    let mut n_files = 0;
    let mut n_failed_streams = 0;
    for worker in workers {
        let result: Result<Vec<FileOutcome>, ProcessorError> = match worker.join() {
            Ok(result) => result,
            Err(_) => {
                log::error!("An error occured joining one of the workers!");
                continue;
            }
        };
        match result {
            Ok(outcomes) => {
                for file in outcomes.iter() {
                    total.merge(&file.summary);
                    n_files += 1;
                    if let Some(e) = &file.error {
                        n_failed_streams += 1;
                        log::warn!("{} ended early: {e}", file.path.display());
                    }
                }
            }
            Err(e) => log::error!("Decoding failed with error: {e}"),
        }
    }
    for bar in bars {
        bar.finish();
    }

    total.log_summary();
    for (kind, counts) in total.module_counts() {
        log::info!(
            "{kind}: {} decoded, {} skipped, {} warned, {} failed",
            counts.decoded,
            counts.skipped,
            counts.warned,
            counts.failed
        );
    }
    log::info!(
        "Decoded {n_files} files ({n_failed_streams} ended on a framing error), {} unknown records",
        total.unknown_records
    );
    if n_failed_streams > 0 {
        log::warn!(
            "Some files did not decode cleanly, check {} for details",
            log_path.display()
        );
    }
    log::info!("Done.");
}
