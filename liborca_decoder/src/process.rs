use fxhash::FxHashMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;

use super::channel_table::ChannelTable;
use super::config::Config;
use super::decoders::{DecodedTable, ModuleKind};
use super::error::{ProcessorError, RecordError};
use super::reconstruction::{reconstruct_event, BoundarySource, ReconstructionParams};
use super::record::{RecordReader, RunHeader};
use super::registry::DecoderRegistry;
use super::summary::DecodeSummary;
use super::worker_status::{BarColor, WorkerStatus};

/// StreamDecoder drives one run stream: it pulls records from the reader, numbers them, and
/// hands them to the registry.
///
/// Every record other than the run header takes an event number, including records which
/// are skipped or fail to decode, so numbers line up with record positions in the stream.
pub struct StreamDecoder<R: Read> {
    reader: RecordReader<R>,
    registry: DecoderRegistry,
    summary: DecodeSummary,
    event_counter: u64,
    run_header: Option<RunHeader>,
}

impl<R: Read> StreamDecoder<R> {
    pub fn new(reader: RecordReader<R>, registry: DecoderRegistry) -> Self {
        Self {
            reader,
            registry,
            summary: DecodeSummary::new(),
            event_counter: 0,
            run_header: None,
        }
    }

    /// Decode the next record.
    ///
    /// Returns false once the stream has ended. Per-record decode failures are logged and
    /// counted; only framing errors are returned, since after one the next record boundary
    /// is unknown.
    pub fn process_next(&mut self) -> Result<bool, RecordError> {
        let record = match self.reader.next_record()? {
            Some(record) => record,
            None => return Ok(false),
        };

        if record.is_run_header() {
            match RunHeader::try_from(&record) {
                Ok(header) => {
                    spdlog::info!(
                        "Found run header with {} of property list",
                        human_bytes::human_bytes(header.xml.len() as f64)
                    );
                    self.run_header = Some(header);
                }
                Err(e) => spdlog::warn!("Could not read run header: {e}"),
            }
            self.summary.record_run_header();
            return Ok(true);
        }

        let event_number = self.event_counter;
        self.event_counter += 1;
        let kind = self.registry.module_kind(record.discriminant);
        match self
            .registry
            .dispatch(record.discriminant, &record.payload, event_number)
        {
            Ok(status) => self.summary.record_status(kind, &status),
            Err(e) => {
                spdlog::error!(
                    "Failed to decode record {event_number} with data id {}: {e}",
                    record.discriminant
                );
                if let Some(kind) = kind {
                    self.summary.record_failure(kind);
                }
            }
        }
        Ok(true)
    }

    /// Decode until the end of the stream. Tables decoded before an error are kept.
    pub fn run(&mut self) -> Result<(), RecordError> {
        while self.process_next()? {}
        Ok(())
    }

    pub fn registry(&self) -> &DecoderRegistry {
        &self.registry
    }

    pub fn summary(&self) -> &DecodeSummary {
        &self.summary
    }

    pub fn run_header(&self) -> Option<&RunHeader> {
        self.run_header.as_ref()
    }

    pub fn event_counter(&self) -> u64 {
        self.event_counter
    }

    pub fn bytes_read(&self) -> u64 {
        self.reader.bytes_read()
    }

    /// Consume the decoder, keeping what it produced
    pub fn finish(mut self, path: &Path, error: Option<RecordError>) -> DecodedFile {
        DecodedFile {
            path: path.to_path_buf(),
            run_header: self.run_header.take(),
            tables: self.registry.take_tables(),
            summary: self.summary,
            error,
        }
    }
}

/// Everything decoded from one file
#[derive(Debug)]
pub struct DecodedFile {
    pub path: PathBuf,
    pub run_header: Option<RunHeader>,
    /// Decoded tables keyed by data id
    pub tables: FxHashMap<u16, (ModuleKind, DecodedTable)>,
    pub summary: DecodeSummary,
    /// The framing error which ended the file early, if any
    pub error: Option<RecordError>,
}

/// Boundary detection outcomes for a set of digitizer events
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconstructionTally {
    pub detected: u64,
    pub fallback: u64,
    pub failed: u64,
}

/// Reconstruct every digitizer waveform of a file and count how the boundaries were found
pub fn tally_reconstruction(
    file: &DecodedFile,
    table: &ChannelTable,
    params: &ReconstructionParams,
) -> ReconstructionTally {
    let mut tally = ReconstructionTally::default();
    for (_, decoded) in file.tables.values() {
        let events = match decoded {
            DecodedTable::Events(events) => events,
            DecodedTable::PollerSamples(_) => continue,
        };
        for event in events {
            match reconstruct_event(event, table, params) {
                Ok(recon) => {
                    if recon.baseline_source == BoundarySource::Detected
                        && recon.flat_top_source == BoundarySource::Detected
                    {
                        tally.detected += 1;
                    } else {
                        tally.fallback += 1;
                    }
                }
                Err(e) => {
                    spdlog::debug!("Event {} not reconstructed: {e}", event.event_number);
                    tally.failed += 1;
                }
            }
        }
    }
    tally
}

/// The main loop of orca_decoder.
///
/// Decodes a single file, reporting progress through the sender. A framing error ends the
/// file early but is not returned as an error; it is kept in the DecodedFile along with
/// everything decoded before it.
pub fn process_file(
    config: &Config,
    path: &Path,
    table: Option<&ChannelTable>,
    tx: &Sender<WorkerStatus>,
    worker_id: &usize,
) -> Result<DecodedFile, ProcessorError> {
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default();
    let file = File::open(path).map_err(|_| ProcessorError::BadFilePath(path.to_path_buf()))?;
    let total_data_size = file.metadata()?.len();
    spdlog::info!(
        "Decoding {} with total size: {}",
        file_name,
        human_bytes::human_bytes(total_data_size as f64)
    );

    let registry = DecoderRegistry::from_config(config, table)?;
    let reader = RecordReader::with_ceiling(BufReader::new(file), config.max_record_words);
    let mut stream = StreamDecoder::new(reader, registry);

    let flush_frac: f32 = 0.01;
    let flush_val = (total_data_size as f64 * flush_frac as f64) as u64;
    let mut last_flush = 0;
    tx.send(WorkerStatus::new(0.0, &file_name, *worker_id, BarColor::CYAN))?;

    let error = loop {
        match stream.process_next() {
            Ok(true) => {
                let bytes_read = stream.bytes_read();
                if bytes_read - last_flush > flush_val {
                    last_flush = bytes_read;
                    tx.send(WorkerStatus::new(
                        bytes_read as f32 / total_data_size as f32,
                        &file_name,
                        *worker_id,
                        BarColor::CYAN,
                    ))?;
                }
            }
            Ok(false) => break None,
            Err(e) => {
                spdlog::error!(
                    "Stream {} ended after {} of {}: {e}",
                    file_name,
                    human_bytes::human_bytes(stream.bytes_read() as f64),
                    human_bytes::human_bytes(total_data_size as f64)
                );
                break Some(e);
            }
        }
    };

    let color = if error.is_some() {
        BarColor::RED
    } else {
        BarColor::GREEN
    };
    tx.send(WorkerStatus::new(1.0, &file_name, *worker_id, color))?;
    spdlog::info!(
        "Done with {} -- {} records numbered",
        file_name,
        stream.event_counter()
    );
    stream.summary().log_summary();

    Ok(stream.finish(path, error))
}

/// Load the channel table named by the config, if there is one
pub fn load_channel_table(config: &Config) -> Result<Option<ChannelTable>, ProcessorError> {
    match &config.channel_table_path {
        Some(path) => {
            let table = ChannelTable::new(path)?;
            spdlog::info!("Loaded channel table with {} cards", table.n_cards());
            Ok(Some(table))
        }
        None => Ok(None),
    }
}

/// The function to be called by a separate thread.
/// Processes every file in the config
pub fn process<F: FnMut(DecodedFile)>(
    config: Config,
    tx: Sender<WorkerStatus>,
    worker_id: usize,
    on_file: F,
) -> Result<(), ProcessorError> {
    let files = config.input_files.clone();
    process_subset(config, tx, worker_id, files, on_file)
}

/// Process a subset of files
///
/// Each DecodedFile is handed to `on_file` as soon as it is done, so only one file's tables
/// are held at a time unless the consumer keeps them.
pub fn process_subset<F: FnMut(DecodedFile)>(
    config: Config,
    tx: Sender<WorkerStatus>,
    worker_id: usize,
    subset: Vec<PathBuf>,
    mut on_file: F,
) -> Result<(), ProcessorError> {
    let table = load_channel_table(&config)?;
    for path in subset {
        if path.exists() {
            spdlog::info!("Processing file {}...", path.display());
            let file = process_file(&config, &path, table.as_ref(), &tx, &worker_id)?;
            if let Some(table) = table.as_ref() {
                let tally = tally_reconstruction(&file, table, &config.reconstruction);
                spdlog::info!(
                    "Waveform boundaries: {} detected, {} fell back, {} could not be reconstructed",
                    tally.detected,
                    tally.fallback,
                    tally.failed
                );
            }
            on_file(file);
            spdlog::info!("Finished processing file {}.", path.display());
        } else {
            let name = path.to_string_lossy();
            tx.send(WorkerStatus::new(1.0, &name, worker_id, BarColor::MAGENTA))?;
            spdlog::info!("File {} does not exist, skipping...", path.display());
        }
    }
    Ok(())
}

/// Divide the file list in to a set of subsets (per thread/worker)
pub fn create_subsets(config: &Config) -> Vec<Vec<PathBuf>> {
    let mut subsets: Vec<Vec<PathBuf>> = vec![Vec::new(); config.n_threads.max(1) as usize];
    let n_subsets = subsets.len();

    for (idx, path) in config.input_files.iter().enumerate() {
        subsets[idx % n_subsets].push(path.clone())
    }

    subsets
}
