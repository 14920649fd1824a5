use std::path::PathBuf;
use thiserror::Error;

use super::worker_status::WorkerStatus;

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("Failed to read record from stream: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Record was truncated -- declared {expected} bytes but only {available} were available")]
    TruncatedRecord { expected: usize, available: usize },
    #[error("Record framing is corrupt -- length of {length} words is not plausible (ceiling {ceiling})")]
    CorruptFraming { length: u32, ceiling: u32 },
    #[error("Run header record is malformed; declared {0} bytes of header text")]
    BadRunHeader(usize),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("{module} payload is too short -- expected at least {expected} bytes, found {found}")]
    ShortPayload {
        module: &'static str,
        expected: usize,
        found: usize,
    },
    #[error("SIS3302 wrap parameters are invalid -- start index {start} with wrap length {wrap_length} in a buffer of {buffer_length} words")]
    InvalidWrap {
        start: usize,
        wrap_length: usize,
        buffer_length: usize,
    },
}

#[derive(Debug, Error)]
pub enum ChannelTableError {
    #[error("ChannelTable failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("ChannelTable failed to parse an integer: {0}")]
    ParsingError(#[from] std::num::ParseIntError),
    #[error("ChannelTable was given a file with the incorrect format; most likely the number of columns is incorrect")]
    BadFileFormat,
    #[error("ChannelTable found channel {channel} for crate {crate_id} card {card}, which is out of range")]
    BadChannel { crate_id: u8, card: u8, channel: u8 },
    #[error("ChannelTable found multirate register {name}={value} for crate {crate_id} card {card} channel {channel}; the register is two bits wide")]
    BadMultirateRegister {
        name: &'static str,
        value: u8,
        crate_id: u8,
        card: u8,
        channel: u8,
    },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration as file {0:?} does not exist")]
    BadFilePath(PathBuf),
    #[error("Config failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Config failed to parse YAML: {0}")]
    ParsingError(#[from] serde_yaml::Error),
    #[error("Config lists data id {0} more than once")]
    DuplicateDataId(u16),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ReconstructionError {
    #[error("No timing configuration found for channel {0}")]
    MissingChannelConfig(u32),
    #[error("Timing counts ({counts}) do not fit in a waveform of {length} samples")]
    CountsExceedWaveform { counts: usize, length: usize },
    #[error("Edge kernel length {0} is invalid; it must be even and non-zero")]
    InvalidKernel(usize),
    #[error("Cannot reconstruct an empty waveform")]
    EmptyWaveform,
}

#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error("Processor failed due to Record error: {0}")]
    RecordError(#[from] RecordError),
    #[error("Processor failed due to Config error: {0}")]
    ConfigError(#[from] ConfigError),
    #[error("Processor failed due to ChannelTable error: {0}")]
    TableError(#[from] ChannelTableError),
    #[error("Processor could not open input file {0:?}")]
    BadFilePath(PathBuf),
    #[error("Processor failed due to Send error: {0}")]
    SendError(#[from] std::sync::mpsc::SendError<WorkerStatus>),
    #[error("Processor failed due to IO error: {0}")]
    IoError(#[from] std::io::Error),
}
