//! Types shared by every module decoder

use bit_set::BitSet;
use byteorder::{ByteOrder, LittleEndian};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use time::OffsetDateTime;

use crate::channel_address::ChannelAddress;
use crate::constants::WORD_SIZE;
use crate::error::DecodeError;

/// The module classes we know how to decode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ModuleKind {
    Gretina4M,
    Sis3302,
    MjdPreamp,
    IsegHv,
}

impl ModuleKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Gretina4M => "Gretina4M",
            Self::Sis3302 => "SIS3302",
            Self::MjdPreamp => "MJDPreamp",
            Self::IsegHv => "iSegHV",
        }
    }

    pub fn is_digitizer(&self) -> bool {
        matches!(self, Self::Gretina4M | Self::Sis3302)
    }
}

impl Display for ModuleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Extra fields only some digitizers produce
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub enum EventExtras {
    #[default]
    None,
    Sis3302 {
        /// Value of the onboard energy filter at the first sample of the energy gate
        energy_first: u32,
        /// Energy filter buffer
        energy_waveform: Vec<i16>,
        /// Pileup flag, retrigger flag, and trigger counter, positions undocumented
        pileup_word: u32,
        lost_records: u32,
        buffer_wrap: bool,
    },
}

/// A decoded digitizer event
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DecodedEvent {
    pub energy: u32,
    /// 48-bit clock timestamp
    pub timestamp: u64,
    pub channel: ChannelAddress,
    pub board_id: u16,
    pub waveform: Vec<i16>,
    pub event_number: u64,
    pub extras: EventExtras,
}

/// Where a slow control reading came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PollerSource {
    Device(u16),
    Card { crate_id: u8, card: u8 },
}

/// Per-channel readings of a slow control module
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum PollerReadings {
    Adc(Vec<f32>),
    HighVoltage { voltage: Vec<f32>, current: Vec<f32> },
}

/// A decoded slow control sample.
///
/// Readings of disabled channels are kept; masking them is left to the consumer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecodedPollerSample {
    /// Unix time of the measurement
    pub timestamp: u32,
    pub source: PollerSource,
    pub enabled: Vec<bool>,
    pub readings: PollerReadings,
    pub event_number: u64,
}

impl DecodedPollerSample {
    pub fn measured_at(&self) -> Option<OffsetDateTime> {
        OffsetDateTime::from_unix_timestamp(self.timestamp as i64).ok()
    }
}

/// The footer terminator of a record did not match the expected pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntegrityWarning {
    pub module: ModuleKind,
    pub expected: u32,
    pub found: u32,
}

impl Display for IntegrityWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Last word of {} record was {:#010x} instead of {:#010x}",
            self.module, self.found, self.expected
        )
    }
}

/// Why a record was not stored. Neither case is an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    ChannelNotActive(ChannelAddress),
    UnknownDiscriminant(u16),
}

/// Outcome of handing one payload to a decoder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeStatus {
    Stored,
    StoredWithWarning(IntegrityWarning),
    Skipped(SkipReason),
    /// Not kept, but the payload still failed an integrity check
    SkippedWithWarning(SkipReason, IntegrityWarning),
}

/// Which channels a digitizer decoder keeps.
///
/// A channel is active if it is in the known-enabled set from the run configuration (when
/// one was given) and in the user's channel filter (when one was given).
#[derive(Debug, Clone, Default)]
pub struct ChannelFilter {
    known_enabled: Option<BitSet>,
    allow_list: Option<BitSet>,
}

impl ChannelFilter {
    pub fn new(known_enabled: Option<BitSet>, allow_list: Option<BitSet>) -> Self {
        Self {
            known_enabled,
            allow_list,
        }
    }

    /// A filter which keeps everything
    pub fn accept_all() -> Self {
        Self::default()
    }

    /// Build an allow-list set from packed addresses
    pub fn allow_list_from(addresses: &[u32]) -> BitSet {
        addresses.iter().map(|a| *a as usize).collect()
    }

    pub fn is_active(&self, address: &ChannelAddress) -> bool {
        let key = address.raw() as usize;
        self.known_enabled
            .as_ref()
            .map_or(true, |set| set.contains(key))
            && self.allow_list.as_ref().map_or(true, |set| set.contains(key))
    }
}

/// Fail with ShortPayload if the payload is smaller than `expected` bytes
pub(crate) fn require_bytes(
    module: ModuleKind,
    payload: &[u8],
    expected: usize,
) -> Result<(), DecodeError> {
    if payload.len() < expected {
        Err(DecodeError::ShortPayload {
            module: module.name(),
            expected,
            found: payload.len(),
        })
    } else {
        Ok(())
    }
}

/// View the payload as little endian 16-bit words. A trailing odd byte is dropped.
pub(crate) fn u16_words(payload: &[u8]) -> Vec<u16> {
    let mut words = vec![0u16; payload.len() / 2];
    LittleEndian::read_u16_into(&payload[..words.len() * 2], &mut words);
    words
}

/// View the payload as little endian 32-bit words. Trailing bytes are dropped.
pub(crate) fn u32_words(payload: &[u8]) -> Vec<u32> {
    let mut words = vec![0u32; payload.len() / WORD_SIZE];
    LittleEndian::read_u32_into(&payload[..words.len() * WORD_SIZE], &mut words);
    words
}

/// Reinterpret the bits of a 32-bit word as a float
pub(crate) fn word_as_f32(word: u32) -> f32 {
    f32::from_bits(word)
}

/// Read signed 16-bit samples from a byte range
pub(crate) fn i16_samples(bytes: &[u8]) -> Vec<i16> {
    let mut samples = vec![0i16; bytes.len() / 2];
    LittleEndian::read_i16_into(&bytes[..samples.len() * 2], &mut samples);
    samples
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_accept_all() {
        let filter = ChannelFilter::accept_all();
        assert!(filter.is_active(&ChannelAddress::new(3, 4, 5)));
    }

    #[test]
    fn test_filter_known_and_allow() {
        let known = ChannelFilter::allow_list_from(&[161, 162]);
        let allow = ChannelFilter::allow_list_from(&[162, 600]);
        let filter = ChannelFilter::new(Some(known), Some(allow));
        assert!(!filter.is_active(&ChannelAddress::from_raw(161)));
        assert!(filter.is_active(&ChannelAddress::from_raw(162)));
        assert!(!filter.is_active(&ChannelAddress::from_raw(600)));
    }

    #[test]
    fn test_word_views() {
        let bytes = [0x01, 0x02, 0x03, 0x04, 0xFF];
        assert_eq!(u16_words(&bytes), vec![0x0201, 0x0403]);
        assert_eq!(u32_words(&bytes), vec![0x04030201]);
        assert_eq!(i16_samples(&[0xFE, 0xFF, 0x03, 0x00]), vec![-2, 3]);
        assert_eq!(word_as_f32(1.5f32.to_bits()), 1.5);
    }

    #[test]
    fn test_poller_datetime() {
        let sample = DecodedPollerSample {
            timestamp: 1_500_000_000,
            source: PollerSource::Device(1),
            enabled: vec![],
            readings: PollerReadings::Adc(vec![]),
            event_number: 0,
        };
        assert_eq!(sample.measured_at().unwrap().year(), 2017);
    }
}
