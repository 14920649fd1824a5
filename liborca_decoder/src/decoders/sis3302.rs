//! SIS3302 digitizer with ADC raw data and energy filter buffers
//!
//! The payload is read as little endian 32-bit words. The layout is not documented by the
//! vendor beyond the buffers themselves, so some fields are best guesses:
//!
//! ```text
//! 0   control word
//!       bit  0       buffer wrap mode
//!       bits 2..8    lost records [6:0]
//!       bits 8..15   channel
//!       bits 16..20  card
//!       bits 21..24  crate
//!       bits 25..31  lost records [13:7]
//!     Bit 8 is shared: channel bit 0 is also read as lost records bit 6, so an odd
//!     channel always reports at least 64 lost records in the low field.
//! 1   waveform buffer length (long words)
//! 2   energy buffer length (long words)
//! 3   timestamp[47:32] (high half), header/ADC id (low byte)
//! 4   timestamp[31:0]
//! (5) wrap mode only: physical wrap length (long words)
//! (6) wrap mode only: wrap start index (long words)
//!     waveform buffer, then energy buffer, two 16-bit samples per word (low half first)
//! -4  energy filter max value
//! -3  energy filter first value
//! -2  pileup flag, retrigger flag, trigger counter
//! -1  0xDEADBEEF
//! ```

use super::common::{
    i16_samples, require_bytes, u32_words, ChannelFilter, DecodeStatus, DecodedEvent,
    EventExtras, IntegrityWarning, ModuleKind, SkipReason,
};
use crate::channel_address::ChannelAddress;
use crate::constants::{
    CARD_MASK, CRATE_MASK, SIS_BASE_HEADER_LENGTH, SIS_CARD_SHIFT, SIS_CHANNEL_MASK,
    SIS_CHANNEL_SHIFT, SIS_CRATE_SHIFT, SIS_FOOTER_LENGTH, SIS_HEADER_ID_MASK,
    SIS_LOST_RECORDS_FIELD_MASK, SIS_LOST_RECORDS_LSB_SHIFT, SIS_LOST_RECORDS_MSB_SHIFT,
    SIS_SENTINEL, SIS_WRAP_HEADER_LENGTH, WORD_SIZE,
};
use crate::error::DecodeError;

/// The fields of the control word (word 0)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ControlWord {
    buffer_wrap: bool,
    lost_records: u32,
    channel: u32,
    card: u32,
    crate_id: u32,
}

impl From<u32> for ControlWord {
    fn from(word: u32) -> Self {
        let msb = (word >> SIS_LOST_RECORDS_MSB_SHIFT) & SIS_LOST_RECORDS_FIELD_MASK;
        let lsb = (word >> SIS_LOST_RECORDS_LSB_SHIFT) & SIS_LOST_RECORDS_FIELD_MASK;
        Self {
            buffer_wrap: word & 0x1 != 0,
            lost_records: (msb << 7) | lsb,
            channel: (word >> SIS_CHANNEL_SHIFT) & SIS_CHANNEL_MASK,
            card: (word >> SIS_CARD_SHIFT) & CARD_MASK,
            crate_id: (word >> SIS_CRATE_SHIFT) & CRATE_MASK,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Sis3302Decoder {
    filter: ChannelFilter,
    decoded_values: Vec<DecodedEvent>,
}

impl Sis3302Decoder {
    pub fn new(filter: ChannelFilter) -> Self {
        Self {
            filter,
            decoded_values: Vec::new(),
        }
    }

    /// Parse a payload without storing it.
    ///
    /// A bad footer terminator does not fail the parse; the event is returned along with
    /// the warning and the caller decides what to do about it.
    pub fn parse(
        payload: &[u8],
        event_number: u64,
    ) -> Result<(DecodedEvent, Option<IntegrityWarning>), DecodeError> {
        require_bytes(
            ModuleKind::Sis3302,
            payload,
            (SIS_BASE_HEADER_LENGTH + SIS_FOOTER_LENGTH) * WORD_SIZE,
        )?;
        let words = u32_words(payload);

        let control = ControlWord::from(words[0]);
        let waveform_length = words[1] as usize;
        let energy_length = words[2] as usize;
        let header_id = (words[3] & SIS_HEADER_ID_MASK) as u16;
        let timestamp = ((((words[3] >> 16) & 0xFFFF) as u64) << 32) | words[4] as u64;

        let header_length = if control.buffer_wrap {
            SIS_WRAP_HEADER_LENGTH
        } else {
            SIS_BASE_HEADER_LENGTH
        };
        let footer_start = header_length + waveform_length + energy_length;
        require_bytes(
            ModuleKind::Sis3302,
            payload,
            (footer_start + SIS_FOOTER_LENGTH) * WORD_SIZE,
        )?;

        let waveform_bytes =
            &payload[header_length * WORD_SIZE..(header_length + waveform_length) * WORD_SIZE];
        let energy_bytes = &payload[(header_length + waveform_length) * WORD_SIZE
            ..footer_start * WORD_SIZE];

        let waveform = if control.buffer_wrap {
            let wrap_length = words[5] as usize;
            let start = words[6] as usize;
            unwrap_buffer(&i16_samples(waveform_bytes), wrap_length, start)?
        } else {
            i16_samples(waveform_bytes)
        };

        let energy_max = words[footer_start];
        let energy_first = words[footer_start + 1];
        let pileup_word = words[footer_start + 2];
        let terminator = words[footer_start + 3];
        let warning = if terminator != SIS_SENTINEL {
            Some(IntegrityWarning {
                module: ModuleKind::Sis3302,
                expected: SIS_SENTINEL,
                found: terminator,
            })
        } else {
            None
        };

        let event = DecodedEvent {
            energy: energy_max,
            timestamp,
            channel: ChannelAddress::new(control.crate_id, control.card, control.channel),
            board_id: header_id,
            waveform,
            event_number,
            extras: EventExtras::Sis3302 {
                energy_first,
                energy_waveform: i16_samples(energy_bytes),
                pileup_word,
                lost_records: control.lost_records,
                buffer_wrap: control.buffer_wrap,
            },
        };
        Ok((event, warning))
    }

    /// Decode a payload, keeping it if the channel is active
    pub fn decode(
        &mut self,
        payload: &[u8],
        event_number: u64,
    ) -> Result<DecodeStatus, DecodeError> {
        let (event, warning) = Self::parse(payload, event_number)?;
        if let Some(warn) = &warning {
            spdlog::warn!(
                "{warn} (event {event_number}); this may indicate a serious issue, continuing"
            );
        }
        if !self.filter.is_active(&event.channel) {
            let reason = SkipReason::ChannelNotActive(event.channel);
            return Ok(match warning {
                Some(warn) => DecodeStatus::SkippedWithWarning(reason, warn),
                None => DecodeStatus::Skipped(reason),
            });
        }
        spdlog::trace!(
            "SIS3302 event {} -- channel {} energy {} timestamp {} samples {} wrap {}",
            event_number,
            event.channel,
            event.energy,
            event.timestamp,
            event.waveform.len(),
            matches!(event.extras, EventExtras::Sis3302 { buffer_wrap: true, .. })
        );
        self.decoded_values.push(event);
        match warning {
            Some(warn) => Ok(DecodeStatus::StoredWithWarning(warn)),
            None => Ok(DecodeStatus::Stored),
        }
    }

    pub fn decoded_values(&self) -> &[DecodedEvent] {
        &self.decoded_values
    }

    pub fn take_decoded(&mut self) -> Vec<DecodedEvent> {
        std::mem::take(&mut self.decoded_values)
    }
}

/// Linearize a circular ADC buffer.
///
/// `wrap_length` and `start` are in long words (two samples each). The samples from the
/// start index to the physical end come first, followed by those from the buffer start up
/// to the start index. Samples beyond the wrap length are not part of the waveform.
fn unwrap_buffer(buffer: &[i16], wrap_length: usize, start: usize) -> Result<Vec<i16>, DecodeError> {
    let physical_end = wrap_length * 2;
    let rotation = start * 2;
    if physical_end > buffer.len() || rotation > physical_end {
        return Err(DecodeError::InvalidWrap {
            start,
            wrap_length,
            buffer_length: buffer.len() / 2,
        });
    }
    let mut waveform = Vec::with_capacity(physical_end);
    waveform.extend_from_slice(&buffer[rotation..physical_end]);
    waveform.extend_from_slice(&buffer[..rotation]);
    Ok(waveform)
}
