//! Gretina4M waveform digitizer
//!
//! The payload is read as little endian 16-bit words:
//!
//! ```text
//! word 1      ---- ---^ ^^^^ ^^^^  card (low 5 bits), crate (next 4 bits)
//! word 4      ^^^^ ^^^^ ^^^^ ----  board id (12 bits)
//!             ---- ---- ---- ^^^^  channel
//! word 6..8   timestamp[15:0], timestamp[31:16], timestamp[47:32]
//! word 9..10  energy[15:0], energy[30:16] (word 10 bit 15 is reserved)
//! word 18..   waveform samples (signed)
//! ```
//!
//! The header nominally spans 32 words, but everything from word 18 on reads as clean
//! baseline, so samples are taken from there. The offset is not in any length field.

use super::common::{
    i16_samples, require_bytes, u16_words, ChannelFilter, DecodeStatus, DecodedEvent,
    EventExtras, ModuleKind, SkipReason,
};
use crate::channel_address::ChannelAddress;
use crate::constants::{
    GRETINA_CARD_WORD, GRETINA_CHANNEL_WORD, GRETINA_ENERGY_HIGH_MASK, GRETINA_ENERGY_WORD,
    GRETINA_HEADER_LENGTH, GRETINA_TIMESTAMP_WORD,
};
use crate::error::DecodeError;

const HEADER_BYTES: usize = GRETINA_HEADER_LENGTH * 2;

#[derive(Debug, Clone, Default)]
pub struct Gretina4MDecoder {
    filter: ChannelFilter,
    decoded_values: Vec<DecodedEvent>,
}

impl Gretina4MDecoder {
    pub fn new(filter: ChannelFilter) -> Self {
        Self {
            filter,
            decoded_values: Vec::new(),
        }
    }

    /// Parse a payload without storing it
    pub fn parse(payload: &[u8], event_number: u64) -> Result<DecodedEvent, DecodeError> {
        require_bytes(ModuleKind::Gretina4M, payload, HEADER_BYTES)?;
        let words = u16_words(&payload[..HEADER_BYTES]);

        let card = (words[GRETINA_CARD_WORD] & 0x1F) as u32;
        let crate_id = ((words[GRETINA_CARD_WORD] >> 5) & 0xF) as u32;
        let channel = (words[GRETINA_CHANNEL_WORD] & 0xF) as u32;
        let board_id = (words[GRETINA_CHANNEL_WORD] & 0xFFF0) >> 4;

        let timestamp = (words[GRETINA_TIMESTAMP_WORD] as u64)
            | ((words[GRETINA_TIMESTAMP_WORD + 1] as u64) << 16)
            | ((words[GRETINA_TIMESTAMP_WORD + 2] as u64) << 32);
        let energy = (words[GRETINA_ENERGY_WORD] as u32)
            | (((words[GRETINA_ENERGY_WORD + 1] & GRETINA_ENERGY_HIGH_MASK) as u32) << 16);

        Ok(DecodedEvent {
            energy,
            timestamp,
            channel: ChannelAddress::new(crate_id, card, channel),
            board_id,
            waveform: i16_samples(&payload[HEADER_BYTES..]),
            event_number,
            extras: EventExtras::None,
        })
    }

    /// Decode a payload, keeping it if the channel is active
    pub fn decode(
        &mut self,
        payload: &[u8],
        event_number: u64,
    ) -> Result<DecodeStatus, DecodeError> {
        let event = Self::parse(payload, event_number)?;
        if !self.filter.is_active(&event.channel) {
            return Ok(DecodeStatus::Skipped(SkipReason::ChannelNotActive(
                event.channel,
            )));
        }
        spdlog::trace!(
            "Gretina4M event {} -- channel {} energy {} timestamp {} samples {}",
            event_number,
            event.channel,
            event.energy,
            event.timestamp,
            event.waveform.len()
        );
        self.decoded_values.push(event);
        Ok(DecodeStatus::Stored)
    }

    pub fn decoded_values(&self) -> &[DecodedEvent] {
        &self.decoded_values
    }

    pub fn take_decoded(&mut self) -> Vec<DecodedEvent> {
        std::mem::take(&mut self.decoded_values)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    // A recorded Gretina4M payload (frame word removed)
    const RECORDED: &str = "00000a00aaaaaaaad1000000e178f14429009b9de2510b20eb43290003000000fefffffffafff9fffcfff5fffbfffafffdfffdff0300fbfff9fffafffefff9fff5fffffffefffbfff6fff6fffeff0300fdfff9fffdfff7fff8fffcfff5fff8fffafffcfffcfffefffefffafff4fff9fffbfff8fffafffbff0400f8fff8fff9fff7fff9fffdff0000fbff0400fbfff6fffcfffefffefff7fff8fffdfff9fffafffefffafff9fffcff01000000fdfff8fff9fffafffeff00000200f9fff8fffcfffbff0000f9fff8fffcff0000fbfffcfffbfffeffffffffff0200fffffafff5fff7fff7fffeff0200fefff8fffdfffcfff6fff8fffcfffdff";

    fn from_hex(hex: &str) -> Vec<u8> {
        (0..hex.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&hex[i..i + 2], 16).unwrap())
            .collect()
    }

    /// Build a payload from header field values and samples
    pub(crate) fn synthetic_payload(
        crate_id: u16,
        card: u16,
        channel: u16,
        board_id: u16,
        timestamp: u64,
        energy: u32,
        samples: &[i16],
    ) -> Vec<u8> {
        let mut words = [0u16; GRETINA_HEADER_LENGTH];
        words[1] = (crate_id << 5) | card;
        words[4] = (board_id << 4) | channel;
        words[6] = (timestamp & 0xFFFF) as u16;
        words[7] = ((timestamp >> 16) & 0xFFFF) as u16;
        words[8] = ((timestamp >> 32) & 0xFFFF) as u16;
        words[9] = (energy & 0xFFFF) as u16;
        words[10] = ((energy >> 16) & 0x7FFF) as u16;
        let mut bytes: Vec<u8> = words.iter().flat_map(|w| w.to_le_bytes()).collect();
        bytes.extend(samples.iter().flat_map(|s| s.to_le_bytes()));
        bytes
    }

    #[test]
    fn test_recorded_payload() {
        let payload = from_hex(RECORDED);
        let event = Gretina4MDecoder::parse(&payload, 0).unwrap();
        assert_eq!(event.channel.crate_id(), 0);
        assert_eq!(event.channel.card(), 10);
        assert_eq!(event.channel.channel(), 1);
        assert_eq!(event.channel.raw(), 161);
        assert_eq!(event.board_id, 13);
        assert_eq!(event.timestamp, 177250334945);
        assert_eq!(event.energy, 1373805979);
        assert_eq!(event.waveform.len(), 106);
        assert_eq!(&event.waveform[..4], &[-6, -7, -4, -11]);
        assert_eq!(&event.waveform[102..], &[-10, -8, -4, -3]);
    }

    #[test]
    fn test_synthetic_payload() {
        let samples: Vec<i16> = (0..50).map(|i| (i * 37 - 800) as i16).collect();
        let payload = synthetic_payload(3, 17, 9, 0xABC, 0xBEEF_1234_5678, 0x7FFF_FFFF, &samples);
        let event = Gretina4MDecoder::parse(&payload, 12).unwrap();
        assert_eq!(event.channel, ChannelAddress::new(3, 17, 9));
        assert_eq!(event.board_id, 0xABC);
        assert_eq!(event.timestamp, 0xBEEF_1234_5678);
        assert_eq!(event.energy, 0x7FFF_FFFF);
        assert_eq!(event.waveform, samples);
        assert_eq!(event.event_number, 12);
        assert_eq!(event.extras, EventExtras::None);
    }

    #[test]
    fn test_reserved_energy_bit_ignored() {
        let mut payload = synthetic_payload(0, 1, 2, 3, 4, 5, &[]);
        payload[21] |= 0x80; // high bit of word 10
        let event = Gretina4MDecoder::parse(&payload, 0).unwrap();
        assert_eq!(event.energy, 5);
        assert!(event.waveform.is_empty());
    }

    #[test]
    fn test_short_payload() {
        let payload = vec![0u8; HEADER_BYTES - 2];
        assert_eq!(
            Gretina4MDecoder::parse(&payload, 0),
            Err(DecodeError::ShortPayload {
                module: "Gretina4M",
                expected: HEADER_BYTES,
                found: HEADER_BYTES - 2
            })
        );
    }

    #[test]
    fn test_inactive_channel_skipped() {
        let allow = ChannelFilter::allow_list_from(&[ChannelAddress::new(0, 1, 2).raw()]);
        let mut decoder = Gretina4MDecoder::new(ChannelFilter::new(None, Some(allow)));

        let kept = synthetic_payload(0, 1, 2, 0, 0, 100, &[1, 2, 3]);
        let dropped = synthetic_payload(0, 1, 3, 0, 0, 200, &[1, 2, 3]);
        assert_eq!(decoder.decode(&kept, 0), Ok(DecodeStatus::Stored));
        assert_eq!(
            decoder.decode(&dropped, 1),
            Ok(DecodeStatus::Skipped(SkipReason::ChannelNotActive(
                ChannelAddress::new(0, 1, 3)
            )))
        );
        assert_eq!(decoder.decoded_values().len(), 1);
        assert_eq!(decoder.decoded_values()[0].energy, 100);

        let taken = decoder.take_decoded();
        assert_eq!(taken.len(), 1);
        assert!(decoder.decoded_values().is_empty());
    }
}
