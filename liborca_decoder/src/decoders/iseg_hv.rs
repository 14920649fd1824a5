//! iSeg high voltage card (slow control poller)
//!
//! Little endian 32-bit words:
//!
//! ```text
//! 0       crate (bits 20..24), card (bits 16..20)
//! 1       one nibble per channel, non-zero when the channel is on
//! 2       unused
//! 3       unix time of the reading
//! 4..19   (voltage, current) float pairs, one per channel
//! ```

use super::common::{
    require_bytes, u32_words, word_as_f32, DecodeStatus, DecodedPollerSample, ModuleKind,
    PollerReadings, PollerSource,
};
use crate::constants::{
    HV_CARD_SHIFT, HV_CRATE_SHIFT, HV_NIBBLE_MASK, HV_READING_WORD, HV_TIMESTAMP_WORD,
    NUMBER_OF_HV_CHANNELS, WORD_SIZE,
};
use crate::error::DecodeError;

const PAYLOAD_BYTES: usize = (HV_READING_WORD + 2 * NUMBER_OF_HV_CHANNELS) * WORD_SIZE;

#[derive(Debug, Clone, Default)]
pub struct IsegHvDecoder {
    decoded_values: Vec<DecodedPollerSample>,
}

impl IsegHvDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse(payload: &[u8], event_number: u64) -> Result<DecodedPollerSample, DecodeError> {
        require_bytes(ModuleKind::IsegHv, payload, PAYLOAD_BYTES)?;
        let words = u32_words(&payload[..PAYLOAD_BYTES]);

        let crate_id = ((words[0] >> HV_CRATE_SHIFT) & HV_NIBBLE_MASK) as u8;
        let card = ((words[0] >> HV_CARD_SHIFT) & HV_NIBBLE_MASK) as u8;
        let enabled = (0..NUMBER_OF_HV_CHANNELS)
            .map(|i| (words[1] >> (4 * i)) & HV_NIBBLE_MASK != 0)
            .collect();

        let mut voltage = Vec::with_capacity(NUMBER_OF_HV_CHANNELS);
        let mut current = Vec::with_capacity(NUMBER_OF_HV_CHANNELS);
        for pair in words[HV_READING_WORD..].chunks_exact(2) {
            voltage.push(word_as_f32(pair[0]));
            current.push(word_as_f32(pair[1]));
        }

        Ok(DecodedPollerSample {
            timestamp: words[HV_TIMESTAMP_WORD],
            source: PollerSource::Card { crate_id, card },
            enabled,
            readings: PollerReadings::HighVoltage { voltage, current },
            event_number,
        })
    }

    /// Decode a payload. Poller samples are always kept.
    pub fn decode(
        &mut self,
        payload: &[u8],
        event_number: u64,
    ) -> Result<DecodeStatus, DecodeError> {
        let sample = Self::parse(payload, event_number)?;
        spdlog::trace!(
            "iSegHV event {} -- source {:?} time {}",
            event_number,
            sample.source,
            sample.timestamp
        );
        self.decoded_values.push(sample);
        Ok(DecodeStatus::Stored)
    }

    pub fn decoded_values(&self) -> &[DecodedPollerSample] {
        &self.decoded_values
    }

    pub fn take_decoded(&mut self) -> Vec<DecodedPollerSample> {
        std::mem::take(&mut self.decoded_values)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Build a payload for a card with the given per-channel (enabled, voltage, current)
    pub(crate) fn synthetic_payload(
        crate_id: u32,
        card: u32,
        time: u32,
        channels: &[(bool, f32, f32); 8],
    ) -> Vec<u8> {
        let mut mask = 0u32;
        for (i, (on, _, _)) in channels.iter().enumerate() {
            if *on {
                mask |= 0x1 << (4 * i);
            }
        }
        let mut words = vec![(crate_id << 20) | (card << 16), mask, 0, time];
        for (_, v, c) in channels {
            words.push(v.to_bits());
            words.push(c.to_bits());
        }
        words.iter().flat_map(|w| w.to_le_bytes()).collect()
    }

    #[test]
    fn test_decode() {
        let mut channels = [(false, 0.0f32, 0.0f32); 8];
        channels[1] = (true, 2500.0, 0.5);
        channels[6] = (true, 1200.25, 1.75);
        channels[7] = (false, 3.0, 0.0);
        let payload = synthetic_payload(2, 9, 1_600_000_000, &channels);

        let mut decoder = IsegHvDecoder::new();
        assert_eq!(decoder.decode(&payload, 11), Ok(DecodeStatus::Stored));
        let sample = &decoder.decoded_values()[0];
        assert_eq!(sample.source, PollerSource::Card { crate_id: 2, card: 9 });
        assert_eq!(sample.timestamp, 1_600_000_000);
        assert_eq!(sample.event_number, 11);
        assert_eq!(
            sample.enabled,
            vec![false, true, false, false, false, false, true, false]
        );
        match &sample.readings {
            PollerReadings::HighVoltage { voltage, current } => {
                assert_eq!(voltage[1], 2500.0);
                assert_eq!(current[1], 0.5);
                assert_eq!(voltage[6], 1200.25);
                assert_eq!(current[6], 1.75);
                // Disabled channels still report their readings
                assert_eq!(voltage[7], 3.0);
                assert_eq!(voltage.len(), 8);
                assert_eq!(current.len(), 8);
            }
            _ => panic!("Expected high voltage readings"),
        }
    }

    #[test]
    fn test_any_nibble_bit_enables() {
        let mut payload = synthetic_payload(0, 0, 0, &[(false, 0.0, 0.0); 8]);
        payload[4..8].copy_from_slice(&0x8000_0400u32.to_le_bytes());
        let sample = IsegHvDecoder::parse(&payload, 0).unwrap();
        assert_eq!(
            sample.enabled,
            vec![false, false, true, false, false, false, false, true]
        );
    }

    #[test]
    fn test_short_payload() {
        let payload = synthetic_payload(0, 0, 0, &[(false, 0.0, 0.0); 8]);
        assert!(matches!(
            IsegHvDecoder::parse(&payload[..76], 0),
            Err(DecodeError::ShortPayload {
                expected: 80,
                found: 76,
                ..
            })
        ));
    }
}
