//! MJD preamplifier monitor (slow control poller)
//!
//! Little endian 32-bit words:
//!
//! ```text
//! 0       device id (low 12 bits)
//! 1       unix time of the reading
//! 2       enabled mask, one bit per ADC channel (low 16 bits)
//! 3..18   ADC values as IEEE 754 single precision floats
//! ```

use bitvec::prelude::*;

use super::common::{
    require_bytes, u32_words, word_as_f32, DecodeStatus, DecodedPollerSample, ModuleKind,
    PollerReadings, PollerSource,
};
use crate::constants::{NUMBER_OF_PREAMP_CHANNELS, PREAMP_ADC_WORD, PREAMP_DEVICE_MASK, WORD_SIZE};
use crate::error::DecodeError;

const PAYLOAD_BYTES: usize = (PREAMP_ADC_WORD + NUMBER_OF_PREAMP_CHANNELS) * WORD_SIZE;

#[derive(Debug, Clone, Default)]
pub struct MjdPreampDecoder {
    decoded_values: Vec<DecodedPollerSample>,
}

impl MjdPreampDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse(payload: &[u8], event_number: u64) -> Result<DecodedPollerSample, DecodeError> {
        require_bytes(ModuleKind::MjdPreamp, payload, PAYLOAD_BYTES)?;
        let words = u32_words(&payload[..PAYLOAD_BYTES]);

        let mask = words[2];
        let enabled = mask.view_bits::<Lsb0>()[..NUMBER_OF_PREAMP_CHANNELS]
            .iter()
            .map(|bit| *bit)
            .collect();
        let adc = words[PREAMP_ADC_WORD..]
            .iter()
            .map(|word| word_as_f32(*word))
            .collect();

        Ok(DecodedPollerSample {
            timestamp: words[1],
            source: PollerSource::Device((words[0] & PREAMP_DEVICE_MASK) as u16),
            enabled,
            readings: PollerReadings::Adc(adc),
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
            "MJDPreamp event {} -- source {:?} time {}",
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
mod tests {
    use super::*;

    fn build(device: u32, time: u32, mask: u32, adc: &[f32]) -> Vec<u8> {
        let mut words = vec![device, time, mask];
        words.extend(adc.iter().map(|v| v.to_bits()));
        words.iter().flat_map(|w| w.to_le_bytes()).collect()
    }

    #[test]
    fn test_decode() {
        let adc: Vec<f32> = (0..16).map(|i| i as f32 * 0.25 - 1.0).collect();
        // Upper bits of the device word are not part of the id
        let payload = build(0xF00A_B123, 1_400_000_000, 0x8005, &adc);
        let mut decoder = MjdPreampDecoder::new();
        assert_eq!(decoder.decode(&payload, 3), Ok(DecodeStatus::Stored));

        let sample = &decoder.decoded_values()[0];
        assert_eq!(sample.source, PollerSource::Device(0x123));
        assert_eq!(sample.timestamp, 1_400_000_000);
        assert_eq!(sample.event_number, 3);
        let mut expected_enabled = vec![false; 16];
        expected_enabled[0] = true;
        expected_enabled[2] = true;
        expected_enabled[15] = true;
        assert_eq!(sample.enabled, expected_enabled);
        assert_eq!(sample.readings, PollerReadings::Adc(adc));
    }

    #[test]
    fn test_disabled_readings_kept() {
        let adc = [7.5f32; 16];
        let sample = MjdPreampDecoder::parse(&build(1, 2, 0, &adc), 0).unwrap();
        assert!(sample.enabled.iter().all(|e| !e));
        assert_eq!(sample.readings, PollerReadings::Adc(adc.to_vec()));
    }

    #[test]
    fn test_short_payload() {
        let payload = build(1, 2, 3, &[0.0; 15]);
        assert_eq!(
            MjdPreampDecoder::parse(&payload, 0),
            Err(DecodeError::ShortPayload {
                module: "MJDPreamp",
                expected: 76,
                found: 72
            })
        );
    }
}
