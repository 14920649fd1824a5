// Framing
pub const WORD_SIZE: usize = 4; // bytes per long word
pub const FRAME_LENGTH_MASK: u32 = 0x3FFFF; // low 18 bits
pub const FRAME_DISCRIMINANT_SHIFT: u32 = 18;
pub const MAX_RECORD_WORDS: u32 = FRAME_LENGTH_MASK; // largest length a frame word can hold
pub const RUN_HEADER_DISCRIMINANT: u16 = 0;

// Channel address packing
pub const CRATE_SHIFT: u32 = 9;
pub const CARD_SHIFT: u32 = 4;
pub const CRATE_MASK: u32 = 0xF;
pub const CARD_MASK: u32 = 0x1F;
pub const CHANNEL_MASK: u32 = 0xF;
pub const ADDRESS_SPACE: usize = 1 << 13; // every packable address is below this

// Gretina4M (16-bit words)
pub const GRETINA_HEADER_LENGTH: usize = 18; // empirically, not from a length field
pub const GRETINA_CARD_WORD: usize = 1;
pub const GRETINA_CHANNEL_WORD: usize = 4;
pub const GRETINA_TIMESTAMP_WORD: usize = 6;
pub const GRETINA_ENERGY_WORD: usize = 9;
pub const GRETINA_ENERGY_HIGH_MASK: u16 = 0x7FFF;

// SIS3302 (32-bit words)
pub const SIS_BASE_HEADER_LENGTH: usize = 5;
pub const SIS_WRAP_HEADER_LENGTH: usize = 7;
pub const SIS_FOOTER_LENGTH: usize = 4;
pub const SIS_SENTINEL: u32 = 0xDEADBEEF;
pub const SIS_LOST_RECORDS_FIELD_MASK: u32 = 0x7F;
pub const SIS_LOST_RECORDS_MSB_SHIFT: u32 = 25;
pub const SIS_LOST_RECORDS_LSB_SHIFT: u32 = 2;
pub const SIS_CHANNEL_SHIFT: u32 = 8;
pub const SIS_CHANNEL_MASK: u32 = 0xFF;
pub const SIS_CARD_SHIFT: u32 = 16;
pub const SIS_CRATE_SHIFT: u32 = 21;
pub const SIS_HEADER_ID_MASK: u32 = 0xFF;

// Pollers
pub const NUMBER_OF_PREAMP_CHANNELS: usize = 16;
pub const PREAMP_DEVICE_MASK: u32 = 0xFFF;
pub const PREAMP_ADC_WORD: usize = 3;
pub const NUMBER_OF_HV_CHANNELS: usize = 8;
pub const HV_CRATE_SHIFT: u32 = 20;
pub const HV_CARD_SHIFT: u32 = 16;
pub const HV_NIBBLE_MASK: u32 = 0xF;
pub const HV_TIMESTAMP_WORD: usize = 3;
pub const HV_READING_WORD: usize = 4;

// Waveform reconstruction
pub const DEFAULT_SAMPLE_PERIOD_NS: f64 = 10.0;
pub const DEFAULT_WAVEFORM_LENGTH: usize = 2018;
pub const DEFAULT_EDGE_KERNEL_LENGTH: usize = 20;
pub const BASELINE_SEARCH_MARGIN: usize = 4; // search [0, expected + margin)
pub const FLAT_TOP_SEARCH_MARGIN: usize = 5; // search [expected - margin, end)
