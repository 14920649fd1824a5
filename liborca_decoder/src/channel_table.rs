// The run header describes every digitizer card as a set of per-channel arrays
// (Prerecnt[], Postrecnt[], FtCnt[], Mrpsrt[], Mrpsdv[], Enabled[]) keyed by crate and card.
// Parsing the header itself is someone else's job; here we just take a flattened CSV of it,
// one row per channel, and rebuild the per-card arrays so lookups mirror the header layout:
// [crate, card] -> CardTiming -> channel index
use bit_set::BitSet;
use fxhash::FxHashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use super::channel_address::ChannelAddress;
use super::constants::ADDRESS_SPACE;
use super::error::ChannelTableError;

const ENTRIES_PER_LINE: usize = 9; // crate,card,channel,enabled,prerecnt,postrecnt,ftcnt,mrpsrt,mrpsdv
const MAX_CHANNELS_PER_CARD: usize = 16;
const MAX_MULTIRATE_EXPONENT: u8 = 3;

/// Timing configuration of a single digitizer channel.
///
/// The multirate factors are the decoded factors, not the register exponents.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelTimingConfig {
    pub prerecord_count: usize,
    pub postrecord_count: usize,
    pub flat_top_count: usize,
    pub multirate_sum: u32,
    pub multirate_div: u32,
}

impl ChannelTimingConfig {
    /// Build from the register values stored in the run header.
    ///
    /// The sum register encodes 2, 4, 8 for 0, 1, 2 and 10 (not 16) for 3. The divider
    /// register is a plain power of two.
    pub fn from_exponents(
        prerecord_count: usize,
        postrecord_count: usize,
        flat_top_count: usize,
        sum_exponent: u8,
        div_exponent: u8,
    ) -> Self {
        Self {
            prerecord_count,
            postrecord_count,
            flat_top_count,
            multirate_sum: multirate_sum_factor(sum_exponent),
            multirate_div: multirate_div_factor(div_exponent),
        }
    }

    /// Amplitude scale of a presummed sample relative to a full rate sample
    pub fn presum_ratio(&self) -> f64 {
        self.multirate_sum as f64 / self.multirate_div as f64
    }
}

pub fn multirate_sum_factor(exponent: u8) -> u32 {
    if exponent == 3 {
        10
    } else {
        2u32.pow(exponent as u32 + 1)
    }
}

pub fn multirate_div_factor(exponent: u8) -> u32 {
    2u32.pow(exponent as u32)
}

/// The per-channel arrays of one card, as they appear in the run header
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CardTiming {
    pub enabled: [bool; MAX_CHANNELS_PER_CARD],
    pub prerecord_count: [u32; MAX_CHANNELS_PER_CARD],
    pub postrecord_count: [u32; MAX_CHANNELS_PER_CARD],
    pub flat_top_count: [u32; MAX_CHANNELS_PER_CARD],
    pub multirate_sum_exponent: [u8; MAX_CHANNELS_PER_CARD],
    pub multirate_div_exponent: [u8; MAX_CHANNELS_PER_CARD],
}

impl CardTiming {
    /// Returns None for channels off the card or with register values out of range
    pub fn channel_timing(&self, channel: usize) -> Option<ChannelTimingConfig> {
        if channel >= MAX_CHANNELS_PER_CARD
            || self.multirate_sum_exponent[channel] > MAX_MULTIRATE_EXPONENT
            || self.multirate_div_exponent[channel] > MAX_MULTIRATE_EXPONENT
        {
            return None;
        }
        Some(ChannelTimingConfig::from_exponents(
            self.prerecord_count[channel] as usize,
            self.postrecord_count[channel] as usize,
            self.flat_top_count[channel] as usize,
            self.multirate_sum_exponent[channel],
            self.multirate_div_exponent[channel],
        ))
    }
}

/// ChannelTable holds the timing configuration of every digitizer card in a run.
///
/// Loaded once per run and shared read-only by every reconstruction. Also supplies the set
/// of enabled channels used to keep inactive channels out of the decoded tables.
#[derive(Debug, Clone, Default)]
pub struct ChannelTable {
    cards: FxHashMap<(u8, u8), CardTiming>,
}

impl ChannelTable {
    /// Load a ChannelTable from a CSV file
    pub fn new(path: &Path) -> Result<Self, ChannelTableError> {
        let mut contents = String::new();
        let mut file = File::open(path)?;
        file.read_to_string(&mut contents)?;
        Self::parse(&contents)
    }

    /// Parse the CSV contents. The first line is a header and is skipped.
    pub fn parse(contents: &str) -> Result<Self, ChannelTableError> {
        let mut table = ChannelTable::default();

        let mut lines = contents.lines();
        lines.next(); // Skip the header
        for line in lines {
            if line.trim().is_empty() {
                continue;
            }
            let entries: Vec<&str> = line.split_terminator(",").map(|e| e.trim()).collect();
            if entries.len() != ENTRIES_PER_LINE {
                return Err(ChannelTableError::BadFileFormat);
            }

            let crate_id: u8 = entries[0].parse()?;
            let card: u8 = entries[1].parse()?;
            let channel: u8 = entries[2].parse()?;
            if channel as usize >= MAX_CHANNELS_PER_CARD || crate_id > 0xF || card > 0x1F {
                return Err(ChannelTableError::BadChannel {
                    crate_id,
                    card,
                    channel,
                });
            }
            let ch = channel as usize;
            let sum_exponent: u8 = entries[7].parse()?;
            let div_exponent: u8 = entries[8].parse()?;
            for (name, value) in [("mrpsrt", sum_exponent), ("mrpsdv", div_exponent)] {
                if value > MAX_MULTIRATE_EXPONENT {
                    return Err(ChannelTableError::BadMultirateRegister {
                        name,
                        value,
                        crate_id,
                        card,
                        channel,
                    });
                }
            }
            let timing = table.cards.entry((crate_id, card)).or_default();
            timing.enabled[ch] = parse_flag(entries[3])?;
            timing.prerecord_count[ch] = entries[4].parse()?;
            timing.postrecord_count[ch] = entries[5].parse()?;
            timing.flat_top_count[ch] = entries[6].parse()?;
            timing.multirate_sum_exponent[ch] = sum_exponent;
            timing.multirate_div_exponent[ch] = div_exponent;
        }

        Ok(table)
    }

    /// Add or replace the arrays for a card
    pub fn insert_card(&mut self, crate_id: u8, card: u8, timing: CardTiming) {
        self.cards.insert((crate_id, card), timing);
    }

    /// Get the per-channel arrays for a (crate, card) pair
    ///
    /// If returns None the card was not in the run
    pub fn get_card(&self, crate_id: u8, card: u8) -> Option<&CardTiming> {
        self.cards.get(&(crate_id, card))
    }

    /// Get the timing configuration for a single channel
    pub fn get_timing(&self, address: &ChannelAddress) -> Option<ChannelTimingConfig> {
        self.get_card(address.crate_id(), address.card())?
            .channel_timing(address.channel() as usize)
    }

    /// The packed addresses of every channel marked enabled
    pub fn enabled_channels(&self) -> BitSet {
        let mut set = BitSet::with_capacity(ADDRESS_SPACE);
        for ((crate_id, card), timing) in self.cards.iter() {
            for (channel, enabled) in timing.enabled.iter().enumerate() {
                if *enabled {
                    let address =
                        ChannelAddress::new(*crate_id as u32, *card as u32, channel as u32);
                    set.insert(address.raw() as usize);
                }
            }
        }
        set
    }

    pub fn n_cards(&self) -> usize {
        self.cards.len()
    }
}

fn parse_flag(entry: &str) -> Result<bool, ChannelTableError> {
    match entry {
        "true" => Ok(true),
        "false" => Ok(false),
        other => Ok(other.parse::<u8>()? != 0),
    }
}

//Unit tests
#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: &str = "crate,card,channel,enabled,prerecnt,postrecnt,ftcnt,mrpsrt,mrpsdv
0,10,1,1,1000,20,400,3,0
0,10,2,0,1000,20,400,1,1
1,4,0,true,500,10,200,0,2
";

    #[test]
    fn test_multirate_factors() {
        assert_eq!(multirate_sum_factor(0), 2);
        assert_eq!(multirate_sum_factor(1), 4);
        assert_eq!(multirate_sum_factor(2), 8);
        assert_eq!(multirate_sum_factor(3), 10);
        assert_eq!(multirate_div_factor(0), 1);
        assert_eq!(multirate_div_factor(3), 8);
    }

    #[test]
    fn test_parse_table() {
        let table = ChannelTable::parse(TABLE).unwrap();
        assert_eq!(table.n_cards(), 2);

        let timing = table.get_timing(&ChannelAddress::new(0, 10, 1)).unwrap();
        assert_eq!(timing.prerecord_count, 1000);
        assert_eq!(timing.postrecord_count, 20);
        assert_eq!(timing.flat_top_count, 400);
        assert_eq!(timing.multirate_sum, 10);
        assert_eq!(timing.multirate_div, 1);
        assert_eq!(timing.presum_ratio(), 10.0);

        let timing = table.get_timing(&ChannelAddress::new(1, 4, 0)).unwrap();
        assert_eq!(timing.multirate_sum, 2);
        assert_eq!(timing.multirate_div, 4);

        assert!(table.get_timing(&ChannelAddress::new(2, 4, 0)).is_none());
    }

    #[test]
    fn test_enabled_channels() {
        let table = ChannelTable::parse(TABLE).unwrap();
        let enabled = table.enabled_channels();
        assert!(enabled.contains(ChannelAddress::new(0, 10, 1).raw() as usize));
        assert!(!enabled.contains(ChannelAddress::new(0, 10, 2).raw() as usize));
        assert!(enabled.contains(ChannelAddress::new(1, 4, 0).raw() as usize));
        assert_eq!(enabled.len(), 2);
    }

    #[test]
    fn test_bad_format() {
        let bad = "header\n0,10,1,1,1000\n";
        assert!(matches!(
            ChannelTable::parse(bad),
            Err(ChannelTableError::BadFileFormat)
        ));
        let bad_channel = "header\n0,10,16,1,1000,20,400,3,0\n";
        assert!(matches!(
            ChannelTable::parse(bad_channel),
            Err(ChannelTableError::BadChannel { channel: 16, .. })
        ));
    }

    #[test]
    fn test_multirate_register_out_of_range() {
        let bad_sum = "header\n0,10,1,1,1000,20,400,31,0\n";
        assert!(matches!(
            ChannelTable::parse(bad_sum),
            Err(ChannelTableError::BadMultirateRegister {
                name: "mrpsrt",
                value: 31,
                channel: 1,
                ..
            })
        ));
        let bad_div = "header\n0,10,1,1,1000,20,400,0,4\n";
        assert!(matches!(
            ChannelTable::parse(bad_div),
            Err(ChannelTableError::BadMultirateRegister {
                name: "mrpsdv",
                value: 4,
                ..
            })
        ));

        // Cards built by hand bypass the parser
        let mut table = ChannelTable::default();
        let mut timing = CardTiming::default();
        timing.multirate_sum_exponent[1] = 31;
        table.insert_card(0, 10, timing);
        assert!(table.get_timing(&ChannelAddress::new(0, 10, 1)).is_none());
        assert!(table.get_timing(&ChannelAddress::new(0, 10, 0)).is_some());
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join("orca_decoder_channel_table_test.csv");
        std::fs::write(&path, TABLE).unwrap();
        let table = ChannelTable::new(&path).unwrap();
        assert_eq!(table.n_cards(), 2);
        std::fs::remove_file(&path).unwrap();
    }
}
