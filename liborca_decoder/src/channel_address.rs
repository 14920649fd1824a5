use serde::{Deserialize, Serialize};
use std::fmt::Display;

use super::constants::{CARD_MASK, CARD_SHIFT, CHANNEL_MASK, CRATE_MASK, CRATE_SHIFT};

/// Pack a crate, card, and channel into a single identifier.
///
/// Each field is masked to its bit width (crate: 4, card: 5, channel: 4), so out of range
/// inputs are silently truncated. Validate raw fields before packing if that matters.
pub fn pack(crate_id: u32, card: u32, channel: u32) -> u32 {
    ((crate_id & CRATE_MASK) << CRATE_SHIFT)
        | ((card & CARD_MASK) << CARD_SHIFT)
        | (channel & CHANNEL_MASK)
}

/// Unpack an identifier into (crate, card, channel)
pub fn unpack(address: u32) -> (u32, u32, u32) {
    (
        (address >> CRATE_SHIFT) & CRATE_MASK,
        (address >> CARD_SHIFT) & CARD_MASK,
        address & CHANNEL_MASK,
    )
}

/// ChannelAddress is the packed (crate, card, channel) location of a readout channel.
///
/// Two records with the same address come from the same physical channel for the whole
/// run, so this is the join key for everything downstream (channel tables, filters,
/// reconstruction).
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ChannelAddress(u32);

impl ChannelAddress {
    pub fn new(crate_id: u32, card: u32, channel: u32) -> Self {
        Self(pack(crate_id, card, channel))
    }

    pub fn from_raw(address: u32) -> Self {
        let (crate_id, card, channel) = unpack(address);
        Self::new(crate_id, card, channel)
    }

    pub fn raw(&self) -> u32 {
        self.0
    }

    pub fn crate_id(&self) -> u8 {
        unpack(self.0).0 as u8
    }

    pub fn card(&self) -> u8 {
        unpack(self.0).1 as u8
    }

    pub fn channel(&self) -> u8 {
        unpack(self.0).2 as u8
    }
}

impl Display for ChannelAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} (crate {} card {} channel {})",
            self.0,
            self.crate_id(),
            self.card(),
            self.channel()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack_unpack_inverse() {
        for crate_id in 0..16 {
            for card in 0..32 {
                for channel in 0..16 {
                    assert_eq!(
                        unpack(pack(crate_id, card, channel)),
                        (crate_id, card, channel)
                    );
                }
            }
        }
    }

    #[test]
    fn test_known_address() {
        // crate 0, card 10, channel 1
        assert_eq!(pack(0, 10, 1), 161);
        let address = ChannelAddress::new(1, 3, 2);
        assert_eq!(address.raw(), (1 << 9) | (3 << 4) | 2);
        assert_eq!(address.crate_id(), 1);
        assert_eq!(address.card(), 3);
        assert_eq!(address.channel(), 2);
    }

    #[test]
    fn test_out_of_range_is_masked() {
        assert_eq!(pack(16, 32, 16), 0);
        assert_eq!(ChannelAddress::new(0, 0, 0x1F).channel(), 0xF);
    }
}
