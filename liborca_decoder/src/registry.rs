use fxhash::FxHashMap;

use super::channel_table::ChannelTable;
use super::config::Config;
use super::decoders::{
    ChannelFilter, DecodeStatus, DecodedTable, Decoder, ModuleKind, SkipReason,
};
use super::error::{ConfigError, DecodeError};

/// DecoderRegistry maps the data id found in a frame word to the decoder that owns it.
///
/// The mapping is fixed once the registry is built. Each stream gets its own registry, so
/// the decoded tables it accumulates belong to that stream alone.
#[derive(Debug, Clone, Default)]
pub struct DecoderRegistry {
    decoders: FxHashMap<u16, Decoder>,
}

impl DecoderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the registry described by a Config.
    ///
    /// The digitizers are given the enabled channels of the channel table (if any) and the
    /// user channel filter (if any).
    pub fn from_config(config: &Config, table: Option<&ChannelTable>) -> Result<Self, ConfigError> {
        let known_enabled = table.map(|t| t.enabled_channels());
        let allow_list = config
            .channel_filter
            .as_ref()
            .map(|addresses| ChannelFilter::allow_list_from(addresses));

        let mut registry = Self::new();
        for entry in config.decoders.iter() {
            let filter = ChannelFilter::new(known_enabled.clone(), allow_list.clone());
            if registry
                .register(entry.data_id, Decoder::new(entry.module, filter))
                .is_some()
            {
                return Err(ConfigError::DuplicateDataId(entry.data_id));
            }
        }
        Ok(registry)
    }

    /// Register a decoder for a data id. Returns the decoder it replaced, if any.
    pub fn register(&mut self, discriminant: u16, decoder: Decoder) -> Option<Decoder> {
        spdlog::debug!("Registered {} decoder for data id {}", decoder.kind(), discriminant);
        self.decoders.insert(discriminant, decoder)
    }

    /// Hand a payload to the decoder registered for its data id
    pub fn dispatch(
        &mut self,
        discriminant: u16,
        payload: &[u8],
        event_number: u64,
    ) -> Result<DecodeStatus, DecodeError> {
        match self.decoders.get_mut(&discriminant) {
            Some(decoder) => decoder.decode(payload, event_number),
            None => {
                spdlog::debug!(
                    "No decoder for data id {discriminant}, skipping {} bytes",
                    payload.len()
                );
                Ok(DecodeStatus::Skipped(SkipReason::UnknownDiscriminant(
                    discriminant,
                )))
            }
        }
    }

    pub fn module_kind(&self, discriminant: u16) -> Option<ModuleKind> {
        self.decoders.get(&discriminant).map(|d| d.kind())
    }

    pub fn decoder(&self, discriminant: u16) -> Option<&Decoder> {
        self.decoders.get(&discriminant)
    }

    pub fn decoder_mut(&mut self, discriminant: u16) -> Option<&mut Decoder> {
        self.decoders.get_mut(&discriminant)
    }

    pub fn n_decoders(&self) -> usize {
        self.decoders.len()
    }

    /// Move every decoder's table out, keyed by data id
    pub fn take_tables(&mut self) -> FxHashMap<u16, (ModuleKind, DecodedTable)> {
        self.decoders
            .iter_mut()
            .map(|(id, decoder)| (*id, (decoder.kind(), decoder.take_table())))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel_address::ChannelAddress;
    use crate::config::DecoderEntry;
    use crate::decoders::gretina4m;

    fn config_with(decoders: Vec<DecoderEntry>, channel_filter: Option<Vec<u32>>) -> Config {
        Config {
            decoders,
            channel_filter,
            ..Default::default()
        }
    }

    #[test]
    fn test_dispatch() {
        let mut registry = DecoderRegistry::new();
        registry.register(
            3,
            Decoder::new(ModuleKind::Gretina4M, ChannelFilter::accept_all()),
        );
        let payload = gretina4m::tests::synthetic_payload(0, 10, 1, 13, 99, 500, &[4, 5]);
        assert_eq!(registry.dispatch(3, &payload, 0), Ok(DecodeStatus::Stored));
        assert_eq!(
            registry.dispatch(4, &payload, 1),
            Ok(DecodeStatus::Skipped(SkipReason::UnknownDiscriminant(4)))
        );
        assert_eq!(registry.module_kind(3), Some(ModuleKind::Gretina4M));
        assert_eq!(registry.module_kind(4), None);
        assert_eq!(registry.decoder(3).map(|d| d.n_decoded()), Some(1));
    }

    #[test]
    fn test_short_payload_propagates() {
        let mut registry = DecoderRegistry::new();
        registry.register(7, Decoder::new(ModuleKind::IsegHv, ChannelFilter::accept_all()));
        assert!(matches!(
            registry.dispatch(7, &[0u8; 12], 0),
            Err(DecodeError::ShortPayload { .. })
        ));
        assert_eq!(registry.decoder(7).map(|d| d.n_decoded()), Some(0));
    }

    #[test]
    fn test_from_config_filters() {
        let table = ChannelTable::parse(
            "crate,card,channel,enabled,prerecnt,postrecnt,ftcnt,mrpsrt,mrpsdv\n\
             0,10,1,1,1000,20,400,3,0\n\
             0,10,2,1,1000,20,400,3,0\n\
             0,10,3,0,1000,20,400,3,0\n",
        )
        .unwrap();
        let allowed = vec![
            ChannelAddress::new(0, 10, 1).raw(),
            ChannelAddress::new(0, 10, 3).raw(),
        ];
        let config = config_with(
            vec![DecoderEntry {
                data_id: 5,
                module: ModuleKind::Gretina4M,
            }],
            Some(allowed),
        );
        let mut registry = DecoderRegistry::from_config(&config, Some(&table)).unwrap();

        // Enabled and allowed
        let kept = gretina4m::tests::synthetic_payload(0, 10, 1, 0, 0, 0, &[]);
        // Enabled but not allowed
        let not_allowed = gretina4m::tests::synthetic_payload(0, 10, 2, 0, 0, 0, &[]);
        // Allowed but not enabled
        let not_enabled = gretina4m::tests::synthetic_payload(0, 10, 3, 0, 0, 0, &[]);

        assert_eq!(registry.dispatch(5, &kept, 0), Ok(DecodeStatus::Stored));
        assert!(matches!(
            registry.dispatch(5, &not_allowed, 1),
            Ok(DecodeStatus::Skipped(SkipReason::ChannelNotActive(_)))
        ));
        assert!(matches!(
            registry.dispatch(5, &not_enabled, 2),
            Ok(DecodeStatus::Skipped(SkipReason::ChannelNotActive(_)))
        ));

        let tables = registry.take_tables();
        let (kind, table) = &tables[&5];
        assert_eq!(*kind, ModuleKind::Gretina4M);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_duplicate_data_id() {
        let config = config_with(
            vec![
                DecoderEntry {
                    data_id: 5,
                    module: ModuleKind::Gretina4M,
                },
                DecoderEntry {
                    data_id: 5,
                    module: ModuleKind::Sis3302,
                },
            ],
            None,
        );
        assert!(matches!(
            DecoderRegistry::from_config(&config, None),
            Err(ConfigError::DuplicateDataId(5))
        ));
    }
}
