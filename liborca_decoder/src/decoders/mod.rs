pub mod common;
pub mod gretina4m;
pub mod iseg_hv;
pub mod mjd_preamp;
pub mod sis3302;

pub use common::{
    ChannelFilter, DecodeStatus, DecodedEvent, DecodedPollerSample, EventExtras,
    IntegrityWarning, ModuleKind, PollerReadings, PollerSource, SkipReason,
};
pub use gretina4m::Gretina4MDecoder;
pub use iseg_hv::IsegHvDecoder;
pub use mjd_preamp::MjdPreampDecoder;
pub use sis3302::Sis3302Decoder;

use crate::error::DecodeError;

/// Everything one decoder accumulated over a stream
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedTable {
    Events(Vec<DecodedEvent>),
    PollerSamples(Vec<DecodedPollerSample>),
}

impl DecodedTable {
    pub fn len(&self) -> usize {
        match self {
            Self::Events(events) => events.len(),
            Self::PollerSamples(samples) => samples.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One decoder for each supported module class.
///
/// The set of classes is closed, so dispatch is a match rather than a trait object.
#[derive(Debug, Clone)]
pub enum Decoder {
    Gretina4M(Gretina4MDecoder),
    Sis3302(Sis3302Decoder),
    MjdPreamp(MjdPreampDecoder),
    IsegHv(IsegHvDecoder),
}

impl Decoder {
    /// Create an empty decoder of the given class. Pollers ignore the filter.
    pub fn new(kind: ModuleKind, filter: ChannelFilter) -> Self {
        match kind {
            ModuleKind::Gretina4M => Self::Gretina4M(Gretina4MDecoder::new(filter)),
            ModuleKind::Sis3302 => Self::Sis3302(Sis3302Decoder::new(filter)),
            ModuleKind::MjdPreamp => Self::MjdPreamp(MjdPreampDecoder::new()),
            ModuleKind::IsegHv => Self::IsegHv(IsegHvDecoder::new()),
        }
    }

    pub fn kind(&self) -> ModuleKind {
        match self {
            Self::Gretina4M(_) => ModuleKind::Gretina4M,
            Self::Sis3302(_) => ModuleKind::Sis3302,
            Self::MjdPreamp(_) => ModuleKind::MjdPreamp,
            Self::IsegHv(_) => ModuleKind::IsegHv,
        }
    }

    pub fn decode(
        &mut self,
        payload: &[u8],
        event_number: u64,
    ) -> Result<DecodeStatus, DecodeError> {
        match self {
            Self::Gretina4M(d) => d.decode(payload, event_number),
            Self::Sis3302(d) => d.decode(payload, event_number),
            Self::MjdPreamp(d) => d.decode(payload, event_number),
            Self::IsegHv(d) => d.decode(payload, event_number),
        }
    }

    /// Number of rows currently held
    pub fn n_decoded(&self) -> usize {
        match self {
            Self::Gretina4M(d) => d.decoded_values().len(),
            Self::Sis3302(d) => d.decoded_values().len(),
            Self::MjdPreamp(d) => d.decoded_values().len(),
            Self::IsegHv(d) => d.decoded_values().len(),
        }
    }

    /// The digitizer events held, if this is a digitizer
    pub fn events(&self) -> Option<&[DecodedEvent]> {
        match self {
            Self::Gretina4M(d) => Some(d.decoded_values()),
            Self::Sis3302(d) => Some(d.decoded_values()),
            _ => None,
        }
    }

    /// The poller samples held, if this is a poller
    pub fn poller_samples(&self) -> Option<&[DecodedPollerSample]> {
        match self {
            Self::MjdPreamp(d) => Some(d.decoded_values()),
            Self::IsegHv(d) => Some(d.decoded_values()),
            _ => None,
        }
    }

    /// Move the accumulated rows out, leaving the decoder empty
    pub fn take_table(&mut self) -> DecodedTable {
        match self {
            Self::Gretina4M(d) => DecodedTable::Events(d.take_decoded()),
            Self::Sis3302(d) => DecodedTable::Events(d.take_decoded()),
            Self::MjdPreamp(d) => DecodedTable::PollerSamples(d.take_decoded()),
            Self::IsegHv(d) => DecodedTable::PollerSamples(d.take_decoded()),
        }
    }
}
