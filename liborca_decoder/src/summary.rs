use fxhash::FxHashMap;

use super::decoders::{DecodeStatus, ModuleKind, SkipReason};

/// Record outcomes for a single module class
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ModuleCounts {
    pub decoded: u64,
    pub skipped: u64,
    pub warned: u64,
    pub failed: u64,
}

impl ModuleCounts {
    pub fn total(&self) -> u64 {
        self.decoded + self.skipped + self.failed
    }
}

/// Tally of what happened to every record in a stream
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodeSummary {
    modules: FxHashMap<ModuleKind, ModuleCounts>,
    pub unknown_records: u64,
    pub run_headers: u64,
}

impl DecodeSummary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count the outcome of a dispatch. Unknown discriminants have no module.
    pub fn record_status(&mut self, kind: Option<ModuleKind>, status: &DecodeStatus) {
        match (kind, status) {
            (_, DecodeStatus::Skipped(SkipReason::UnknownDiscriminant(_))) | (None, _) => {
                self.unknown_records += 1
            }
            (Some(kind), DecodeStatus::Stored) => self.counts_mut(kind).decoded += 1,
            (Some(kind), DecodeStatus::StoredWithWarning(_)) => {
                let counts = self.counts_mut(kind);
                counts.decoded += 1;
                counts.warned += 1;
            }
            (Some(kind), DecodeStatus::Skipped(SkipReason::ChannelNotActive(_))) => {
                self.counts_mut(kind).skipped += 1
            }
            (Some(kind), DecodeStatus::SkippedWithWarning(_, _)) => {
                let counts = self.counts_mut(kind);
                counts.skipped += 1;
                counts.warned += 1;
            }
        }
    }

    pub fn record_failure(&mut self, kind: ModuleKind) {
        self.counts_mut(kind).failed += 1;
    }

    pub fn record_run_header(&mut self) {
        self.run_headers += 1;
    }

    pub fn counts(&self, kind: ModuleKind) -> ModuleCounts {
        self.modules.get(&kind).copied().unwrap_or_default()
    }

    /// Fold another summary into this one (used to combine files)
    pub fn merge(&mut self, other: &DecodeSummary) {
        for (kind, counts) in other.modules.iter() {
            let mine = self.counts_mut(*kind);
            mine.decoded += counts.decoded;
            mine.skipped += counts.skipped;
            mine.warned += counts.warned;
            mine.failed += counts.failed;
        }
        self.unknown_records += other.unknown_records;
        self.run_headers += other.run_headers;
    }

    /// Counts of every module seen, in a stable order
    pub fn module_counts(&self) -> Vec<(ModuleKind, ModuleCounts)> {
        let mut counts: Vec<(ModuleKind, ModuleCounts)> =
            self.modules.iter().map(|(k, c)| (*k, *c)).collect();
        counts.sort_by_key(|(kind, _)| *kind);
        counts
    }

    pub fn log_summary(&self) {
        for (kind, counts) in self.module_counts() {
            spdlog::info!(
                "{kind}: {} decoded, {} skipped, {} warned, {} failed",
                counts.decoded,
                counts.skipped,
                counts.warned,
                counts.failed
            );
        }
        spdlog::info!(
            "Run headers: {}, records with unknown data id: {}",
            self.run_headers,
            self.unknown_records
        );
    }

    fn counts_mut(&mut self, kind: ModuleKind) -> &mut ModuleCounts {
        self.modules.entry(kind).or_default()
    }
}
