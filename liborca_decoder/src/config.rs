use fxhash::FxHashSet;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::constants::MAX_RECORD_WORDS;
use super::decoders::ModuleKind;
use super::error::ConfigError;
use super::reconstruction::ReconstructionParams;

/// Which module class owns the records with a given data id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecoderEntry {
    pub data_id: u16,
    pub module: ModuleKind,
}

/// Structure representing the application configuration. Contains pathing and decoding information
/// Configs are seralizable and deserializable to YAML using serde and serde_yaml
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub input_files: Vec<PathBuf>,
    pub channel_table_path: Option<PathBuf>,
    pub decoders: Vec<DecoderEntry>,
    /// Packed channel addresses to keep. All channels are kept if missing.
    pub channel_filter: Option<Vec<u32>>,
    pub max_record_words: u32,
    pub n_threads: i32,
    pub reconstruction: ReconstructionParams,
}

impl Default for Config {
    /// Generate a template Config. Data ids are assigned per run, so the decoder map must
    /// be checked against the run header
    fn default() -> Self {
        Self {
            input_files: Vec::new(),
            channel_table_path: None,
            decoders: vec![
                DecoderEntry {
                    data_id: 3,
                    module: ModuleKind::Gretina4M,
                },
                DecoderEntry {
                    data_id: 4,
                    module: ModuleKind::Sis3302,
                },
                DecoderEntry {
                    data_id: 5,
                    module: ModuleKind::MjdPreamp,
                },
                DecoderEntry {
                    data_id: 6,
                    module: ModuleKind::IsegHv,
                },
            ],
            channel_filter: None,
            max_record_words: MAX_RECORD_WORDS,
            n_threads: 1,
            reconstruction: ReconstructionParams::default(),
        }
    }
}

impl Config {
    /// Read the configuration in a YAML file
    /// Returns a Config if successful
    pub fn read_config_file(config_path: &Path) -> Result<Self, ConfigError> {
        if !config_path.exists() {
            return Err(ConfigError::BadFilePath(config_path.to_path_buf()));
        }

        let yaml_str = std::fs::read_to_string(config_path)?;

        let config = serde_yaml::from_str::<Self>(&yaml_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Write the configuration to a YAML file
    pub fn write_config_file(&self, config_path: &Path) -> Result<(), ConfigError> {
        let yaml_str = serde_yaml::to_string(self)?;
        std::fs::write(config_path, yaml_str)?;
        Ok(())
    }

    /// Check for data ids claimed by more than one decoder
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = FxHashSet::default();
        for entry in self.decoders.iter() {
            if !seen.insert(entry.data_id) {
                return Err(ConfigError::DuplicateDataId(entry.data_id));
            }
        }
        Ok(())
    }

    /// Input files which do not exist
    pub fn missing_input_files(&self) -> Vec<&Path> {
        self.input_files
            .iter()
            .filter(|path| !path.exists())
            .map(|path| path.as_path())
            .collect()
    }

    pub fn is_n_threads_valid(&self) -> bool {
        self.n_threads >= 1
    }

    pub fn has_channel_table(&self) -> bool {
        self.channel_table_path.is_some()
    }
}
