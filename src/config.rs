//! Configuration for the tagger text encoder.
//!
//! Field names and defaults follow the tagger configuration the encoder was
//! designed against. Any field missing from a JSON file falls back to its
//! default.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use candle_core::Device;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Hyperparameters of [`TextEncoder`](crate::model::encoder::text::TextEncoder).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaggerConfig {
    // --- Word level ---
    /// Width of word embeddings and of the character network output.
    pub tagger_embeddings_size: usize,
    /// Hidden size of each LSTM direction in the sentence encoder.
    pub tagger_encoder_size: usize,
    pub tagger_encoder_layers: usize,
    /// Dropout used by the sentence encoder, character projection and
    /// character network.
    pub tagger_encoder_dropout: f64,
    /// Probability used by the structured word/character input dropout.
    pub tagger_input_dropout_prob: f64,
    /// Output width of the final projection.
    pub tagger_mlp_layer: usize,
    pub tagger_mlp_dropout: f64,

    // --- Character level ---
    pub char_input_embeddings_size: usize,
    pub char_encoder_size: usize,
    pub char_encoder_layers: usize,
    /// Width of the 4-way case embedding.
    pub case_embeddings_size: usize,
}

impl Default for TaggerConfig {
    fn default() -> Self {
        Self {
            tagger_embeddings_size: 100,
            tagger_encoder_size: 200,
            tagger_encoder_layers: 2,
            tagger_encoder_dropout: 0.5,
            tagger_input_dropout_prob: 0.33,
            tagger_mlp_layer: 500,
            tagger_mlp_dropout: 0.5,
            char_input_embeddings_size: 100,
            char_encoder_size: 200,
            char_encoder_layers: 2,
            case_embeddings_size: 16,
        }
    }
}

impl TaggerConfig {
    /// Parse a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let cfg: Self = serde_json::from_str(json)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load and validate a JSON config file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Check every size is non-zero and every probability is in range.
    pub fn validate(&self) -> Result<()> {
        let sizes = [
            ("tagger_embeddings_size", self.tagger_embeddings_size),
            ("tagger_encoder_size", self.tagger_encoder_size),
            ("tagger_encoder_layers", self.tagger_encoder_layers),
            ("tagger_mlp_layer", self.tagger_mlp_layer),
            ("char_input_embeddings_size", self.char_input_embeddings_size),
            ("char_encoder_size", self.char_encoder_size),
            ("char_encoder_layers", self.char_encoder_layers),
            ("case_embeddings_size", self.case_embeddings_size),
        ];
        for (name, value) in sizes {
            if value == 0 {
                return Err(Error::Config(format!("{name} must be > 0")));
            }
        }

        let dropouts = [
            ("tagger_encoder_dropout", self.tagger_encoder_dropout),
            ("tagger_mlp_dropout", self.tagger_mlp_dropout),
        ];
        for (name, p) in dropouts {
            if !(0.0..1.0).contains(&p) {
                return Err(Error::Config(format!("{name} must be in [0, 1), got {p}")));
            }
        }

        let p = self.tagger_input_dropout_prob;
        if !(0.0..=1.0).contains(&p) {
            return Err(Error::Config(format!(
                "tagger_input_dropout_prob must be in [0, 1], got {p}"
            )));
        }
        Ok(())
    }

    /// Output width of the bidirectional sentence encoder.
    pub fn encoder_output_size(&self) -> usize {
        self.tagger_encoder_size * 2
    }
}

/// Compute device identifier, e.g. `cpu`, `cuda:1` or `metal`.
///
/// Resolved once when the encoder is built; tensors never move afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceSpec {
    #[default]
    Cpu,
    Cuda(usize),
    Metal(usize),
}

impl DeviceSpec {
    /// Create the candle device.
    ///
    /// Fails when the crate was built without the matching backend feature.
    pub fn resolve(self) -> Result<Device> {
        match self {
            Self::Cpu => Ok(Device::Cpu),
            Self::Cuda(ordinal) => {
                Device::new_cuda(ordinal).map_err(|e| Error::Device(format!("{self}: {e}")))
            }
            Self::Metal(ordinal) => {
                Device::new_metal(ordinal).map_err(|e| Error::Device(format!("{self}: {e}")))
            }
        }
    }
}

impl fmt::Display for DeviceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cpu => write!(f, "cpu"),
            Self::Cuda(n) => write!(f, "cuda:{n}"),
            Self::Metal(n) => write!(f, "metal:{n}"),
        }
    }
}

impl FromStr for DeviceSpec {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim().to_ascii_lowercase();
        let (kind, ordinal) = match s.split_once(':') {
            Some((kind, n)) => {
                let n = n
                    .parse::<usize>()
                    .map_err(|_| Error::Device(format!("bad device ordinal in '{s}'")))?;
                (kind, n)
            }
            None => (s.as_str(), 0),
        };
        match kind {
            "cpu" => Ok(Self::Cpu),
            "cuda" | "gpu" => Ok(Self::Cuda(ordinal)),
            "metal" | "mps" => Ok(Self::Metal(ordinal)),
            _ => Err(Error::Device(format!("unknown device '{s}'"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let cfg = TaggerConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.case_embeddings_size, 16);
        assert_eq!(cfg.encoder_output_size(), 400);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let cfg = TaggerConfig::from_json_str(r#"{"tagger_mlp_layer": 64}"#).unwrap();
        assert_eq!(cfg.tagger_mlp_layer, 64);
        assert_eq!(cfg.tagger_encoder_size, 200);
    }

    #[test]
    fn test_validate_rejects_zero_size() {
        let cfg = TaggerConfig {
            char_encoder_layers: 0,
            ..TaggerConfig::default()
        };
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("char_encoder_layers"));
    }

    #[test]
    fn test_validate_rejects_bad_dropout() {
        let cfg = TaggerConfig {
            tagger_mlp_dropout: 1.0,
            ..TaggerConfig::default()
        };
        assert!(cfg.validate().is_err());

        let cfg = TaggerConfig {
            tagger_input_dropout_prob: 1.5,
            ..TaggerConfig::default()
        };
        assert!(cfg.validate().is_err());

        // Input dropout of exactly 1.0 zeroes both channels everywhere, still legal.
        let cfg = TaggerConfig {
            tagger_input_dropout_prob: 1.0,
            ..TaggerConfig::default()
        };
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_json_round_trip_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tagger.json");
        let cfg = TaggerConfig {
            tagger_embeddings_size: 32,
            ..TaggerConfig::default()
        };
        std::fs::write(&path, serde_json::to_string(&cfg).unwrap()).unwrap();
        assert_eq!(TaggerConfig::from_json_file(&path).unwrap(), cfg);
    }

    #[test]
    fn test_device_spec_parse() {
        assert_eq!("cpu".parse::<DeviceSpec>().unwrap(), DeviceSpec::Cpu);
        assert_eq!("CUDA".parse::<DeviceSpec>().unwrap(), DeviceSpec::Cuda(0));
        assert_eq!("cuda:2".parse::<DeviceSpec>().unwrap(), DeviceSpec::Cuda(2));
        assert_eq!("metal".parse::<DeviceSpec>().unwrap(), DeviceSpec::Metal(0));
        assert!("tpu".parse::<DeviceSpec>().is_err());
        assert!("cuda:x".parse::<DeviceSpec>().is_err());
        assert_eq!(DeviceSpec::Cuda(1).to_string(), "cuda:1");
    }

    #[test]
    fn test_cpu_resolves() {
        assert!(DeviceSpec::Cpu.resolve().unwrap().is_cpu());
    }
}
