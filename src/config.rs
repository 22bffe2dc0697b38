//! Codec configuration.
//!
//! The VRT version and frame CRC policy travel as an explicit [`CodecConfig`]
//! value handed to packet, frame and archive constructors. Nothing is read from
//! process-global state after construction, so two configurations can be
//! exercised side by side.
//!
//! Configuration can be loaded from YAML:
//!
//! ```rust
//! use vrt_codec::{CodecConfig, VrtVersion};
//!
//! let config = CodecConfig::from_yaml_str("version: V49\nframe_crc: true\n").unwrap();
//! assert_eq!(config.version, VrtVersion::V49);
//! assert!(config.frame_crc);
//! ```

use crate::{Result, VrtError};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use tracing::debug;

/// Environment variable selecting the VRT version.
pub const VRT_VERSION_ENV: &str = "VRT_VERSION";

/// Environment variable enabling CRC computation on VRL frames.
pub const VRL_FRAME_CRC_ENV: &str = "VRL_FRAME_CRC";

/// VITA-49 rule set applied when writing packets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum VrtVersion {
    /// Strict VITA-49.0. Pad-bit counts cannot be written.
    V49,
    /// VITA-49.0b. Permits the pad-bit count in the class identifier.
    #[default]
    V49b,
}

impl VrtVersion {
    /// Whether an explicit pad-bit count may be written under this version.
    pub const fn supports_pad_bits(self) -> bool {
        matches!(self, VrtVersion::V49b)
    }

    pub const fn name(self) -> &'static str {
        match self {
            VrtVersion::V49 => "V49",
            VrtVersion::V49b => "V49b",
        }
    }
}

impl FromStr for VrtVersion {
    type Err = VrtError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "V49" | "V49.0" => Ok(VrtVersion::V49),
            "V49B" | "V49.0B" => Ok(VrtVersion::V49b),
            other => Err(VrtError::config(format!("unknown VRT version '{other}'"))),
        }
    }
}

impl std::fmt::Display for VrtVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Configuration threaded through every codec object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecConfig {
    /// Version rules applied to writes.
    pub version: VrtVersion,
    /// Compute a CRC-32 when packets are placed into a VRL frame.
    pub frame_crc: bool,
}

impl CodecConfig {
    pub const fn new(version: VrtVersion) -> Self {
        Self { version, frame_crc: false }
    }

    /// Enable or disable frame CRC computation.
    pub const fn with_frame_crc(mut self, enabled: bool) -> Self {
        self.frame_crc = enabled;
        self
    }

    /// Parse a configuration document. Missing keys keep their defaults.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml_ng::from_str(yaml).map_err(|e| {
            VrtError::config_with_source("failed to parse codec configuration", Box::new(e))
        })
    }

    /// Load a configuration document from disk.
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| VrtError::file_error(path.to_path_buf(), e))?;
        debug!("Loaded codec configuration from {}", path.display());
        Self::from_yaml_str(&text)
    }

    /// Defaults overlaid with `VRT_VERSION` and `VRL_FRAME_CRC`.
    pub fn from_env() -> Result<Self> {
        Self::default().overlay(|key| std::env::var(key).ok())
    }

    /// Overlay values found through `lookup` on top of `self`.
    pub fn overlay<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(version) = lookup(VRT_VERSION_ENV) {
            self.version = version.parse()?;
        }
        if let Some(crc) = lookup(VRL_FRAME_CRC_ENV) {
            self.frame_crc = parse_flag(VRL_FRAME_CRC_ENV, &crc)?;
        }
        Ok(self)
    }
}

fn parse_flag(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(VrtError::config(format!("{key}: expected a boolean, found '{other}'"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use std::collections::HashMap;

    #[test]
    fn defaults_are_permissive_without_crc() {
        let config = CodecConfig::default();
        assert_eq!(config.version, VrtVersion::V49b);
        assert!(!config.frame_crc);
        assert!(config.version.supports_pad_bits());
        assert!(!VrtVersion::V49.supports_pad_bits());
    }

    #[test]
    fn yaml_keeps_defaults_for_missing_keys() -> Result<()> {
        let config = CodecConfig::from_yaml_str("frame_crc: true")?;
        assert_eq!(config.version, VrtVersion::V49b);
        assert!(config.frame_crc);

        let empty = CodecConfig::from_yaml_str("   ")?;
        assert_eq!(empty, CodecConfig::default());
        Ok(())
    }

    #[test]
    fn yaml_rejects_unknown_versions() {
        let err = CodecConfig::from_yaml_str("version: V50").unwrap_err();
        assert!(matches!(err, VrtError::Config { .. }));
    }

    #[test]
    fn overlay_reads_both_keys() -> Result<()> {
        let vars: HashMap<&str, &str> =
            [(VRT_VERSION_ENV, "v49"), (VRL_FRAME_CRC_ENV, "1")].into_iter().collect();
        let config = CodecConfig::default().overlay(|k| vars.get(k).map(|v| v.to_string()))?;
        assert_eq!(config, CodecConfig::new(VrtVersion::V49).with_frame_crc(true));
        Ok(())
    }

    #[test]
    fn overlay_rejects_garbage_flags() {
        let result = CodecConfig::default()
            .overlay(|k| (k == VRL_FRAME_CRC_ENV).then(|| "maybe".to_string()));
        assert!(result.is_err());
    }

    #[test]
    fn yaml_file_round_trip() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("codec.yaml");
        let config = CodecConfig::new(VrtVersion::V49).with_frame_crc(true);
        std::fs::write(&path, serde_yaml_ng::to_string(&config)?)?;
        assert_eq!(CodecConfig::from_yaml_file(&path)?, config);
        Ok(())
    }

    #[test]
    fn version_names_parse_back() -> Result<()> {
        for version in [VrtVersion::V49, VrtVersion::V49b] {
            assert_eq!(version.to_string().parse::<VrtVersion>()?, version);
        }
        Ok(())
    }
}
