use std::path::{Path, PathBuf};

use docfs_chunk::ChunkStoreConfig;
use serde::{Deserialize, Serialize};

use crate::error::{SdkError, SdkResult};

/// Top-level settings for a [`DocFs`](crate::DocFs) instance.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FsConfig {
    pub chunks: ChunkStoreConfig,
    /// Reclaim tombstoned objects and dangling file elements on open.
    pub sweep_on_open: bool,
    /// Where an in-memory store is loaded from and saved to.
    pub snapshot_path: Option<PathBuf>,
}

impl Default for FsConfig {
    fn default() -> Self {
        Self {
            chunks: ChunkStoreConfig::default(),
            sweep_on_open: true,
            snapshot_path: None,
        }
    }
}

impl FsConfig {
    pub fn from_toml_str(s: &str) -> SdkResult<Self> {
        let config: FsConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> SdkResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> SdkResult<()> {
        self.chunks
            .validate()
            .map_err(|e| SdkError::Config(e.to_string()))
    }

    pub fn with_snapshot_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.snapshot_path = Some(path.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let c = FsConfig::default();
        assert!(c.sweep_on_open);
        assert!(c.snapshot_path.is_none());
        assert_eq!(c.chunks, ChunkStoreConfig::default());
        assert!(c.validate().is_ok());
    }

    #[test]
    fn parse_partial_toml() {
        let c = FsConfig::from_toml_str(
            r#"
            sweep_on_open = false
            snapshot_path = "/var/lib/docfs/data.snap"

            [chunks]
            max_chunk_length = 4096
            "#,
        )
        .unwrap();
        assert!(!c.sweep_on_open);
        assert_eq!(c.snapshot_path, Some(PathBuf::from("/var/lib/docfs/data.snap")));
        assert_eq!(c.chunks.max_chunk_length, 4096);
        assert_eq!(c.chunks.buffer_length, ChunkStoreConfig::default().buffer_length);
    }

    #[test]
    fn empty_toml_is_default() {
        assert_eq!(FsConfig::from_toml_str("").unwrap(), FsConfig::default());
    }

    #[test]
    fn zero_chunk_length_rejected() {
        let err = FsConfig::from_toml_str("[chunks]\nmax_chunk_length = 0").unwrap_err();
        assert!(matches!(err, SdkError::Config(_)));
    }

    #[test]
    fn malformed_toml_rejected() {
        let err = FsConfig::from_toml_str("sweep_on_open = \"yes\"").unwrap_err();
        assert!(matches!(err, SdkError::Toml(_)));
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("docfs.toml");
        std::fs::write(&path, "sweep_on_open = false\n").unwrap();
        assert!(!FsConfig::load(&path).unwrap().sweep_on_open);
        assert!(matches!(
            FsConfig::load(dir.path().join("missing.toml")),
            Err(SdkError::Io(_))
        ));
    }
}
