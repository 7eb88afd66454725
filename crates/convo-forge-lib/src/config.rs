//! Pipeline configuration.
//!
//! Every field has a default, so a config file only needs the values it
//! changes. The CLI layers its flags over whatever the file provides.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::aggregate::AggregateConfig;
use crate::codec::CodecKind;
use crate::merge::MergeConfig;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForgeConfig {
    pub merge: MergeConfig,
    pub aggregate: AggregateConfig,
    /// Apply mojibake repair to every export document before parsing.
    pub repair_encoding: bool,
    /// Codec applied to message text and reactions at ingestion.
    pub ingest_codec: CodecKind,
    /// Codec applied to turn text when deriving pairs.
    pub pair_codec: CodecKind,
}

impl Default for ForgeConfig {
    fn default() -> Self {
        ForgeConfig {
            merge: MergeConfig::default(),
            aggregate: AggregateConfig::default(),
            repair_encoding: true,
            ingest_codec: CodecKind::Demojize,
            pair_codec: CodecKind::Emojize,
        }
    }
}

impl ForgeConfig {
    /// Load and validate a JSON config file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let cfg: ForgeConfig = serde_json::from_str(&raw)
            .with_context(|| format!("parsing config {}", path.display()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.merge.window_ms < 0 {
            anyhow::bail!("merge.window_ms must be >= 0, got {}", self.merge.window_ms);
        }
        if self.aggregate.workers == Some(0) {
            anyhow::bail!("aggregate.workers must be at least 1");
        }
        Ok(())
    }
}
