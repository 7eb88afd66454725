use std::path::Path;

use anyhow::Result;
use convo_forge::ForgeConfig;

/// Flag values that override the config file.
#[derive(Debug, Clone, Default)]
pub(crate) struct Overrides {
    pub(crate) workers: Option<usize>,
    pub(crate) window_secs: Option<u64>,
    pub(crate) aliases: Vec<String>,
    pub(crate) sorted: bool,
    pub(crate) no_repair: bool,
}

/// Parse a `FROM=TO` sender alias.
pub(crate) fn parse_alias(raw: &str) -> Result<(String, String)> {
    let Some((from, to)) = raw.split_once('=') else {
        return Err(anyhow::anyhow!(
            "invalid --alias '{}'; expected FROM=TO",
            raw
        ));
    };
    let (from, to) = (from.trim(), to.trim());
    if from.is_empty() || to.is_empty() {
        return Err(anyhow::anyhow!(
            "invalid --alias '{}'; both names must be non-empty",
            raw
        ));
    }
    Ok((from.to_string(), to.to_string()))
}

/// Load `config` (or defaults) and layer the flag overrides on top.
pub(crate) fn resolve(config: Option<&Path>, overrides: &Overrides) -> Result<ForgeConfig> {
    let mut cfg = match config {
        Some(path) => ForgeConfig::load(path)?,
        None => ForgeConfig::default(),
    };

    if let Some(workers) = overrides.workers {
        cfg.aggregate.workers = Some(workers);
    }
    if let Some(secs) = overrides.window_secs {
        cfg.merge.window_ms = i64::try_from(secs.saturating_mul(1000)).unwrap_or(i64::MAX);
    }
    for raw in &overrides.aliases {
        let (from, to) = parse_alias(raw)?;
        cfg.merge.sender_aliases.insert(from, to);
    }
    if overrides.sorted {
        cfg.aggregate.sorted_output = true;
    }
    if overrides.no_repair {
        cfg.repair_encoding = false;
    }

    cfg.validate()?;
    Ok(cfg)
}
