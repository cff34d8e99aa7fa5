//! Registry configuration stored as TOML (conventionally `model.toml`).

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::types::ElementCreation;

/// Registry configuration (TOML).
///
/// Missing fields default to the values a plain configuration run uses.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RegistryConfig {
    /// Deepest nesting of realizations before the run is aborted.
    pub max_depth: usize,

    /// Whether container elements are created when declared or on first use.
    pub element_creation: ElementCreation,

    /// Read views require `graph-closed` when set, `finalized` otherwise.
    pub close_on_read: bool,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            max_depth: 256,
            element_creation: ElementCreation::Lazy,
            close_on_read: true,
        }
    }
}

impl RegistryConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_depth == 0 {
            return Err(anyhow!("max_depth must be > 0"));
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `RegistryConfig::default()`.
pub fn load_config(path: &Path) -> Result<RegistryConfig> {
    if !path.exists() {
        let cfg = RegistryConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: RegistryConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("validate {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &RegistryConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, buf)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, RegistryConfig::default());
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("model.toml");
        fs::write(&path, "element_creation = \"eager\"\n").expect("write");
        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.element_creation, ElementCreation::Eager);
        assert_eq!(cfg.max_depth, 256);
        assert!(cfg.close_on_read);
    }

    #[test]
    fn zero_depth_is_rejected() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("model.toml");
        fs::write(&path, "max_depth = 0\n").expect("write");
        let err = load_config(&path).expect_err("invalid");
        assert!(format!("{err:#}").contains("max_depth must be > 0"));
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("nested").join("model.toml");
        let cfg = RegistryConfig {
            max_depth: 32,
            element_creation: ElementCreation::Eager,
            close_on_read: false,
        };
        write_config(&path, &cfg).expect("write");
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded, cfg);
        assert!(!path.with_extension("toml.tmp").exists());
    }
}
