use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot parse config {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Assembler tuning. Missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssemblerConfig {
    /// Surface attestations attached to any member of the queried entity's
    /// equivalence class.
    pub widen_equivalence: bool,
    /// Upper bound on nodes visited by one equivalence traversal.
    pub max_equivalence_nodes: usize,
}

impl Default for AssemblerConfig {
    fn default() -> Self {
        Self {
            widen_equivalence: true,
            max_equivalence_nodes: 10_000,
        }
    }
}

impl AssemblerConfig {
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_keeps_defaults() {
        let cfg: AssemblerConfig = serde_json::from_str(r#"{"max_equivalence_nodes": 3}"#).unwrap();
        assert!(cfg.widen_equivalence);
        assert_eq!(cfg.max_equivalence_nodes, 3);
    }

    #[test]
    fn config_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("assembler.json");
        std::fs::write(&path, r#"{"widen_equivalence": false}"#).unwrap();
        let cfg = AssemblerConfig::from_json_file(&path).unwrap();
        assert!(!cfg.widen_equivalence);
        assert!(matches!(
            AssemblerConfig::from_json_file(&dir.path().join("missing.json")),
            Err(ConfigError::Io { .. })
        ));
    }
}
