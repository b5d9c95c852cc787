// LayerConfig: serializable merge layer configuration
//
// Every merge layer carries the same small configuration:
//
//   name       unique layer name; generated per layer kind when absent
//              ("minimum", "minimum_1", "minimum_2", ...)
//   trainable  kept for graph bookkeeping; merge layers own no weights
//   dtype      compute dtype; inputs of another dtype are cast to it
//
// Configs round-trip through JSON so a layer can be stored with its graph
// and rebuilt with `Minimum::from_config`:
//
//   {"name":"minimum_3","trainable":true,"dtype":"float32"}

use std::collections::HashMap;
use std::sync::{Mutex, OnceLock};

use serde::{Deserialize, Serialize};
use tributary_core::dtype::DType;
use tributary_core::error::{Error, Result};

fn default_trainable() -> bool {
    true
}

/// Configuration shared by all merge layers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default = "default_trainable")]
    pub trainable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dtype: Option<DType>,
}

impl Default for LayerConfig {
    fn default() -> Self {
        LayerConfig {
            name: None,
            trainable: true,
            dtype: None,
        }
    }
}

impl LayerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_trainable(mut self, trainable: bool) -> Self {
        self.trainable = trainable;
        self
    }

    pub fn with_dtype(mut self, dtype: DType) -> Self {
        self.dtype = Some(dtype);
        self
    }

    /// Fill in a generated name for `prefix` if none was given.
    pub fn resolve_name(mut self, prefix: &str) -> Self {
        if self.name.is_none() {
            self.name = Some(unique_name(prefix));
        }
        self
    }

    /// Serialize to a JSON object.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| Error::msg(format!("layer config: cannot serialize: {e}")))
    }

    /// Parse a JSON object produced by `to_json` (missing fields take defaults).
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| Error::msg(format!("layer config: invalid JSON: {e}")))
    }
}

static NAME_COUNTERS: OnceLock<Mutex<HashMap<String, usize>>> = OnceLock::new();

/// Next unique layer name for `prefix`: the bare prefix first, then
/// `prefix_1`, `prefix_2`, ... Process-wide and thread-safe.
pub fn unique_name(prefix: &str) -> String {
    let counters = NAME_COUNTERS.get_or_init(|| Mutex::new(HashMap::new()));
    // a panic while holding the lock cannot leave the counters inconsistent
    let mut counters = counters.lock().unwrap_or_else(|e| e.into_inner());
    let count = counters.entry(prefix.to_string()).or_insert(0);
    let name = if *count == 0 {
        prefix.to_string()
    } else {
        format!("{prefix}_{count}")
    };
    *count += 1;
    name
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = LayerConfig::new();
        assert_eq!(cfg.name, None);
        assert!(cfg.trainable);
        assert_eq!(cfg.dtype, None);
    }

    #[test]
    fn test_builder() {
        let cfg = LayerConfig::new()
            .with_name("min_branch")
            .with_trainable(false)
            .with_dtype(DType::F16);
        assert_eq!(cfg.name.as_deref(), Some("min_branch"));
        assert!(!cfg.trainable);
        assert_eq!(cfg.dtype, Some(DType::F16));
    }

    #[test]
    fn test_json_roundtrip() {
        let cfg = LayerConfig::new().with_name("m").with_dtype(DType::BF16);
        let json = cfg.to_json().unwrap();
        assert_eq!(json, r#"{"name":"m","trainable":true,"dtype":"bf16"}"#);
        assert_eq!(LayerConfig::from_json(&json).unwrap(), cfg);
    }

    #[test]
    fn test_json_defaults_and_long_dtype_names() {
        let cfg = LayerConfig::from_json(r#"{"dtype":"float32"}"#).unwrap();
        assert_eq!(cfg.dtype, Some(DType::F32));
        assert!(cfg.trainable);
        assert_eq!(cfg.name, None);
        assert_eq!(cfg.to_json().unwrap(), r#"{"trainable":true,"dtype":"f32"}"#);
    }

    #[test]
    fn test_json_errors() {
        assert!(LayerConfig::from_json("not json").is_err());
        assert!(LayerConfig::from_json(r#"{"dtype":"complex64"}"#).is_err());
    }

    #[test]
    fn test_unique_names() {
        assert_eq!(unique_name("config_test_layer"), "config_test_layer");
        assert_eq!(unique_name("config_test_layer"), "config_test_layer_1");
        assert_eq!(unique_name("config_test_layer"), "config_test_layer_2");
        assert_eq!(unique_name("config_test_other"), "config_test_other");
    }

    #[test]
    fn test_resolve_keeps_explicit_name() {
        let cfg = LayerConfig::new().with_name("mine").resolve_name("config_test_resolve");
        assert_eq!(cfg.name.as_deref(), Some("mine"));
        let cfg = LayerConfig::new().resolve_name("config_test_resolve");
        assert_eq!(cfg.name.as_deref(), Some("config_test_resolve"));
    }
}
