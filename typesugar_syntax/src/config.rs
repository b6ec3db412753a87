//! The engine's configuration surface.
//!
//! Every option is serde-deserializable with the documented default, and
//! the whole configuration hashes into a stable digest that participates
//! in expansion cache keys.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Default scoping policy for typeclasses and extensions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResolutionMode {
    /// Every registered typeclass/extension is in scope.
    Automatic,
    /// Only names visible in the file's import map, plus the prelude.
    ImportScoped,
    /// Nothing implicit.
    Explicit,
}

impl Default for ResolutionMode {
    fn default() -> ResolutionMode {
        ResolutionMode::Automatic
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolutionOptions {
    pub mode: ResolutionMode,
    /// Typeclasses auto-in-scope under `automatic` or `import-scoped`.
    pub prelude: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExpansionLimits {
    /// Hard nesting limit.
    pub max_depth: u32,
    /// Global rewrite budget per file.
    pub max_iterations: u64,
    /// Consecutive re-expansion cap on one site.
    pub per_site_limit: u32,
}

impl Default for ExpansionLimits {
    fn default() -> ExpansionLimits {
        ExpansionLimits {
            max_depth: 100,
            max_iterations: 100_000,
            per_site_limit: 16,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComptimeOptions {
    /// Sandbox wall-clock ceiling in milliseconds.
    pub timeout_ms: u64,
    /// Pure-evaluator operation cap.
    pub node_budget: u64,
}

impl Default for ComptimeOptions {
    fn default() -> ComptimeOptions {
        ComptimeOptions {
            timeout_ms: 5_000,
            node_budget: 100_000,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheOptions {
    /// LRU capacity of the expansion cache.
    pub max_entries: usize,
}

impl Default for CacheOptions {
    fn default() -> CacheOptions {
        CacheOptions { max_entries: 256 }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HygieneOptions {
    /// Identifier prefix for mangled names; pick one that user code never
    /// spells.
    pub prefix: String,
}

impl Default for HygieneOptions {
    fn default() -> HygieneOptions {
        HygieneOptions {
            prefix: "sugar".to_string(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExpansionConfig {
    pub resolution: ResolutionOptions,
    pub expansion: ExpansionLimits,
    pub comptime: ComptimeOptions,
    pub cache: CacheOptions,
    pub hygiene: HygieneOptions,
}

impl ExpansionConfig {
    /// A stable digest of the configuration, hex-encoded. Feeds the
    /// expansion cache key: any config change invalidates cached output.
    pub fn config_hash(&self) -> String {
        let serialized =
            serde_json::to_vec(self).expect("configuration is always serializable");
        let digest = Sha256::digest(&serialized);
        hex::encode(&digest[..16])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_table() {
        let config = ExpansionConfig::default();
        assert_eq!(config.resolution.mode, ResolutionMode::Automatic);
        assert_eq!(config.expansion.max_depth, 100);
        assert_eq!(config.expansion.max_iterations, 100_000);
        assert_eq!(config.expansion.per_site_limit, 16);
        assert_eq!(config.comptime.timeout_ms, 5_000);
        assert_eq!(config.comptime.node_budget, 100_000);
        assert_eq!(config.cache.max_entries, 256);
        assert_eq!(config.hygiene.prefix, "sugar");
    }

    #[test]
    fn config_hash_tracks_content() {
        let a = ExpansionConfig::default();
        let mut b = ExpansionConfig::default();
        assert_eq!(a.config_hash(), b.config_hash());
        b.expansion.max_depth = 7;
        assert_ne!(a.config_hash(), b.config_hash());
    }

    #[test]
    fn deserializes_kebab_case_mode() {
        let config: ExpansionConfig = serde_json::from_str(
            r#"{ "resolution": { "mode": "import-scoped", "prelude": ["Show"] } }"#,
        )
        .unwrap();
        assert_eq!(config.resolution.mode, ResolutionMode::ImportScoped);
        assert_eq!(config.resolution.prelude, vec!["Show".to_string()]);
    }
}
