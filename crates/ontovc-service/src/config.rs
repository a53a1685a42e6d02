use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use ontovc_events::PublisherConfig;
use ontovc_merge::ConflictPolicy;
use ontovc_types::{validate_branch_name, ProtectionRules, BUILTIN_PROTECTED};

/// Errors loading or validating a [`ServiceConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to render config: {0}")]
    Render(#[from] toml::ser::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Lock manager settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    /// Default lock TTL. Locks without a TTL never expire.
    pub ttl_secs: Option<u64>,
    /// Directory for persistent lock records; in-memory when unset.
    pub dir: Option<PathBuf>,
    /// How long released records stay queryable. Kept forever when unset.
    pub released_retention_secs: Option<u64>,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            ttl_secs: None,
            dir: None,
            released_retention_secs: Some(7 * 24 * 60 * 60),
        }
    }
}

impl LockConfig {
    pub fn ttl(&self) -> Option<Duration> {
        self.ttl_secs.map(Duration::from_secs)
    }

    pub fn released_retention(&self) -> Option<Duration> {
        self.released_retention_secs.map(Duration::from_secs)
    }
}

/// Cache settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub ttl_secs: Option<u64>,
    /// Document types preloaded for the default branch on startup.
    pub warm_doc_types: Vec<String>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: Some(300),
            warm_doc_types: vec!["ObjectType".into(), "Property".into(), "LinkType".into()],
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Option<Duration> {
        self.ttl_secs.map(Duration::from_secs)
    }
}

/// Configuration for a [`crate::BranchService`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Backing store database holding the ontology.
    pub database: String,
    /// Branch new branches fork from when no parent is given.
    pub default_parent: String,
    /// Branch holding branch metadata and proposals.
    pub system_branch: String,
    /// Glob patterns of branch names that cannot be deleted or merged into
    /// without an explicit override.
    pub protected_patterns: Vec<String>,
    pub locks: LockConfig,
    pub events: PublisherConfig,
    pub cache: CacheConfig,
    /// Resolution policy used when a merge declares none.
    pub conflict_policy: ConflictPolicy,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            database: "ontology".into(),
            default_parent: "main".into(),
            system_branch: "_system".into(),
            protected_patterns: ProtectionRules::default().patterns().to_vec(),
            locks: LockConfig::default(),
            events: PublisherConfig::default(),
            cache: CacheConfig::default(),
            conflict_policy: ConflictPolicy::manual(),
        }
    }
}

impl ServiceConfig {
    /// Parse and validate a TOML document. Missing keys take their defaults.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: ServiceConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database.trim().is_empty() {
            return Err(ConfigError::Invalid("database must not be empty".into()));
        }
        validate_branch_name(&self.default_parent)
            .map_err(|e| ConfigError::Invalid(format!("default_parent: {e}")))?;
        if self.system_branch.trim().is_empty() {
            return Err(ConfigError::Invalid("system_branch must not be empty".into()));
        }
        if self.system_branch == self.default_parent {
            return Err(ConfigError::Invalid(
                "system_branch and default_parent must differ".into(),
            ));
        }
        if self.events.capacity == 0 {
            return Err(ConfigError::Invalid("events.capacity must be positive".into()));
        }
        if self.events.dead_letter_capacity == 0 {
            return Err(ConfigError::Invalid(
                "events.dead_letter_capacity must be positive".into(),
            ));
        }
        self.protection_rules()?;
        Ok(())
    }

    /// The configured patterns plus the ones that are always protected:
    /// [`BUILTIN_PROTECTED`], the system branch and the default parent.
    pub fn protection_rules(&self) -> Result<ProtectionRules, ConfigError> {
        let always = BUILTIN_PROTECTED
            .iter()
            .copied()
            .chain([self.system_branch.as_str(), self.default_parent.as_str()]);
        let mut patterns: Vec<String> = Vec::new();
        for pattern in always.chain(self.protected_patterns.iter().map(String::as_str)) {
            if !patterns.iter().any(|p| p == pattern) {
                patterns.push(pattern.to_string());
            }
        }
        ProtectionRules::new(patterns).map_err(|e| ConfigError::Invalid(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ontovc_merge::ResolutionStrategy;
    use ontovc_types::ResourceKind;

    #[test]
    fn default_config() {
        let c = ServiceConfig::default();
        assert_eq!(c.database, "ontology");
        assert_eq!(c.default_parent, "main");
        assert_eq!(c.system_branch, "_system");
        assert_eq!(c.conflict_policy, ConflictPolicy::manual());
        assert!(c.locks.ttl().is_none());
        assert_eq!(c.locks.released_retention(), Some(Duration::from_secs(604_800)));
        assert!(c.validate().is_ok());
        assert!(c.protection_rules().unwrap().is_protected("master"));
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let c = ServiceConfig::from_toml_str(
            r#"
            database = "catalog"
            protected_patterns = ["main", "release/**"]

            [locks]
            ttl_secs = 600

            [events]
            capacity = 16

            [events.retry]
            max_attempts = 2

            [conflict_policy]
            default = "prefer_target"

            [conflict_policy.overrides]
            Property = "field_union"
            "#,
        )
        .unwrap();

        assert_eq!(c.database, "catalog");
        assert_eq!(c.default_parent, "main");
        assert_eq!(c.locks.ttl(), Some(Duration::from_secs(600)));
        assert_eq!(c.events.capacity, 16);
        assert_eq!(c.events.retry.max_attempts, 2);
        assert_eq!(c.conflict_policy.default, ResolutionStrategy::PreferTarget);
        assert_eq!(
            c.conflict_policy.strategy_for(ResourceKind::Property),
            ResolutionStrategy::FieldUnion
        );
        assert!(c.protection_rules().unwrap().is_protected("release/1.0"));
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(matches!(
            ServiceConfig::from_toml_str("database = \"\""),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            ServiceConfig::from_toml_str("default_parent = \"Main\""),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            ServiceConfig::from_toml_str("protected_patterns = [\"\"]"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            ServiceConfig::from_toml_str("[events]\ndead_letter_capacity = 0"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            ServiceConfig::from_toml_str("database = 3"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn custom_patterns_keep_builtin_protection() {
        let config = ServiceConfig::from_toml_str(
            r#"
            default_parent = "trunk"
            protected_patterns = ["release/**"]
            "#,
        )
        .unwrap();
        let rules = config.protection_rules().unwrap();
        for name in ["main", "master", "_system", "_anything", "trunk", "release/1.0"] {
            assert!(rules.is_protected(name), "{name} should be protected");
        }
        assert!(!rules.is_protected("feature/x"));
        assert_eq!(rules.patterns().len(), 6);
    }

    #[test]
    fn load_and_render() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ontovc.toml");
        std::fs::write(&path, "system_branch = \"_meta\"\n").unwrap();

        let c = ServiceConfig::load(&path).unwrap();
        assert_eq!(c.system_branch, "_meta");

        let rendered = c.to_toml_string().unwrap();
        assert_eq!(ServiceConfig::from_toml_str(&rendered).unwrap(), c);

        assert!(matches!(
            ServiceConfig::load(dir.path().join("missing.toml")),
            Err(ConfigError::Io { .. })
        ));
    }
}
