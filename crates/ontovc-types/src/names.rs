//! Branch name validation and protected-name rules.
//!
//! Valid branch names:
//! - Match `^[a-z][a-z0-9\-/]*$` (lowercase slug, may be nested with `/`)
//! - Must not contain consecutive slashes (`//`)
//! - Must not end with `/`
//!
//! Internal namespaces (e.g. `_system`) deliberately fail validation, so
//! callers can never create or shadow them through the public API.

use std::sync::LazyLock;

use regex_lite::Regex;
use serde::{Deserialize, Serialize};

use crate::error::TypeError;

static BRANCH_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z][a-z0-9\-/]*$").expect("branch name pattern is valid")
});

/// Validate a branch name, returning `Ok(())` if valid.
///
/// # Examples
///
/// ```
/// use ontovc_types::names::validate_branch_name;
///
/// assert!(validate_branch_name("main").is_ok());
/// assert!(validate_branch_name("feature/user-auth").is_ok());
/// assert!(validate_branch_name("Feature").is_err());
/// assert!(validate_branch_name("a..b").is_err());
/// ```
pub fn validate_branch_name(name: &str) -> Result<(), TypeError> {
    let invalid = |reason: &str| TypeError::InvalidBranchName {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    if name.is_empty() {
        return Err(invalid("branch name must not be empty"));
    }
    if !BRANCH_NAME.is_match(name) {
        return Err(invalid(
            "must start with a lowercase letter and contain only [a-z0-9-/]",
        ));
    }
    if name.contains("//") {
        return Err(invalid("must not contain consecutive slashes '//'"));
    }
    if name.ends_with('/') {
        return Err(invalid("must not end with '/'"));
    }
    Ok(())
}

/// Patterns that are protected whatever else is configured.
pub const BUILTIN_PROTECTED: &[&str] = &["main", "master", "_*"];

/// Protected branch name patterns.
///
/// Patterns use glob syntax (`*` within a path segment, `**` across
/// segments). A protected branch can never be deleted and can only be a merge
/// target with an explicit override.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProtectionRules {
    patterns: Vec<String>,
}

impl ProtectionRules {
    /// Build rules from a list of glob patterns.
    pub fn new<I, S>(patterns: I) -> Result<Self, TypeError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let patterns: Vec<String> = patterns.into_iter().map(Into::into).collect();
        for pattern in &patterns {
            if pattern.trim().is_empty() {
                return Err(TypeError::InvalidPattern {
                    pattern: pattern.clone(),
                    reason: "pattern must not be empty".into(),
                });
            }
        }
        Ok(Self { patterns })
    }

    /// Returns `true` if `name` matches any protected pattern.
    pub fn is_protected(&self, name: &str) -> bool {
        self.patterns
            .iter()
            .any(|pattern| pattern == name || glob_match::glob_match(pattern, name))
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }
}

impl Default for ProtectionRules {
    fn default() -> Self {
        Self {
            patterns: BUILTIN_PROTECTED.iter().map(|p| p.to_string()).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_valid_slugs() {
        for name in ["main", "feature", "feature/user-auth", "a1"] {
            assert!(validate_branch_name(name).is_ok(), "{name} should be valid");
        }
    }

    #[test]
    fn rejects_invalid_names() {
        for name in ["", "Feature", "123x", "-x", "/x", "a..b", "a b", "a_b"] {
            assert!(
                validate_branch_name(name).is_err(),
                "{name:?} should be rejected"
            );
        }
    }

    #[test]
    fn rejects_empty_path_components() {
        assert!(validate_branch_name("feature//x").is_err());
        assert!(validate_branch_name("feature/").is_err());
    }

    #[test]
    fn rejects_internal_namespaces() {
        assert!(validate_branch_name("_system").is_err());
    }

    #[test]
    fn default_rules_protect_system_branches() {
        let rules = ProtectionRules::default();
        assert!(rules.is_protected("main"));
        assert!(rules.is_protected("master"));
        assert!(rules.is_protected("_system"));
        assert!(!rules.is_protected("feature/x"));
        assert!(!rules.is_protected("mainline"));
    }

    #[test]
    fn glob_patterns_match_nested_names() {
        let rules = ProtectionRules::new(["release/**"]).unwrap();
        assert!(rules.is_protected("release/2024/q1"));
        assert!(!rules.is_protected("feature/release"));
    }

    #[test]
    fn empty_pattern_is_rejected() {
        assert!(matches!(
            ProtectionRules::new([" "]),
            Err(TypeError::InvalidPattern { .. })
        ));
    }
}
