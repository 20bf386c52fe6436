use serde::{Deserialize, Serialize};

use crate::errors::ValidationError;
use crate::name::Name;

/// Resolver-local validation policy.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ValidatorConfig {
    /// Retry signature verification with time checks disabled when the only
    /// failure is an expired or not-yet-valid RRSIG.
    #[serde(default)]
    pub accept_expired: bool,

    /// Subtrees that must validate as secure; a proven-insecure answer below
    /// one of these names is rejected instead of being accepted as insecure.
    #[serde(default)]
    pub must_be_secure: Vec<String>,

    /// NSEC3 records demanding more iterations than this are treated like
    /// records with an unknown hash algorithm (the zone goes insecure).
    #[serde(default = "default_max_nsec3_iterations")]
    pub max_nsec3_iterations: u16,

    /// Bound on stacked sub-validations; exceeding it fails the current
    /// lookup the same way the deadlock check does.
    #[serde(default = "default_max_validation_depth")]
    pub max_validation_depth: u8,
}

fn default_max_nsec3_iterations() -> u16 {
    150
}

fn default_max_validation_depth() -> u8 {
    16
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            accept_expired: false,
            must_be_secure: Vec::new(),
            max_nsec3_iterations: default_max_nsec3_iterations(),
            max_validation_depth: default_max_validation_depth(),
        }
    }
}

impl ValidatorConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, ValidationError> {
        toml::from_str(raw).map_err(|e| ValidationError::InvalidConfig(e.to_string()))
    }

    /// Whether `name` falls under a configured must-be-secure subtree.
    pub fn name_must_be_secure(&self, name: &Name) -> bool {
        self.must_be_secure.iter().any(|entry| {
            entry
                .parse::<Name>()
                .map(|root| name.is_subdomain_of(&root))
                .unwrap_or(false)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ValidatorConfig::default();
        assert!(!config.accept_expired);
        assert!(config.must_be_secure.is_empty());
        assert_eq!(config.max_nsec3_iterations, 150);
        assert_eq!(config.max_validation_depth, 16);
    }

    #[test]
    fn test_from_toml() {
        let config = ValidatorConfig::from_toml_str(
            r#"
            accept_expired = true
            must_be_secure = ["secure.example."]
            max_nsec3_iterations = 50
            "#,
        )
        .unwrap();
        assert!(config.accept_expired);
        assert_eq!(config.max_nsec3_iterations, 50);
        assert_eq!(config.max_validation_depth, 16);

        assert!(ValidatorConfig::from_toml_str("max_nsec3_iterations = \"many\"").is_err());
    }

    #[test]
    fn test_must_be_secure_subtree() {
        let config = ValidatorConfig {
            must_be_secure: vec!["secure.example.".into()],
            ..Default::default()
        };
        assert!(config.name_must_be_secure(&"a.secure.example.".parse().unwrap()));
        assert!(config.name_must_be_secure(&"secure.example.".parse().unwrap()));
        assert!(!config.name_must_be_secure(&"insecure.example.".parse().unwrap()));
    }
}
