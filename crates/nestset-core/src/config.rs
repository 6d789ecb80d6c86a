//! Tree configuration: which physical fields play which role, the root base
//! level, and whether the store holds a forest of independent trees.

use crate::DEFAULT_BASE_LEVEL;
use serde::Deserialize;
use std::collections::BTreeSet;
use thiserror::Error as ThisError;

///
/// ConfigError
///

#[derive(Debug, ThisError)]
pub enum ConfigError {
    #[error("config parse failed: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("field role '{role}' maps to an empty field name")]
    EmptyField { role: &'static str },

    #[error("field '{field}' is mapped to more than one role")]
    DuplicateField { field: String },
}

///
/// FieldMap
///
/// Logical role → physical field name. Resolved once from configuration;
/// the engine only reads and writes rows through these names.
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct FieldMap {
    pub parent: String,
    pub left: String,
    pub right: String,
    pub level: Option<String>,
    pub root: Option<String>,
}

impl Default for FieldMap {
    fn default() -> Self {
        Self {
            parent: "parent".to_string(),
            left: "lft".to_string(),
            right: "rgt".to_string(),
            level: None,
            root: None,
        }
    }
}

impl FieldMap {
    /// Default mapping plus a tracked `lvl` field.
    #[must_use]
    pub fn leveled() -> Self {
        Self {
            level: Some("lvl".to_string()),
            ..Self::default()
        }
    }

    /// Leveled mapping with the `root` forest discriminator enabled.
    #[must_use]
    pub fn forest() -> Self {
        Self {
            root: Some("root".to_string()),
            ..Self::leveled()
        }
    }

    /// All configured physical role fields.
    pub fn role_names(&self) -> impl Iterator<Item = &str> {
        [
            Some(self.parent.as_str()),
            Some(self.left.as_str()),
            Some(self.right.as_str()),
            self.level.as_deref(),
            self.root.as_deref(),
        ]
        .into_iter()
        .flatten()
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let roles = [
            ("parent", Some(&self.parent)),
            ("left", Some(&self.left)),
            ("right", Some(&self.right)),
            ("level", self.level.as_ref()),
            ("root", self.root.as_ref()),
        ];

        let mut seen = BTreeSet::new();
        for (role, field) in roles {
            let Some(field) = field else { continue };
            if field.trim().is_empty() {
                return Err(ConfigError::EmptyField { role });
            }
            if !seen.insert(field.as_str()) {
                return Err(ConfigError::DuplicateField {
                    field: field.clone(),
                });
            }
        }

        Ok(())
    }
}

///
/// TreeConfig
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct TreeConfig {
    pub fields: FieldMap,
    pub base_level: i64,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            fields: FieldMap::default(),
            base_level: DEFAULT_BASE_LEVEL,
        }
    }
}

impl TreeConfig {
    #[must_use]
    pub const fn new(fields: FieldMap, base_level: i64) -> Self {
        Self { fields, base_level }
    }

    /// Single-tree config with default field names and tracked levels.
    #[must_use]
    pub fn single() -> Self {
        Self {
            fields: FieldMap::leveled(),
            ..Self::default()
        }
    }

    /// Forest config with default field names and tracked levels.
    #[must_use]
    pub fn forest() -> Self {
        Self {
            fields: FieldMap::forest(),
            ..Self::default()
        }
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.fields.validate()
    }

    /// Forest mode is active iff the root role is mapped.
    #[must_use]
    pub const fn is_forest(&self) -> bool {
        self.fields.root.is_some()
    }

    #[must_use]
    pub const fn tracks_level(&self) -> bool {
        self.fields.level.is_some()
    }

    /// Level a root node should carry, or `None` when levels are untracked.
    #[must_use]
    pub const fn root_level(&self) -> Option<i64> {
        if self.tracks_level() {
            Some(self.base_level)
        } else {
            None
        }
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config = TreeConfig::from_toml_str("").expect("empty config should parse");

        assert_eq!(config, TreeConfig::default());
        assert!(!config.is_forest());
        assert!(!config.tracks_level());
        assert_eq!(config.root_level(), None);
    }

    #[test]
    fn forest_document_maps_every_role() {
        let config = TreeConfig::from_toml_str(
            r#"
            base_level = 1

            [fields]
            parent = "parent_id"
            left = "l"
            right = "r"
            level = "depth"
            root = "tree"
            "#,
        )
        .expect("forest config should parse");

        assert!(config.is_forest());
        assert_eq!(config.root_level(), Some(1));
        assert_eq!(
            config.fields.role_names().collect::<Vec<_>>(),
            vec!["parent_id", "l", "r", "depth", "tree"]
        );
    }

    #[test]
    fn duplicate_role_fields_are_rejected() {
        let err = TreeConfig::from_toml_str(
            r#"
            [fields]
            left = "bound"
            right = "bound"
            "#,
        )
        .expect_err("duplicate field names should fail validation");

        assert!(matches!(err, ConfigError::DuplicateField { field } if field == "bound"));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = TreeConfig::from_toml_str("levels = true")
            .expect_err("unknown keys should fail to parse");

        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
