//! Store configuration module.
//!
//! This module provides configuration loading for the record store from
//! environment variables.
//!
//! # Environment Variables
//!
//! - `STORE_DATA_DIRECTORY`: Directory holding the store files (default: `./data`)
//! - `STORE_PAGE_DEGREE`: Degree of the paged B-tree (default: `32`)
//! - `STORE_MIN_DEGREE`: Minimum degree of the in-memory B-tree (default: `16`)
//!
//! # Invariants
//!
//! - `data_directory` is never empty (it may not exist yet)
//! - `page_degree` is within `MIN_PAGE_DEGREE..=MAX_PAGE_DEGREE`
//! - `min_degree` is at least `MIN_DEGREE`

use std::path::PathBuf;

use crate::storage::btree::MIN_DEGREE;
use crate::storage::paged::{MAX_PAGE_DEGREE, MIN_PAGE_DEGREE};

/// Record store configuration.
///
/// When constructed via `from_env()` every value has been validated, so the
/// degrees can be handed to the tree constructors as is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Directory holding `records.db`, `records.idx` and `records.tree`.
    pub data_directory: PathBuf,
    /// Paged B-tree degree. A page holds `page_degree - 1` entries.
    pub page_degree: i32,
    /// In-memory B-tree minimum degree `t`.
    pub min_degree: usize,
}

/// Error returned when loading configuration fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// An environment variable has an invalid value.
    InvalidValue { name: String, message: String },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidValue { name, message } => {
                write!(f, "invalid value for {name}: {message}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

const DATA_DIRECTORY_VAR: &str = "STORE_DATA_DIRECTORY";
const PAGE_DEGREE_VAR: &str = "STORE_PAGE_DEGREE";
const MIN_DEGREE_VAR: &str = "STORE_MIN_DEGREE";

impl StoreConfig {
    /// Default data directory.
    pub const DEFAULT_DATA_DIRECTORY: &'static str = "./data";
    /// Default paged B-tree degree (676-byte pages).
    pub const DEFAULT_PAGE_DEGREE: i32 = 32;
    /// Default in-memory B-tree minimum degree.
    pub const DEFAULT_MIN_DEGREE: usize = 16;

    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `STORE_DATA_DIRECTORY` is set but empty
    /// - `STORE_PAGE_DEGREE` or `STORE_MIN_DEGREE` is set but not a number in range
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through `lookup`, which returns the value of a
    /// variable or `None` if it is unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        Ok(Self {
            data_directory: Self::load_data_directory(&lookup)?,
            page_degree: Self::load_page_degree(&lookup)?,
            min_degree: Self::load_min_degree(&lookup)?,
        })
    }

    fn load_data_directory(
        lookup: &impl Fn(&str) -> Option<String>,
    ) -> Result<PathBuf, ConfigError> {
        match lookup(DATA_DIRECTORY_VAR) {
            Some(value) if value.is_empty() => Err(ConfigError::InvalidValue {
                name: DATA_DIRECTORY_VAR.to_string(),
                message: "must not be empty".to_string(),
            }),
            Some(value) => Ok(PathBuf::from(value)),
            None => Ok(PathBuf::from(Self::DEFAULT_DATA_DIRECTORY)),
        }
    }

    fn load_page_degree(lookup: &impl Fn(&str) -> Option<String>) -> Result<i32, ConfigError> {
        let Some(value) = lookup(PAGE_DEGREE_VAR) else {
            return Ok(Self::DEFAULT_PAGE_DEGREE);
        };
        value
            .parse::<i32>()
            .ok()
            .filter(|d| (MIN_PAGE_DEGREE..=MAX_PAGE_DEGREE).contains(d))
            .ok_or_else(|| ConfigError::InvalidValue {
                name: PAGE_DEGREE_VAR.to_string(),
                message: format!(
                    "'{value}' is not a degree in {MIN_PAGE_DEGREE}..={MAX_PAGE_DEGREE}"
                ),
            })
    }

    fn load_min_degree(lookup: &impl Fn(&str) -> Option<String>) -> Result<usize, ConfigError> {
        let Some(value) = lookup(MIN_DEGREE_VAR) else {
            return Ok(Self::DEFAULT_MIN_DEGREE);
        };
        value
            .parse::<usize>()
            .ok()
            .filter(|t| *t >= MIN_DEGREE)
            .ok_or_else(|| ConfigError::InvalidValue {
                name: MIN_DEGREE_VAR.to_string(),
                message: format!("'{value}' is not a minimum degree of at least {MIN_DEGREE}"),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: Vec<(String, String)> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name: &str| {
            vars.iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.clone())
        }
    }

    #[test]
    fn test_default_values() {
        let config = StoreConfig::from_lookup(|_| None).expect("defaults");
        assert_eq!(config.data_directory, PathBuf::from("./data"));
        assert_eq!(config.page_degree, 32);
        assert_eq!(config.min_degree, 16);
    }

    #[test]
    fn test_overrides() {
        let config = StoreConfig::from_lookup(lookup_from(&[
            ("STORE_DATA_DIRECTORY", "/tmp/crashes"),
            ("STORE_PAGE_DEGREE", "8"),
            ("STORE_MIN_DEGREE", "2"),
        ]))
        .expect("config");
        assert_eq!(config.data_directory, PathBuf::from("/tmp/crashes"));
        assert_eq!(config.page_degree, 8);
        assert_eq!(config.min_degree, 2);
    }

    #[test]
    fn test_invalid_page_degree() {
        for bad in ["1", "-4", "abc", "70000"] {
            let err = StoreConfig::from_lookup(lookup_from(&[("STORE_PAGE_DEGREE", bad)]))
                .unwrap_err();
            assert!(
                matches!(&err, ConfigError::InvalidValue { name, .. } if name == "STORE_PAGE_DEGREE"),
                "{bad} accepted"
            );
        }
    }

    #[test]
    fn test_invalid_min_degree() {
        let err = StoreConfig::from_lookup(lookup_from(&[("STORE_MIN_DEGREE", "1")])).unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid value for STORE_MIN_DEGREE: '1' is not a minimum degree of at least 2"
        );
    }

    #[test]
    fn test_empty_data_directory_rejected() {
        let err =
            StoreConfig::from_lookup(lookup_from(&[("STORE_DATA_DIRECTORY", "")])).unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidValue {
                name: "STORE_DATA_DIRECTORY".to_string(),
                message: "must not be empty".to_string(),
            }
        );
    }
}
