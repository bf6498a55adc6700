//! Configuration module
//!
//! Run settings and filter selection, loaded from a config file and
//! overridden by environment variables and then the command line.

mod env;
mod file;

pub use env::{print_env_help, EnvBuilder, EnvConfig, EnvGuard};
pub use file::CONFIG_LOCATIONS;

use serde::{Deserialize, Serialize};

/// Which tests a run selects
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Run only tests in one of these categories
    pub categories: Vec<String>,

    pub exclude_categories: Vec<String>,

    /// Run only tests carrying one of these tags
    pub tags: Vec<String>,

    pub exclude_tags: Vec<String>,

    /// Name wildcards (`*`, `?`) matched against the qualified name
    pub name_filters: Vec<String>,

    /// Regex matched against the qualified name
    pub name_regex: Option<String>,

    /// Also run tests marked explicit
    pub include_explicit: bool,
}

impl FilterConfig {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Run configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Cap on concurrently running tests; unlimited when absent
    pub max_parallel: Option<usize>,

    /// Cancel the run after the first failure
    pub fail_fast: bool,

    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,

    /// Output format (table, json, summary)
    pub format: String,

    pub filter: FilterConfig,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_parallel: None,
            fail_fast: false,
            log_level: "info".to_string(),
            format: "table".to_string(),
            filter: FilterConfig::default(),
        }
    }
}
