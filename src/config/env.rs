//! Environment variable configuration
//!
//! Provides environment variable overrides for configuration. List-valued
//! variables are comma separated.

use std::env;

use super::RunConfig;

/// Environment variable prefix
const ENV_PREFIX: &str = "NEXTUNIT";

/// Environment configuration from environment variables
#[derive(Clone, Debug, Default)]
pub struct EnvConfig {
    /// Categories from NEXTUNIT_CATEGORY
    pub categories: Option<Vec<String>>,
    /// Excluded categories from NEXTUNIT_EXCLUDE_CATEGORY
    pub exclude_categories: Option<Vec<String>>,
    /// Tags from NEXTUNIT_TAG
    pub tags: Option<Vec<String>>,
    /// Excluded tags from NEXTUNIT_EXCLUDE_TAG
    pub exclude_tags: Option<Vec<String>>,
    /// Name wildcards from NEXTUNIT_FILTER
    pub name_filters: Option<Vec<String>>,
    /// Name regex from NEXTUNIT_FILTER_REGEX
    pub name_regex: Option<String>,
    /// Explicit inclusion from NEXTUNIT_EXPLICIT
    pub include_explicit: Option<bool>,
    /// Parallelism cap from NEXTUNIT_MAX_PARALLEL
    pub max_parallel: Option<usize>,
    /// Fail-fast from NEXTUNIT_FAIL_FAST
    pub fail_fast: Option<bool>,
    /// Log level from NEXTUNIT_LOG_LEVEL
    pub log_level: Option<String>,
    /// Output format from NEXTUNIT_FORMAT
    pub format: Option<String>,
    /// Config file from NEXTUNIT_CONFIG
    pub config_file: Option<String>,
}

impl EnvConfig {
    /// Load configuration from environment variables
    pub fn load() -> Self {
        Self {
            categories: get_env_list("CATEGORY"),
            exclude_categories: get_env_list("EXCLUDE_CATEGORY"),
            tags: get_env_list("TAG"),
            exclude_tags: get_env_list("EXCLUDE_TAG"),
            name_filters: get_env_list("FILTER"),
            name_regex: get_env("FILTER_REGEX"),
            include_explicit: get_env_bool("EXPLICIT"),
            max_parallel: get_env_parse("MAX_PARALLEL"),
            fail_fast: get_env_bool("FAIL_FAST"),
            log_level: get_env("LOG_LEVEL"),
            format: get_env("FORMAT"),
            config_file: get_env("CONFIG"),
        }
    }

    /// Check if any environment variables are set
    pub fn has_any(&self) -> bool {
        self.categories.is_some()
            || self.exclude_categories.is_some()
            || self.tags.is_some()
            || self.exclude_tags.is_some()
            || self.name_filters.is_some()
            || self.name_regex.is_some()
            || self.include_explicit.is_some()
            || self.max_parallel.is_some()
            || self.fail_fast.is_some()
            || self.log_level.is_some()
            || self.format.is_some()
            || self.config_file.is_some()
    }

    /// Override every field of `config` that is set here
    pub fn apply_to(&self, config: &mut RunConfig) {
        let filter = &mut config.filter;
        if let Some(v) = &self.categories {
            filter.categories = v.clone();
        }
        if let Some(v) = &self.exclude_categories {
            filter.exclude_categories = v.clone();
        }
        if let Some(v) = &self.tags {
            filter.tags = v.clone();
        }
        if let Some(v) = &self.exclude_tags {
            filter.exclude_tags = v.clone();
        }
        if let Some(v) = &self.name_filters {
            filter.name_filters = v.clone();
        }
        if let Some(v) = &self.name_regex {
            filter.name_regex = Some(v.clone());
        }
        if let Some(v) = self.include_explicit {
            filter.include_explicit = v;
        }
        if let Some(v) = self.max_parallel {
            config.max_parallel = Some(v);
        }
        if let Some(v) = self.fail_fast {
            config.fail_fast = v;
        }
        if let Some(v) = &self.log_level {
            config.log_level = v.clone();
        }
        if let Some(v) = &self.format {
            config.format = v.clone();
        }
    }
}

/// Get environment variable with prefix
fn get_env(name: &str) -> Option<String> {
    env::var(format!("{ENV_PREFIX}_{name}")).ok()
}

/// Get environment variable and parse to type
fn get_env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    get_env(name).and_then(|v| v.parse().ok())
}

/// Get environment variable as boolean
fn get_env_bool(name: &str) -> Option<bool> {
    get_env(name).map(|v| {
        matches!(
            v.to_lowercase().as_str(),
            "1" | "true" | "yes" | "on" | "enabled"
        )
    })
}

/// Get comma-separated environment variable, dropping empty items
fn get_env_list(name: &str) -> Option<Vec<String>> {
    get_env(name).map(|v| {
        v.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect()
    })
}

/// Builder for setting environment variables (useful for testing)
pub struct EnvBuilder {
    vars: Vec<(String, String)>,
}

impl EnvBuilder {
    pub fn new() -> Self {
        Self { vars: Vec::new() }
    }

    /// Set any `NEXTUNIT_<name>` variable
    pub fn var(mut self, name: &str, value: impl Into<String>) -> Self {
        self.vars.push((format!("{ENV_PREFIX}_{name}"), value.into()));
        self
    }

    pub fn categories(self, categories: &[&str]) -> Self {
        self.var("CATEGORY", categories.join(","))
    }

    pub fn tags(self, tags: &[&str]) -> Self {
        self.var("TAG", tags.join(","))
    }

    pub fn max_parallel(self, n: usize) -> Self {
        self.var("MAX_PARALLEL", n.to_string())
    }

    pub fn fail_fast(self, fail_fast: bool) -> Self {
        self.var("FAIL_FAST", fail_fast.to_string())
    }

    /// Apply environment variables
    pub fn apply(self) {
        for (key, value) in self.vars {
            env::set_var(key, value);
        }
    }

    /// Apply and return guard that restores on drop
    pub fn apply_scoped(self) -> EnvGuard {
        let previous: Vec<_> = self
            .vars
            .iter()
            .map(|(k, _)| (k.clone(), env::var(k).ok()))
            .collect();

        self.apply();

        EnvGuard { previous }
    }
}

impl Default for EnvBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Guard that restores environment variables on drop
pub struct EnvGuard {
    previous: Vec<(String, Option<String>)>,
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, value) in &self.previous {
            match value {
                Some(v) => env::set_var(key, v),
                None => env::remove_var(key),
            }
        }
    }
}

/// Print all NEXTUNIT environment variables
pub fn print_env_help() {
    println!("Environment Variables:");
    println!();
    println!("  {ENV_PREFIX}_CATEGORY          Run only these categories (comma-separated)");
    println!("  {ENV_PREFIX}_EXCLUDE_CATEGORY  Skip these categories");
    println!("  {ENV_PREFIX}_TAG               Run only tests with these tags");
    println!("  {ENV_PREFIX}_EXCLUDE_TAG       Skip tests with these tags");
    println!("  {ENV_PREFIX}_FILTER            Test name wildcards (* and ?)");
    println!("  {ENV_PREFIX}_FILTER_REGEX      Test name regex");
    println!("  {ENV_PREFIX}_EXPLICIT          Include explicit tests (true/false)");
    println!("  {ENV_PREFIX}_MAX_PARALLEL      Maximum concurrently running tests");
    println!("  {ENV_PREFIX}_FAIL_FAST         Stop after the first failure (true/false)");
    println!("  {ENV_PREFIX}_LOG_LEVEL         Log level (trace, debug, info, warn, error)");
    println!("  {ENV_PREFIX}_FORMAT            Output format (table, json, summary)");
    println!("  {ENV_PREFIX}_CONFIG            Path to configuration file");
    println!();
    println!("Command-line options take precedence over environment variables.");
}
