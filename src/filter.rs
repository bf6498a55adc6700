//! Test selection
//!
//! Filters templates by category, tag, name wildcard, name regex and the
//! explicit flag. Filtering runs on templates, before any data provider is
//! invoked.

use regex::Regex;
use tracing::debug;

use crate::config::FilterConfig;
use crate::data::TestTemplate;
use crate::error::EngineError;
use crate::models::TestCaseDescriptor;

/// Compiled selection criteria
#[derive(Clone, Debug, Default)]
pub struct TestFilter {
    categories: Vec<String>,
    exclude_categories: Vec<String>,
    tags: Vec<String>,
    exclude_tags: Vec<String>,
    name_patterns: Vec<Regex>,
    name_regex: Option<Regex>,
    include_explicit: bool,
}

/// Compile a `*`/`?` wildcard into an anchored regex
pub fn wildcard_to_regex(pattern: &str) -> Result<Regex, EngineError> {
    let escaped = regex::escape(pattern)
        .replace(r"\*", ".*")
        .replace(r"\?", ".");
    Regex::new(&format!("^{escaped}$")).map_err(|_| EngineError::InvalidWildcard(pattern.to_string()))
}

impl TestFilter {
    /// Filter that selects every non-explicit test
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &FilterConfig) -> Result<Self, EngineError> {
        let name_patterns = config
            .name_filters
            .iter()
            .map(|p| wildcard_to_regex(p))
            .collect::<Result<Vec<_>, _>>()?;

        let name_regex = config
            .name_regex
            .as_deref()
            .map(|pattern| {
                Regex::new(pattern).map_err(|source| EngineError::InvalidRegex {
                    pattern: pattern.to_string(),
                    source,
                })
            })
            .transpose()?;

        Ok(Self {
            categories: config.categories.clone(),
            exclude_categories: config.exclude_categories.clone(),
            tags: config.tags.clone(),
            exclude_tags: config.exclude_tags.clone(),
            name_patterns,
            name_regex,
            include_explicit: config.include_explicit,
        })
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.categories.push(category.into());
        self
    }

    pub fn excluding_category(mut self, category: impl Into<String>) -> Self {
        self.exclude_categories.push(category.into());
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn excluding_tag(mut self, tag: impl Into<String>) -> Self {
        self.exclude_tags.push(tag.into());
        self
    }

    pub fn with_name(mut self, wildcard: &str) -> Result<Self, EngineError> {
        self.name_patterns.push(wildcard_to_regex(wildcard)?);
        Ok(self)
    }

    pub fn include_explicit(mut self, include: bool) -> Self {
        self.include_explicit = include;
        self
    }

    fn has_name_selector(&self) -> bool {
        !self.name_patterns.is_empty() || self.name_regex.is_some()
    }

    fn name_matches(&self, case: &TestCaseDescriptor) -> bool {
        let full_name = case.full_name();
        let candidates = [full_name.as_str(), case.logical_id.as_str(), case.id.as_str()];

        let wildcard_ok = self.name_patterns.is_empty()
            || self
                .name_patterns
                .iter()
                .any(|re| candidates.iter().any(|c| re.is_match(c)));
        let regex_ok = self
            .name_regex
            .as_ref()
            .map_or(true, |re| candidates.iter().any(|c| re.is_match(c)));

        wildcard_ok && regex_ok
    }

    /// Whether `case` is selected on its own merits
    pub fn matches(&self, case: &TestCaseDescriptor) -> bool {
        if !self.name_matches(case) {
            return false;
        }

        if !self.categories.is_empty() && !case.categories.iter().any(|c| self.categories.contains(c)) {
            return false;
        }
        if case.categories.iter().any(|c| self.exclude_categories.contains(c)) {
            return false;
        }

        if !self.tags.is_empty() && !case.tags.iter().any(|t| self.tags.contains(t)) {
            return false;
        }
        if case.tags.iter().any(|t| self.exclude_tags.contains(t)) {
            return false;
        }

        // Explicit tests need opting in, by flag or by naming them
        !case.explicit || self.include_explicit || self.has_name_selector()
    }

    /// Select matching templates plus every template they depend on,
    /// transitively, in declaration order
    pub fn select(&self, templates: &[TestTemplate]) -> Vec<TestTemplate> {
        let mut selected: Vec<bool> = templates.iter().map(|t| self.matches(&t.descriptor)).collect();
        let mut queue: Vec<usize> = (0..templates.len()).filter(|&i| selected[i]).collect();

        while let Some(i) = queue.pop() {
            for dep in &templates[i].descriptor.dependencies {
                for (j, template) in templates.iter().enumerate() {
                    if !selected[j] && provides(template, &dep.target) {
                        debug!(
                            "Including {} as a dependency of {}",
                            template.id(),
                            templates[i].id()
                        );
                        selected[j] = true;
                        queue.push(j);
                    }
                }
            }
        }

        templates
            .iter()
            .zip(selected)
            .filter(|(_, keep)| *keep)
            .map(|(t, _)| t.clone())
            .collect()
    }
}

/// Whether expanding `template` can yield a case matching `target`
fn provides(template: &TestTemplate, target: &str) -> bool {
    let id = template.descriptor.id.as_str();
    target == id
        || target == template.id()
        || target
            .strip_prefix(id)
            .is_some_and(|rest| rest.starts_with('[') || rest.starts_with('#'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::test_body;

    fn case(class: &str, name: &str) -> TestCaseDescriptor {
        TestCaseDescriptor::new(class, name, test_body(|_| async { Ok(()) }))
    }

    #[test]
    fn test_wildcards() {
        let re = wildcard_to_regex("default.Math*.add?").unwrap();
        assert!(re.is_match("default.MathTests.adds"));
        assert!(!re.is_match("default.MathTests.add"));
        assert!(!re.is_match("xdefault.MathTests.adds"));
    }

    #[test]
    fn test_category_include_and_exclude() {
        let filter = TestFilter::new().with_category("db").excluding_tag("slow");
        assert!(filter.matches(&case("C", "a").with_category("db")));
        assert!(!filter.matches(&case("C", "b").with_category("ui")));
        assert!(!filter.matches(&case("C", "c").with_category("db").with_tag("slow")));
    }

    #[test]
    fn test_explicit_needs_opt_in() {
        let explicit = case("C", "manual").explicit(Some("needs hardware".into()));
        assert!(!TestFilter::new().matches(&explicit));
        assert!(TestFilter::new().include_explicit(true).matches(&explicit));
        assert!(TestFilter::new()
            .with_name("*.manual")
            .unwrap()
            .matches(&explicit));
    }

    #[test]
    fn test_regex_from_config() {
        let config = FilterConfig {
            name_regex: Some("Db.*".to_string()),
            ..Default::default()
        };
        let filter = TestFilter::from_config(&config).unwrap();
        assert!(filter.matches(&case("DbTests", "x")));
        assert!(!filter.matches(&case("UiTests", "x")));

        let bad = FilterConfig {
            name_regex: Some("(".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            TestFilter::from_config(&bad),
            Err(EngineError::InvalidRegex { .. })
        ));
    }

    #[test]
    fn test_dependencies_are_pulled_in() {
        let templates: Vec<TestTemplate> = vec![
            case("C", "seed").into(),
            case("C", "migrate").depends_on("C.seed").into(),
            case("C", "query").with_category("db").depends_on("C.migrate").into(),
            case("C", "unrelated").into(),
        ];

        let selected = TestFilter::new().with_category("db").select(&templates);
        let ids: Vec<&str> = selected.iter().map(|t| t.id()).collect();
        assert_eq!(ids, vec!["C.seed", "C.migrate", "C.query"]);
    }

    #[test]
    fn test_dependency_on_expanded_variant() {
        let templates: Vec<TestTemplate> = vec![
            TestTemplate::new(case("C", "data")).with_arguments(vec![vec![1], vec![2]]),
            case("C", "after").with_tag("t").depends_on("C.data[1]").into(),
        ];
        let selected = TestFilter::new().with_tag("t").select(&templates);
        assert_eq!(selected.len(), 2);
    }
}
