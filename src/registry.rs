//! Test registration table
//!
//! The ordered list of declared tests a run starts from. Declaration order is
//! the tie-break for everything the scheduler does not otherwise order.

use crate::data::TestTemplate;

#[derive(Clone, Debug, Default)]
pub struct TestRegistry {
    templates: Vec<TestTemplate>,
}

impl TestRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a plain descriptor or a data-driven template
    pub fn add(&mut self, template: impl Into<TestTemplate>) -> &mut Self {
        self.templates.push(template.into());
        self
    }

    /// Builder form of [`TestRegistry::add`]
    pub fn with(mut self, template: impl Into<TestTemplate>) -> Self {
        self.templates.push(template.into());
        self
    }

    pub fn templates(&self) -> &[TestTemplate] {
        &self.templates
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

impl FromIterator<TestTemplate> for TestRegistry {
    fn from_iter<I: IntoIterator<Item = TestTemplate>>(iter: I) -> Self {
        Self {
            templates: iter.into_iter().collect(),
        }
    }
}
