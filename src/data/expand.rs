//! Data expansion
//!
//! Turns templates into concrete cases. Providers are only invoked for
//! templates handed to the expander, so filtering must happen first.

use serde_json::Value;
use tracing::debug;

use super::matrix::cartesian;
use super::shared::SharedRegistry;
use super::source::{DataSource, ParameterSource, TestTemplate};
use crate::error::DataError;
use crate::models::{Argument, TestCaseDescriptor};

pub struct Expander<'a> {
    shared: &'a SharedRegistry,
}

impl<'a> Expander<'a> {
    pub fn new(shared: &'a SharedRegistry) -> Self {
        Self { shared }
    }

    /// Expand one template into its concrete cases
    pub async fn expand(&self, template: &TestTemplate) -> Result<Vec<TestCaseDescriptor>, DataError> {
        let base = &template.descriptor;

        let cases = match self.argument_sets(template).await? {
            None => vec![base.clone()],
            Some(sets) => sets
                .into_iter()
                .enumerate()
                .map(|(i, args)| with_arguments(base, i, args))
                .collect(),
        };

        let cases = match template.repeat {
            Some(times) => repeat_cases(cases, times),
            None => cases,
        };

        debug!("Expanded {} into {} case(s)", base.logical_id, cases.len());
        Ok(cases)
    }

    async fn argument_sets(&self, template: &TestTemplate) -> Result<Option<Vec<Vec<Argument>>>, DataError> {
        let base = &template.descriptor;

        let sets = match &template.source {
            DataSource::None => return Ok(None),
            DataSource::Arguments(rows) => values_to_args(rows.clone()),
            DataSource::TestData { member, provider } => {
                let rows = provider()
                    .await
                    .map_err(|message| DataError::ProviderFailed {
                        member: member.clone(),
                        message,
                    })?;
                values_to_args(rows)
            }
            DataSource::Matrix(matrix) => values_to_args(matrix.combinations()?),
            DataSource::ClassData(sources) => {
                let mut args = Vec::with_capacity(sources.len());
                for source in sources {
                    let instance = self
                        .shared
                        .get_or_create(source, &base.class_name, &base.assembly)
                        .await?;
                    args.push(Argument::Shared(instance));
                }
                vec![args]
            }
            DataSource::Combined(params) => {
                let mut per_param = Vec::with_capacity(params.len());
                for param in params {
                    per_param.push(self.parameter_values(param, base).await?);
                }
                cartesian(&per_param)
            }
        };

        Ok(Some(sets))
    }

    async fn parameter_values(
        &self,
        param: &ParameterSource,
        base: &TestCaseDescriptor,
    ) -> Result<Vec<Argument>, DataError> {
        match param {
            ParameterSource::Values(values) => {
                Ok(values.iter().cloned().map(Argument::Value).collect())
            }
            ParameterSource::Provider { member, provider } => {
                let values = provider()
                    .await
                    .map_err(|message| DataError::ProviderFailed {
                        member: member.clone(),
                        message,
                    })?;
                Ok(values.into_iter().map(Argument::Value).collect())
            }
            ParameterSource::Class(source) => {
                let instance = self
                    .shared
                    .get_or_create(source, &base.class_name, &base.assembly)
                    .await?;
                Ok(vec![Argument::Shared(instance)])
            }
        }
    }
}

fn values_to_args(rows: Vec<Vec<Value>>) -> Vec<Vec<Argument>> {
    rows.into_iter()
        .map(|row| row.into_iter().map(Argument::Value).collect())
        .collect()
}

fn with_arguments(base: &TestCaseDescriptor, index: usize, args: Vec<Argument>) -> TestCaseDescriptor {
    let rendered = args
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ");

    let mut case = base.clone();
    case.id = format!("{}[{index}]", base.id);
    case.display_name = format!("{}({rendered})", base.display_name);
    case.arguments = Some(args);
    case
}

/// Duplicate each case `times` times with `#i` suffixes
pub fn repeat_cases(cases: Vec<TestCaseDescriptor>, times: u32) -> Vec<TestCaseDescriptor> {
    let times = times.max(1);
    cases
        .into_iter()
        .flat_map(|case| {
            (0..times).map(move |i| {
                let mut repeated = case.clone();
                repeated.id = format!("{}#{i}", case.id);
                repeated.display_name = format!("{} #{i}", case.display_name);
                repeated.repeat_index = Some(i);
                repeated
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{ClassSource, MatrixSpec, SharedType};
    use crate::models::test_body;
    use serde_json::json;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn template(method: &str) -> TestTemplate {
        TestTemplate::new(TestCaseDescriptor::new(
            "Suite",
            method,
            test_body(|_| async { Ok(()) }),
        ))
    }

    #[tokio::test]
    async fn test_parameterless_keeps_id() {
        let shared = SharedRegistry::new();
        let cases = Expander::new(&shared).expand(&template("plain")).await.unwrap();
        assert_eq!(cases.len(), 1);
        assert_eq!(cases[0].id, "Suite.plain");
        assert!(cases[0].arguments.is_none());
    }

    #[tokio::test]
    async fn test_argument_rows_get_indexed_ids() {
        let shared = SharedRegistry::new();
        let t = template("add").with_arguments([[json!(1), json!(2)], [json!(3), json!("x")]]);
        let cases = Expander::new(&shared).expand(&t).await.unwrap();

        assert_eq!(cases.len(), 2);
        assert_eq!(cases[0].id, "Suite.add[0]");
        assert_eq!(cases[1].id, "Suite.add[1]");
        assert_eq!(cases[1].display_name, "add(3, \"x\")");
        assert_eq!(cases[1].logical_id, "Suite.add");
    }

    #[tokio::test]
    async fn test_matrix_expansion() {
        let shared = SharedRegistry::new();
        let t = template("grid").with_matrix(
            MatrixSpec::new()
                .param("a", [1, 2, 3])
                .param("b", [10, 20])
                .exclude([1, 10]),
        );
        let cases = Expander::new(&shared).expand(&t).await.unwrap();
        assert_eq!(cases.len(), 5);
        assert!(cases.iter().all(|c| c.display_name != "grid(1, 10)"));
    }

    #[tokio::test]
    async fn test_repeat_suffixes() {
        let shared = SharedRegistry::new();
        let cases = Expander::new(&shared)
            .expand(&template("again").repeat(3))
            .await
            .unwrap();

        let ids: Vec<&str> = cases.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["Suite.again#0", "Suite.again#1", "Suite.again#2"]);
        assert_eq!(cases[2].repeat_index, Some(2));
        assert_eq!(cases[2].display_name, "again #2");
    }

    #[tokio::test]
    async fn test_repeat_applies_to_every_expanded_case() {
        let shared = SharedRegistry::new();
        let t = template("rows")
            .with_arguments([[1], [2]])
            .repeat(2);
        let cases = Expander::new(&shared).expand(&t).await.unwrap();

        let ids: HashSet<&str> = cases.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids.len(), 4);
        assert!(ids.contains("Suite.rows[1]#0"));
    }

    #[tokio::test]
    async fn test_provider_failure_is_reported() {
        let shared = SharedRegistry::new();
        let t = template("data").with_source(DataSource::test_data("Rows", || async {
            Err::<Vec<Vec<Value>>, _>("file missing".to_string())
        }));
        let err = Expander::new(&shared).expand(&t).await.unwrap_err();
        assert!(matches!(err, DataError::ProviderFailed { .. }));
    }

    #[tokio::test]
    async fn test_combined_sources_form_product() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let shared = SharedRegistry::new();

        let t = template("combo").with_source(DataSource::Combined(vec![
            ParameterSource::values(["a", "b"]),
            ParameterSource::provider("Sizes", || async { Ok(vec![json!(1), json!(2), json!(3)]) }),
            ParameterSource::Class(ClassSource::new(SharedType::PerClass, move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, String>(42u32)
                }
            })),
        ]));

        let cases = Expander::new(&shared).expand(&t).await.unwrap();
        assert_eq!(cases.len(), 6);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cases[0].arguments.as_ref().unwrap().len(), 3);
    }
}
