//! Data-source descriptors
//!
//! A [`TestTemplate`] is a declaration plus the source its argument sets come
//! from. Expansion turns it into concrete [`TestCaseDescriptor`]s.

use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use super::matrix::MatrixSpec;
use super::shared::ClassSource;
use crate::models::TestCaseDescriptor;

pub type RowsProvider = Arc<dyn Fn() -> BoxFuture<'static, Result<Vec<Vec<Value>>, String>> + Send + Sync>;
pub type ValuesProvider = Arc<dyn Fn() -> BoxFuture<'static, Result<Vec<Value>, String>> + Send + Sync>;

/// Where a single parameter of a combined source gets its values
#[derive(Clone)]
pub enum ParameterSource {
    Values(Vec<Value>),
    Provider { member: String, provider: ValuesProvider },
    Class(ClassSource),
}

impl ParameterSource {
    pub fn values<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        ParameterSource::Values(values.into_iter().map(Into::into).collect())
    }

    pub fn provider<F, Fut>(member: impl Into<String>, f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Vec<Value>, String>> + Send + 'static,
    {
        ParameterSource::Provider {
            member: member.into(),
            provider: Arc::new(move || f().boxed()),
        }
    }
}

impl fmt::Debug for ParameterSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParameterSource::Values(v) => f.debug_tuple("Values").field(v).finish(),
            ParameterSource::Provider { member, .. } => {
                f.debug_struct("Provider").field("member", member).finish()
            }
            ParameterSource::Class(c) => f.debug_tuple("Class").field(c).finish(),
        }
    }
}

/// Source of argument sets for a declaration
#[derive(Clone, Default)]
pub enum DataSource {
    /// Parameterless
    #[default]
    None,
    /// Literal argument sets
    Arguments(Vec<Vec<Value>>),
    /// Named member yielding argument sets, invoked lazily
    TestData { member: String, provider: RowsProvider },
    Matrix(MatrixSpec),
    /// One instance per parameter, one case
    ClassData(Vec<ClassSource>),
    /// Per-parameter sources combined by Cartesian product
    Combined(Vec<ParameterSource>),
}

impl DataSource {
    pub fn test_data<F, Fut>(member: impl Into<String>, f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Vec<Vec<Value>>, String>> + Send + 'static,
    {
        DataSource::TestData {
            member: member.into(),
            provider: Arc::new(move || f().boxed()),
        }
    }
}

impl fmt::Debug for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataSource::None => write!(f, "None"),
            DataSource::Arguments(rows) => f.debug_tuple("Arguments").field(rows).finish(),
            DataSource::TestData { member, .. } => {
                f.debug_struct("TestData").field("member", member).finish()
            }
            DataSource::Matrix(m) => f.debug_tuple("Matrix").field(m).finish(),
            DataSource::ClassData(c) => f.debug_tuple("ClassData").field(c).finish(),
            DataSource::Combined(p) => f.debug_tuple("Combined").field(p).finish(),
        }
    }
}

/// A declaration awaiting expansion
#[derive(Clone, Debug)]
pub struct TestTemplate {
    pub descriptor: TestCaseDescriptor,
    pub source: DataSource,
    pub repeat: Option<u32>,
}

impl TestTemplate {
    pub fn new(descriptor: TestCaseDescriptor) -> Self {
        Self {
            descriptor,
            source: DataSource::None,
            repeat: None,
        }
    }

    pub fn with_source(mut self, source: DataSource) -> Self {
        self.source = source;
        self
    }

    pub fn with_arguments<I, R, V>(self, rows: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let rows = rows
            .into_iter()
            .map(|row| row.into_iter().map(Into::into).collect())
            .collect();
        self.with_source(DataSource::Arguments(rows))
    }

    pub fn with_matrix(self, matrix: MatrixSpec) -> Self {
        self.with_source(DataSource::Matrix(matrix))
    }

    /// Run every expanded case `times` times
    pub fn repeat(mut self, times: u32) -> Self {
        self.repeat = Some(times);
        self
    }

    pub fn id(&self) -> &str {
        &self.descriptor.logical_id
    }
}

impl From<TestCaseDescriptor> for TestTemplate {
    fn from(descriptor: TestCaseDescriptor) -> Self {
        TestTemplate::new(descriptor)
    }
}
