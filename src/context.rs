//! Per-case context
//!
//! Passed explicitly to test bodies and test-scoped hooks. Carries the case
//! identity, its arguments, the cancellation token observed at await points,
//! captured output and attached artifacts.

use serde::de::DeserializeOwned;
use std::any::Any;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use crate::error::{ArtifactError, TestError};
use crate::executor::CancellationToken;
use crate::models::{Argument, Artifact, TestCaseDescriptor};

#[derive(Debug)]
struct CaseInfo {
    id: String,
    display_name: String,
    class_name: String,
    assembly: String,
    repeat_index: Option<u32>,
    arguments: Vec<Argument>,
}

#[derive(Debug, Default)]
struct Captured {
    output: String,
    artifacts: Vec<Artifact>,
}

/// Context of one running test case
#[derive(Clone, Debug)]
pub struct TestContext {
    info: Arc<CaseInfo>,
    captured: Arc<Mutex<Captured>>,
    cancellation: CancellationToken,
    attempt: u32,
}

impl TestContext {
    pub fn new(case: &TestCaseDescriptor, cancellation: CancellationToken) -> Self {
        Self {
            info: Arc::new(CaseInfo {
                id: case.id.clone(),
                display_name: case.display_name.clone(),
                class_name: case.class_name.clone(),
                assembly: case.assembly.clone(),
                repeat_index: case.repeat_index,
                arguments: case.arguments.clone().unwrap_or_default(),
            }),
            captured: Arc::new(Mutex::new(Captured::default())),
            cancellation,
            attempt: 1,
        }
    }

    /// Same case, next attempt; output and artifacts accumulate
    pub(crate) fn for_attempt(&self, attempt: u32) -> Self {
        Self {
            attempt,
            ..self.clone()
        }
    }

    pub fn test_id(&self) -> &str {
        &self.info.id
    }

    pub fn display_name(&self) -> &str {
        &self.info.display_name
    }

    pub fn class_name(&self) -> &str {
        &self.info.class_name
    }

    pub fn assembly(&self) -> &str {
        &self.info.assembly
    }

    pub fn repeat_index(&self) -> Option<u32> {
        self.info.repeat_index
    }

    /// 1-based attempt number
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    pub fn arguments(&self) -> &[Argument] {
        &self.info.arguments
    }

    /// Deserialize the literal argument at `index`
    pub fn arg<T: DeserializeOwned>(&self, index: usize) -> Result<T, TestError> {
        let value = self
            .info
            .arguments
            .get(index)
            .and_then(Argument::as_value)
            .ok_or_else(|| TestError::framework(format!("no value argument at index {index}")))?;

        serde_json::from_value(value.clone()).map_err(|e| {
            TestError::framework(format!("argument {index} has unexpected shape: {e}"))
        })
    }

    /// Shared data-source instance at `index`
    pub fn shared<T: Any + Send + Sync>(&self, index: usize) -> Result<Arc<T>, TestError> {
        match self.info.arguments.get(index) {
            Some(Argument::Shared(instance)) => instance.downcast::<T>().ok_or_else(|| {
                TestError::framework(format!(
                    "argument {index} is a {}, not a {}",
                    instance.type_name(),
                    std::any::type_name::<T>()
                ))
            }),
            _ => Err(TestError::framework(format!(
                "no shared instance at index {index}"
            ))),
        }
    }

    /// Append a line to the captured output
    pub fn write_line(&self, line: impl AsRef<str>) {
        if let Ok(mut captured) = self.captured.lock() {
            captured.output.push_str(line.as_ref());
            captured.output.push('\n');
        }
    }

    /// Attach a file; a missing path is rejected here rather than at report time
    pub fn attach(
        &self,
        path: impl Into<PathBuf>,
        description: Option<String>,
        mime_type: Option<String>,
    ) -> Result<(), ArtifactError> {
        let artifact = Artifact::new(path, description, mime_type)?;
        if let Ok(mut captured) = self.captured.lock() {
            captured.artifacts.push(artifact);
        }
        Ok(())
    }

    /// Output and artifacts captured so far
    pub fn take_captured(&self) -> (String, Vec<Artifact>) {
        match self.captured.lock() {
            Ok(mut captured) => (
                std::mem::take(&mut captured.output),
                std::mem::take(&mut captured.artifacts),
            ),
            Err(_) => (String::new(), Vec::new()),
        }
    }
}
