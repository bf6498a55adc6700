//! Shared data-source instances
//!
//! Class-based data sources may reuse one provider instance across many
//! expanded cases. Instances are cached by (type, sharing scope); the first
//! requester constructs, concurrent requesters await the same construction.
//! Use of a shared instance is not serialized.

use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex};
use tokio::sync::OnceCell;
use tracing::debug;

use crate::error::DataError;

/// Reuse policy of a class-based data source
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SharedType {
    /// Fresh instance per case
    #[default]
    None,
    /// One instance per key string, across classes
    Keyed(String),
    PerClass,
    PerAssembly,
    PerSession,
}

/// Lifetime scope of a cached instance
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ScopeKey {
    Keyed(String),
    Class { assembly: String, class: String },
    Assembly(String),
    Session,
}

type AnyInstance = Arc<dyn Any + Send + Sync>;
type InstanceFactory = Arc<dyn Fn() -> BoxFuture<'static, Result<AnyInstance, String>> + Send + Sync>;

/// A constructed provider instance
#[derive(Clone)]
pub struct SharedInstance {
    type_name: &'static str,
    instance: AnyInstance,
}

impl SharedInstance {
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.instance.clone().downcast::<T>().ok()
    }

    pub fn ptr_eq(&self, other: &SharedInstance) -> bool {
        Arc::ptr_eq(&self.instance, &other.instance)
    }
}

impl fmt::Debug for SharedInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SharedInstance<{}>", self.type_name)
    }
}

/// Declaration of a class-based data provider
#[derive(Clone)]
pub struct ClassSource {
    pub type_name: &'static str,
    pub shared: SharedType,
    factory: InstanceFactory,
}

impl ClassSource {
    pub fn new<T, F, Fut>(shared: SharedType, factory: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, String>> + Send + 'static,
    {
        let factory: InstanceFactory = Arc::new(move || {
            let fut = factory();
            async move { fut.await.map(|v| Arc::new(v) as AnyInstance) }.boxed()
        });

        Self {
            type_name: std::any::type_name::<T>(),
            shared,
            factory,
        }
    }

    async fn construct(&self) -> Result<SharedInstance, DataError> {
        debug!("Constructing data source instance {}", self.type_name);
        let instance = (self.factory)()
            .await
            .map_err(|message| DataError::SharedConstruction {
                type_name: self.type_name.to_string(),
                message,
            })?;

        Ok(SharedInstance {
            type_name: self.type_name,
            instance,
        })
    }
}

impl fmt::Debug for ClassSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassSource")
            .field("type_name", &self.type_name)
            .field("shared", &self.shared)
            .finish()
    }
}

type CellKey = (&'static str, ScopeKey);

/// Run-scoped cache of shared instances
#[derive(Default)]
pub struct SharedRegistry {
    cells: Mutex<HashMap<CellKey, Arc<OnceCell<SharedInstance>>>>,
}

impl SharedRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve an instance for a case declared in `class_name`/`assembly`
    pub async fn get_or_create(
        &self,
        source: &ClassSource,
        class_name: &str,
        assembly: &str,
    ) -> Result<SharedInstance, DataError> {
        let scope = match &source.shared {
            SharedType::None => return source.construct().await,
            SharedType::Keyed(key) => ScopeKey::Keyed(key.clone()),
            SharedType::PerClass => ScopeKey::Class {
                assembly: assembly.to_string(),
                class: class_name.to_string(),
            },
            SharedType::PerAssembly => ScopeKey::Assembly(assembly.to_string()),
            SharedType::PerSession => ScopeKey::Session,
        };

        let cell = {
            let mut cells = self
                .cells
                .lock()
                .map_err(|_| DataError::SharedConstruction {
                    type_name: source.type_name.to_string(),
                    message: "shared registry poisoned".to_string(),
                })?;
            cells
                .entry((source.type_name, scope))
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .clone()
        };

        cell.get_or_try_init(|| source.construct()).await.cloned()
    }

    /// Drop every instance bound to `scope`
    pub fn release(&self, scope: &ScopeKey) {
        if let Ok(mut cells) = self.cells.lock() {
            let before = cells.len();
            cells.retain(|(_, key), _| key != scope);
            if cells.len() != before {
                debug!("Released {} shared instance(s) for {:?}", before - cells.len(), scope);
            }
        }
    }

    /// Drop everything; called at session end
    pub fn clear(&self) {
        if let Ok(mut cells) = self.cells.lock() {
            cells.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.cells.lock().map(|c| c.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct Database {
        id: usize,
    }

    fn counting_source(shared: SharedType, counter: Arc<AtomicUsize>) -> ClassSource {
        ClassSource::new(shared, move || {
            let counter = counter.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(5)).await;
                let id = counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, String>(Database { id })
            }
        })
    }

    #[tokio::test]
    async fn test_none_creates_fresh_instances() {
        let counter = Arc::new(AtomicUsize::new(0));
        let source = counting_source(SharedType::None, counter.clone());
        let registry = SharedRegistry::new();

        let a = registry.get_or_create(&source, "A", "asm").await.unwrap();
        let b = registry.get_or_create(&source, "A", "asm").await.unwrap();
        assert!(!a.ptr_eq(&b));
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_per_class_reuses_within_class_only() {
        let counter = Arc::new(AtomicUsize::new(0));
        let source = counting_source(SharedType::PerClass, counter.clone());
        let registry = SharedRegistry::new();

        let a1 = registry.get_or_create(&source, "A", "asm").await.unwrap();
        let a2 = registry.get_or_create(&source, "A", "asm").await.unwrap();
        let b = registry.get_or_create(&source, "B", "asm").await.unwrap();

        assert!(a1.ptr_eq(&a2));
        assert!(!a1.ptr_eq(&b));
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_same_class_name_in_two_assemblies() {
        let counter = Arc::new(AtomicUsize::new(0));
        let source = counting_source(SharedType::PerClass, counter.clone());
        let registry = SharedRegistry::new();

        let left = registry.get_or_create(&source, "Store", "left").await.unwrap();
        let right = registry.get_or_create(&source, "Store", "right").await.unwrap();
        assert!(!left.ptr_eq(&right));

        registry.release(&ScopeKey::Class {
            assembly: "left".into(),
            class: "Store".into(),
        });
        assert_eq!(registry.len(), 1);
        let again = registry.get_or_create(&source, "Store", "right").await.unwrap();
        assert!(right.ptr_eq(&again));
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_requesters_construct_once() {
        let counter = Arc::new(AtomicUsize::new(0));
        let source = counting_source(SharedType::PerSession, counter.clone());
        let registry = Arc::new(SharedRegistry::new());

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let registry = registry.clone();
                let source = source.clone();
                tokio::spawn(async move {
                    registry
                        .get_or_create(&source, &format!("C{i}"), "asm")
                        .await
                        .unwrap()
                })
            })
            .collect();

        let instances = futures::future::join_all(handles).await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        let first = instances[0].as_ref().unwrap();
        let db = first.downcast::<Database>().unwrap();
        assert_eq!(db.id, 0);
        for instance in &instances {
            assert!(first.ptr_eq(instance.as_ref().unwrap()));
        }
    }

    #[tokio::test]
    async fn test_release_scope() {
        let counter = Arc::new(AtomicUsize::new(0));
        let source = counting_source(SharedType::Keyed("db".into()), counter.clone());
        let registry = SharedRegistry::new();

        registry.get_or_create(&source, "A", "asm").await.unwrap();
        registry.get_or_create(&source, "B", "asm").await.unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(registry.len(), 1);

        registry.release(&ScopeKey::Keyed("db".into()));
        assert!(registry.is_empty());
        registry.get_or_create(&source, "A", "asm").await.unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_construction_failure_is_reported() {
        let source = ClassSource::new(SharedType::PerSession, || async {
            Err::<Database, _>("no connection".to_string())
        });
        let registry = SharedRegistry::new();
        let err = registry.get_or_create(&source, "A", "asm").await.unwrap_err();
        assert!(matches!(err, DataError::SharedConstruction { .. }));
    }
}
