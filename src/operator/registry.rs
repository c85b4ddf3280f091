// src/operator/registry.rs

//! Operator kind → factory lookup.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::fetch::FetchOperator;
use crate::operator::Operator;
use crate::operator::builtin::{CommandOperator, FailOperator, LogOperator};

/// Builds a fresh, uninitialized operator instance.
pub type OperatorFactory = Arc<dyn Fn() -> Box<dyn Operator> + Send + Sync>;

/// Registry of operator kinds.
///
/// Nodes name their operator by kind; the executor resolves every kind once
/// when a run is prepared, so an unknown kind is reported before anything
/// runs.
#[derive(Clone, Default)]
pub struct OperatorRegistry {
    factories: BTreeMap<String, OperatorFactory>,
}

impl fmt::Debug for OperatorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperatorRegistry")
            .field("kinds", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl OperatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-populated with `log`, `fail`, `command` and `fetch`.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register_default::<LogOperator>("log");
        registry.register_default::<FailOperator>("fail");
        registry.register_default::<CommandOperator>("command");
        registry.register_default::<FetchOperator>("fetch");
        registry
    }

    /// Register (or replace) the factory for `kind`.
    pub fn register<F>(&mut self, kind: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn() -> Box<dyn Operator> + Send + Sync + 'static,
    {
        let kind = kind.into();
        debug!(kind = %kind, "registering operator kind");
        self.factories.insert(kind, Arc::new(factory));
        self
    }

    /// Register a `Default`-constructible operator type under `kind`.
    pub fn register_default<T>(&mut self, kind: impl Into<String>) -> &mut Self
    where
        T: Operator + Default + 'static,
    {
        self.register(kind, || Box::new(T::default()))
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.factories.contains_key(kind)
    }

    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    /// A new instance for `kind`, or `None` if nothing is registered.
    pub fn create(&self, kind: &str) -> Option<Box<dyn Operator>> {
        self.factories.get(kind).map(|factory| factory())
    }
}
