//! Value resolvers - 名前で引ける値変換
//!
//! Resolvers are registered once at startup and looked up on every mapped
//! field, so the registry is read-mostly: a `parking_lot::RwLock` around a
//! `HashMap<String, Arc<dyn Resolver>>`.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::domain::{Row, Value};

/// A named value transform: `(value, row, args) -> value`.
///
/// `row` is the whole source row, for resolvers that derive a value from
/// sibling fields.
pub trait Resolver: Send + Sync {
    fn resolve(&self, value: Value, row: &Row, args: &[String]) -> Value;
}

impl<F> Resolver for F
where
    F: Fn(Value, &Row, &[String]) -> Value + Send + Sync,
{
    fn resolve(&self, value: Value, row: &Row, args: &[String]) -> Value {
        self(value, row, args)
    }
}

/// Strips surrounding whitespace from strings; other values pass through.
pub struct Trim;

impl Resolver for Trim {
    fn resolve(&self, value: Value, _row: &Row, _args: &[String]) -> Value {
        match value {
            Value::String(s) => Value::String(s.trim().to_string()),
            other => other,
        }
    }
}

/// Base-10 integer conversion.
///
/// Strings that do not parse become `0`; floats are floored.
pub struct Int;

impl Resolver for Int {
    fn resolve(&self, value: Value, _row: &Row, _args: &[String]) -> Value {
        match value {
            Value::String(s) => Value::Int(s.parse::<i64>().unwrap_or(0)),
            Value::Float(f) => Value::Int(f.floor() as i64),
            other => other,
        }
    }
}

/// Registry of resolvers (name -> resolver).
///
/// Registering an existing name replaces it ("last wins").
pub struct ResolverRegistry {
    resolvers: RwLock<HashMap<String, Arc<dyn Resolver>>>,
}

impl ResolverRegistry {
    /// Empty registry, without built-ins.
    pub fn empty() -> Self {
        Self {
            resolvers: RwLock::new(HashMap::new()),
        }
    }

    /// Registry with the built-in `trim` and `int` resolvers.
    pub fn new() -> Self {
        let registry = Self::empty();
        registry.register("trim", Trim);
        registry.register("int", Int);
        registry
    }

    pub fn register<R: Resolver + 'static>(&self, name: impl Into<String>, resolver: R) {
        self.resolvers.write().insert(name.into(), Arc::new(resolver));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Resolver>> {
        self.resolvers.read().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.resolvers.read().contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.resolvers.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Apply resolver `name` to `value`.
    ///
    /// Unregistered names pass `value` through unchanged. A resolver that
    /// panics also yields the original value.
    pub fn resolve(&self, value: Value, row: &Row, name: &str, args: &[String]) -> Value {
        // lookup の lock は resolver 実行前に手放す
        let Some(resolver) = self.get(name) else {
            return value;
        };

        let input = value.clone();
        match catch_unwind(AssertUnwindSafe(|| resolver.resolve(input, row, args))) {
            Ok(resolved) => resolved,
            Err(_) => {
                tracing::warn!(resolver = name, "resolver panicked, keeping unresolved value");
                value
            }
        }
    }
}

impl Default for ResolverRegistry {
    fn default() -> Self {
        Self::new()
    }
}
