use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::ports::Target;

/// Registry of targets (name -> target).
#[derive(Default)]
pub struct TargetRegistry {
    targets: RwLock<HashMap<String, Arc<dyn Target>>>,
}

impl TargetRegistry {
    pub fn new() -> Self {
        Self {
            targets: RwLock::new(HashMap::new()),
        }
    }

    /// Register `target` under `name`; last registration wins.
    pub fn register(&self, name: impl Into<String>, target: Arc<dyn Target>) {
        self.targets.write().insert(name.into(), target);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Target>> {
        self.targets.read().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.targets.read().contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.targets.read().keys().cloned().collect();
        names.sort();
        names
    }
}
