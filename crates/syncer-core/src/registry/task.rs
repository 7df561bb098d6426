use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::domain::SyncTask;

/// Registry of task definitions (id -> task).
///
/// Tasks are stored behind `Arc` and swapped in whole, so a reader either
/// sees the old definition or the new one, never a half-written task.
#[derive(Default)]
pub struct TaskRegistry {
    tasks: RwLock<HashMap<String, Arc<SyncTask>>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self {
            tasks: RwLock::new(HashMap::new()),
        }
    }

    /// Upsert tasks by id. Re-adding an id replaces the previous definition.
    pub fn add<I>(&self, tasks: I)
    where
        I: IntoIterator<Item = SyncTask>,
    {
        let prepared: Vec<(String, Arc<SyncTask>)> = tasks
            .into_iter()
            .map(|task| (task.id.clone(), Arc::new(task)))
            .collect();

        let mut guard = self.tasks.write();
        for (id, task) in prepared {
            guard.insert(id, task);
        }
    }

    pub fn get(&self, id: &str) -> Option<Arc<SyncTask>> {
        self.tasks.read().get(id).cloned()
    }

    pub fn remove(&self, id: &str) -> Option<Arc<SyncTask>> {
        self.tasks.write().remove(id)
    }

    /// Registered ids, sorted.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.tasks.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// All tasks, sorted by id.
    pub fn snapshot(&self) -> Vec<Arc<SyncTask>> {
        let mut tasks: Vec<Arc<SyncTask>> = self.tasks.read().values().cloned().collect();
        tasks.sort_by(|a, b| a.id.cmp(&b.id));
        tasks
    }

    pub fn len(&self) -> usize {
        self.tasks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.read().is_empty()
    }
}
