use crate::storage::{self, KvStore, StoreError, TASKS_KEY};
use pocus_ipc::{TaskId, TaskInfo};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    #[serde(default)]
    pub completed: bool,
    pub estimated_units: u32,
    /// Only ever incremented, by work interval completions.
    #[serde(default)]
    pub actual_units: u32,
}

impl Task {
    pub fn info(&self, selected: bool) -> TaskInfo {
        TaskInfo {
            id: self.id,
            title: self.title.clone(),
            completed: self.completed,
            estimated_units: self.estimated_units,
            actual_units: self.actual_units,
            selected,
        }
    }
}

#[derive(Error, Debug)]
pub enum TaskError {
    #[error("No task with id {0}")]
    NotFound(TaskId),

    #[error("Task title cannot be empty")]
    EmptyTitle,

    /// The change was applied in memory but could not be written.
    #[error("Failed to save tasks: {0}")]
    Store(#[from] StoreError),
}

/// Insertion-ordered tasks. Every mutation writes the whole collection.
pub struct TaskStore {
    tasks: Vec<Task>,
    next_id: TaskId,
    store: Arc<dyn KvStore>,
}

impl TaskStore {
    pub fn load(store: Arc<dyn KvStore>) -> Self {
        let tasks: Vec<Task> = storage::load_or_default(store.as_ref(), TASKS_KEY);
        let next_id = tasks.iter().map(|t| t.id).max().map_or(1, |id| id + 1);
        Self {
            tasks,
            next_id,
            store,
        }
    }

    pub fn all(&self) -> &[Task] {
        &self.tasks
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn get(&self, id: TaskId) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    /// Incomplete tasks first, then completed ones, each in insertion order.
    pub fn ordered(&self) -> Vec<&Task> {
        let (done, open): (Vec<&Task>, Vec<&Task>) = self.tasks.iter().partition(|t| t.completed);
        open.into_iter().chain(done).collect()
    }

    pub fn first_incomplete(&self) -> Option<&Task> {
        self.tasks.iter().find(|t| !t.completed)
    }

    /// Sums of estimated and actual units, saturating at `u32::MAX`.
    pub fn totals(&self) -> (u32, u32) {
        self.tasks.iter().fold((0u32, 0u32), |(est, act), t| {
            (
                est.saturating_add(t.estimated_units),
                act.saturating_add(t.actual_units),
            )
        })
    }

    pub fn remaining_units(&self) -> u32 {
        let (est, act) = self.totals();
        est.saturating_sub(act)
    }

    pub fn add(&mut self, title: &str, estimated_units: u32) -> Result<Task, TaskError> {
        let title = title.trim();
        if title.is_empty() {
            return Err(TaskError::EmptyTitle);
        }
        let task = Task {
            id: self.next_id,
            title: title.to_string(),
            completed: false,
            estimated_units: estimated_units.max(1),
            actual_units: 0,
        };
        self.next_id += 1;
        self.tasks.push(task.clone());
        info!(id = task.id, title = %task.title, "Task added");
        self.persist()?;
        Ok(task)
    }

    /// Returns the new completion state.
    pub fn toggle_complete(&mut self, id: TaskId) -> Result<bool, TaskError> {
        let task = self.find_mut(id)?;
        task.completed = !task.completed;
        let completed = task.completed;
        info!(id, completed, "Task completion toggled");
        self.persist()?;
        Ok(completed)
    }

    pub fn update(&mut self, id: TaskId, title: &str, estimated_units: u32) -> Result<(), TaskError> {
        let title = title.trim();
        if title.is_empty() {
            return Err(TaskError::EmptyTitle);
        }
        let task = self.find_mut(id)?;
        task.title = title.to_string();
        task.estimated_units = estimated_units.max(1);
        info!(id, "Task updated");
        self.persist()?;
        Ok(())
    }

    pub fn remove(&mut self, id: TaskId) -> Result<Task, TaskError> {
        let index = self
            .tasks
            .iter()
            .position(|t| t.id == id)
            .ok_or(TaskError::NotFound(id))?;
        let task = self.tasks.remove(index);
        info!(id, "Task removed");
        self.persist()?;
        Ok(task)
    }

    /// Credits one completed work interval to `id`.
    pub fn increment_actual(&mut self, id: TaskId) -> Result<u32, TaskError> {
        let task = self.find_mut(id)?;
        task.actual_units = task.actual_units.saturating_add(1);
        let actual = task.actual_units;
        self.persist()?;
        Ok(actual)
    }

    fn find_mut(&mut self, id: TaskId) -> Result<&mut Task, TaskError> {
        self.tasks
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or(TaskError::NotFound(id))
    }

    fn persist(&self) -> Result<(), StoreError> {
        storage::save_json(self.store.as_ref(), TASKS_KEY, &self.tasks)
    }
}
