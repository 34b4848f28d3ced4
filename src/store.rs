use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{Local, NaiveDate, TimeZone, Utc};
use uuid::Uuid;

use crate::models::{Filter, NewTask, Task, TaskStats, TaskUpdate};
use crate::storage::{Storage, StorageError};

/// Cloneable handle to the authoritative task collection. All mutating
/// operations update the in-memory list and write the snapshot before
/// returning, under a single lock acquisition, so callers never observe a
/// mutation whose persistence write has not been issued.
#[derive(Clone)]
pub struct TaskStore {
    inner: Arc<StoreShared>,
}

struct StoreShared {
    storage: Storage,
    data: Mutex<StoreData>,
}

struct StoreData {
    tasks: Vec<Task>,
    filter: Filter,
}

impl TaskStore {
    /// Hydrates the store from the snapshot, once. A missing, unparsable, or
    /// unreadable snapshot is the normal first-run state and yields an empty
    /// collection; it is never fatal. The filter always starts at `All`.
    pub fn open(storage: Storage) -> Self {
        let tasks = match storage.load_snapshot() {
            Ok(Some(tasks)) => {
                log::info!(
                    "loaded {} task(s) from {}",
                    tasks.len(),
                    storage.snapshot_path().display()
                );
                tasks
            }
            Ok(None) => Vec::new(),
            Err(err) => {
                log::warn!(
                    "could not read snapshot at {}; starting empty: {err}",
                    storage.snapshot_path().display()
                );
                Vec::new()
            }
        };
        Self {
            inner: Arc::new(StoreShared {
                storage,
                data: Mutex::new(StoreData {
                    tasks,
                    filter: Filter::All,
                }),
            }),
        }
    }

    /// Creates a task at the front of the collection and returns a clone of
    /// it. A title that is empty after trimming is rejected: nothing is
    /// created, nothing is written, and `None` comes back.
    pub fn add_task(&self, new_task: NewTask) -> Option<Task> {
        let title = new_task.title.trim();
        if title.is_empty() {
            return None;
        }
        let task = Task {
            id: Uuid::new_v4().to_string(),
            title: title.to_string(),
            description: normalize_description(new_task.description),
            completed: false,
            priority: new_task.priority.unwrap_or_default(),
            category: new_task.category.unwrap_or_default(),
            created_at: Utc::now(),
            completed_at: None,
            due_date: new_task.due_date,
        };
        let mut data = self.lock();
        data.tasks.insert(0, task.clone());
        self.persist(&data);
        Some(task)
    }

    /// Flips the completion flag of the given task, stamping `completed_at`
    /// on completion and clearing it on un-completion. Unknown ids are a
    /// quiet no-op.
    pub fn toggle_complete(&self, id: &str) -> Option<Task> {
        let mut data = self.lock();
        let toggled = data.tasks.iter_mut().find(|task| task.id == id).map(|task| {
            task.completed = !task.completed;
            task.completed_at = task.completed.then(Utc::now);
            task.clone()
        });
        self.persist(&data);
        toggled
    }

    /// Removes the task and reports whether it existed.
    pub fn delete_task(&self, id: &str) -> bool {
        let mut data = self.lock();
        let before = data.tasks.len();
        data.tasks.retain(|task| task.id != id);
        let removed = data.tasks.len() < before;
        self.persist(&data);
        removed
    }

    /// Merges the supplied fields into an existing task and returns a clone
    /// of the result, or `None` for an unknown id. The completion stamp is
    /// kept consistent with the `completed` flag here, never taken from the
    /// caller.
    pub fn update_task(&self, id: &str, update: TaskUpdate) -> Option<Task> {
        let mut data = self.lock();
        let updated = data.tasks.iter_mut().find(|task| task.id == id).map(|task| {
            apply_update(task, update);
            task.clone()
        });
        self.persist(&data);
        updated
    }

    /// Drops every completed task, keeping the active ones in their current
    /// relative order. Returns how many were removed.
    pub fn clear_completed(&self) -> usize {
        let mut data = self.lock();
        let before = data.tasks.len();
        data.tasks.retain(|task| !task.completed);
        let removed = before - data.tasks.len();
        self.persist(&data);
        removed
    }

    /// Sets the transient view filter. Filter state never reaches the
    /// snapshot.
    pub fn set_filter(&self, filter: Filter) {
        self.lock().filter = filter;
    }

    pub fn filter(&self) -> Filter {
        self.lock().filter
    }

    /// The subsequence of the collection matching `filter`, in collection
    /// order (newest first), cloned.
    pub fn project(&self, filter: Filter) -> Vec<Task> {
        let data = self.lock();
        data.tasks
            .iter()
            .filter(|task| filter.matches(task))
            .cloned()
            .collect()
    }

    /// `project` applied to the currently selected filter.
    pub fn visible_tasks(&self) -> Vec<Task> {
        let filter = self.filter();
        self.project(filter)
    }

    /// The whole collection, cloned.
    pub fn tasks(&self) -> Vec<Task> {
        self.lock().tasks.clone()
    }

    /// Derived counts over the collection; `completed_today` buckets by the
    /// local calendar day.
    pub fn stats(&self) -> TaskStats {
        let data = self.lock();
        stats_for_day(&data.tasks, &Local, Local::now().date_naive())
    }

    /// Writes the current collection to the snapshot and surfaces the
    /// failure, unlike the mutating operations, which log and swallow it.
    pub fn flush(&self) -> Result<(), StorageError> {
        let data = self.lock();
        self.inner.storage.save_snapshot(&data.tasks)
    }

    // Post-mutation write. A failure here must not lose the mutation: the
    // in-memory collection stays authoritative for the session and the next
    // successful write carries the change.
    fn persist(&self, data: &StoreData) {
        if let Err(err) = self.inner.storage.save_snapshot(&data.tasks) {
            log::warn!("could not persist tasks; keeping in-memory state: {err}");
        }
    }

    fn lock(&self) -> MutexGuard<'_, StoreData> {
        self.inner.data.lock().expect("task store poisoned")
    }
}

fn apply_update(task: &mut Task, update: TaskUpdate) {
    if let Some(title) = update.title {
        let title = title.trim();
        // Titles may not become empty; a blank replacement is ignored.
        if !title.is_empty() {
            task.title = title.to_string();
        }
    }
    if let Some(description) = update.description {
        task.description = normalize_description(description);
    }
    if let Some(priority) = update.priority {
        task.priority = priority;
    }
    if let Some(category) = update.category {
        task.category = category;
    }
    if let Some(due_date) = update.due_date {
        task.due_date = due_date;
    }
    if let Some(completed) = update.completed {
        if completed && !task.completed {
            task.completed_at = Some(Utc::now());
        } else if !completed {
            task.completed_at = None;
        }
        task.completed = completed;
    }
}

fn normalize_description(description: Option<String>) -> Option<String> {
    description
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty())
}

fn stats_for_day<Tz: TimeZone>(tasks: &[Task], tz: &Tz, day: NaiveDate) -> TaskStats {
    let total = tasks.len();
    let completed = tasks.iter().filter(|task| task.completed).count();
    let completed_today = tasks
        .iter()
        .filter_map(|task| task.completed_at)
        .filter(|at| at.with_timezone(tz).date_naive() == day)
        .count();
    TaskStats {
        total,
        completed,
        active: total - completed,
        completed_today,
    }
}
