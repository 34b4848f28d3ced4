//! Headless core of a single-user task list. `TaskStore` owns the in-memory
//! collection and mirrors it into a single JSON snapshot file after every
//! change; statistics and filtered projections are derived on demand.
//! Rendering and user interaction belong to the embedding application.
//!
//! ```no_run
//! use taskflow_core::{default_data_dir, NewTask, Storage, TaskStore};
//!
//! let root = default_data_dir().unwrap_or_else(|| ".".into());
//! let store = TaskStore::open(Storage::new(root));
//! store.add_task(NewTask::new("Buy groceries"));
//! for task in store.visible_tasks() {
//!     println!("{} [{}]", task.title, if task.completed { "x" } else { " " });
//! }
//! ```

mod models;
mod storage;
mod store;

pub use crate::models::{
    Category, Filter, NewTask, Priority, Task, TaskStats, TaskUpdate, Timestamp,
};
pub use crate::storage::{default_data_dir, Storage, StorageError};
pub use crate::store::TaskStore;
