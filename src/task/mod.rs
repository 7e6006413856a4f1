pub mod task_models;
pub mod task_repository;

pub use task_repository::{DeadlineStore, TaskRepository};
