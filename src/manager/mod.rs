pub mod coordinator;
pub mod task_manager;
