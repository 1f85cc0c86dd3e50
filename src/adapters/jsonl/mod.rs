//! Append-only task log adapters.

pub mod memory;
pub mod task_log;

pub use memory::MemoryTaskLog;
pub use task_log::JsonlTaskLog;
