//! Task store implementations.

pub mod memory;

pub use memory::InMemoryTaskStore;
