//! Store adapter implementations.

pub mod memory;

pub use memory::MemoryTransactionalStore;
