//! Event bus adapters.

pub mod memory;

pub use memory::{MemoryBus, MemoryBusConfig};
