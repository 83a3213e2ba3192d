//! Sandbox adapters.

pub mod null;

pub use null::NullSandbox;
