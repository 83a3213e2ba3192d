//! HTTP surface.

pub mod server;

pub use server::serve;
