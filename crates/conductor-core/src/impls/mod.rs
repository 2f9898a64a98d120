//! Development and test implementations of the ports.
//!
//! Production adapters (a real broker client, a durable store) live in their
//! own crates; the core only ships what tests and the demo CLI need.

pub mod inmem_transport;

pub use inmem_transport::{InMemoryTransport, WorkerScript};
