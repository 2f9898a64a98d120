//! Ports: the abstraction seams of the core.
//!
//! External collaborators (broker transport, persistence, time, ID
//! generation) are reached only through these traits, so every component can
//! be exercised in isolation with fakes.

pub mod clock;
pub mod id_generator;
pub mod task_store;
pub mod transport;

pub use clock::{Clock, FixedClock, SystemClock};
pub use id_generator::{IdGenerator, UlidGenerator};
pub use task_store::{Pagination, TaskFilter, TaskPage, TaskStore};
pub use transport::{RemoteState, RevokeAck, Transport, WorkerInfo};
