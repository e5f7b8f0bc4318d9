//! Vocabulary shared by the Kestrel kernel and anything that talks to it.
//!
//! Nothing in here depends on the scheduler or on hardware, so the types can
//! be used from host tooling as well (enable the `serde` feature to get
//! `Serialize`/`Deserialize` on all of them).

#![no_std]
#![warn(missing_docs)]

pub mod error;
pub mod task;

pub use error::KernelError;
pub use task::{Priority, QueuePolicy, TaskId, TaskState};
