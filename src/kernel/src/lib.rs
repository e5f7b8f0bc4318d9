//! Kestrel Kernel
//!
//! Task scheduling and synchronization core of a small cooperative kernel.
//!
//! # Architecture
//!
//! - `task`: task arena, wait queues, the [`Scheduler`](task::Scheduler)
//!   context and the [`Executor`](task::Executor) that drives task bodies
//! - `sync`: counting semaphores and condition variables
//!
//! # Safety
//!
//! This is a `#![no_std]` kernel library. It contains no `unsafe` code;
//! shared state is guarded by spin locks.

#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

extern crate alloc;

pub mod sync;
pub mod task;

pub use kestrel_common::KernelError;
