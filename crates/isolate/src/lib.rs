//! `isolate` crate — run a unit of work in a separate worker process.
//!
//! The caller side ([`IsolatedExecutor`]) spawns a worker through a
//! [`WorkerLauncher`], waits on the worker's stdout for one
//! [`WorkerEnvelope`], retries with a doubling timeout, and always kills the
//! worker before returning. The worker side ([`worker::serve`]) looks the job
//! up in a [`JobRegistry`] and writes the envelope.

pub mod envelope;
pub mod error;
pub mod executor;
pub mod job;
pub mod launcher;
pub mod worker;

pub use envelope::{WorkerEnvelope, ENVELOPE_PREFIX};
pub use error::IsolationError;
pub use executor::IsolatedExecutor;
pub use job::{IsolatedJob, IsolationConfig};
pub use launcher::{SelfExecLauncher, WorkerLauncher};
pub use worker::{JobFn, JobRegistry};
