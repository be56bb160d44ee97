//! `steps` crate — the [`Step`] contract, step results, and built-in steps.
//!
//! Every step run by the scheduler implements [`Step`]. Steps report their
//! own status through [`StepResult`]; the scheduler only reads it.

pub mod error;
pub mod jobs;
pub mod mock;
pub mod result;
pub mod shell;
pub mod traits;

pub use error::StepError;
pub use jobs::builtin_jobs;
pub use result::{StepResult, StepStatus};
pub use shell::{ShellOutput, ShellStep};
pub use traits::Step;
