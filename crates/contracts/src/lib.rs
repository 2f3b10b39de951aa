//! # Contracts
//!
//! Frozen interface contracts shared by every parunner crate: instance
//! identities, messages, run configuration, run results and the error
//! taxonomy. Business crates depend on this crate only; reverse dependencies
//! are prohibited.
//!
//! ## Execution model
//! - N copies of one program run as instances `0..N`
//! - each instance owns a private comm channel (see [`protocol`])
//! - at most one instance may write the contest-visible output

mod error;
mod instance;
mod message;
mod process;
pub mod protocol;
mod run;

pub use error::*;
pub use instance::*;
pub use message::*;
pub use process::{InstanceProcess, LocalInstanceProcess};
pub use run::*;
