//! InstanceProcess trait - the router's view of a running instance
//!
//! Real runs use an OS child process; tests and in-process simulations
//! implement the same trait over a task handle.

use crate::InstanceExit;

/// Running instance process
///
/// The router owns it until it exits; `wait` is polled by exactly one task.
#[trait_variant::make(InstanceProcess: Send)]
pub trait LocalInstanceProcess {
    /// OS process ID, if the instance is backed by one
    fn pid(&self) -> Option<u32>;

    /// Wait for the process to exit
    ///
    /// # Errors
    /// Returns the OS error if the exit status cannot be collected
    async fn wait(&mut self) -> std::io::Result<InstanceExit>;

    /// Request termination without waiting for it
    ///
    /// Idempotent: killing an exited process is not an error.
    fn start_kill(&mut self) -> std::io::Result<()>;
}
