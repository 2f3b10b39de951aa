//! # Router
//!
//! Runs the instances of one program and carries their messages.
//!
//! Responsibilities:
//! - spawn processes with a private comm channel on fds 3 and 4
//! - decode outbound frames and route sends to per-destination mailboxes
//! - answer receive requests, tracking running and blocked time
//! - detect runs where every live instance waits forever
//! - collect per-instance stats and unreceived messages

mod clock;
mod codec;
mod mailbox;
mod process;
mod progress;
mod router;
mod signal;

pub use clock::InstanceClock;
pub use codec::{write_delivery, CodecError, Frame, FrameDecoder};
pub use mailbox::{Mailbox, Source};
pub use process::{ChildProcess, CommEndpoint, SpawnedInstance, TaskProcess};
pub use router::{InstanceRouter, RouterConfig};
pub use signal::{CompletionCounter, ShutdownListener, ShutdownSignal};
