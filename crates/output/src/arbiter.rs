//! OutputArbiter - single-writer ownership of the contest output
//!
//! The owner slot, the ownership decision and the forward to the visible
//! stream all happen under one lock, so two instances racing for their first
//! write can never both win and the owner's chunks keep their issue order.

use std::sync::{Arc, Mutex};

use bytes::Bytes;
use contracts::InstanceId;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{info, warn};

use crate::error::OutputError;
use crate::mux::MuxWriter;

struct ArbiterState {
    owner: Option<InstanceId>,
    sink: MuxWriter,
}

/// Grants exclusive ownership of the visible result stream
#[derive(Clone)]
pub struct OutputArbiter {
    state: Arc<Mutex<ArbiterState>>,
}

impl OutputArbiter {
    pub fn new(sink: MuxWriter) -> Self {
        Self {
            state: Arc::new(Mutex::new(ArbiterState { owner: None, sink })),
        }
    }

    /// Sink bound to one instance
    pub fn writer_for(&self, instance: InstanceId) -> ContestWriter {
        ContestWriter {
            instance,
            arbiter: self.clone(),
        }
    }

    /// Current owner, if any instance has written yet
    pub fn owner(&self) -> Option<InstanceId> {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).owner
    }

    fn write(&self, instance: InstanceId, data: &[u8]) -> Result<(), OutputError> {
        if data.is_empty() {
            return Ok(());
        }

        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        match state.owner {
            None => {
                info!(instance, "Instance took ownership of the contest output");
                state.owner = Some(instance);
            }
            Some(owner) if owner != instance => {
                warn!(instance, owner, "Second instance wrote to the contest output");
                return Err(OutputError::Conflict { instance, owner });
            }
            Some(_) => {}
        }
        state.sink.send(Bytes::copy_from_slice(data))?;
        Ok(())
    }
}

/// Contest output sink bound to one instance
#[derive(Clone)]
pub struct ContestWriter {
    instance: InstanceId,
    arbiter: OutputArbiter,
}

impl ContestWriter {
    pub fn instance(&self) -> InstanceId {
        self.instance
    }

    /// Forward `data` if this instance owns (or now takes) the output
    ///
    /// # Errors
    /// [`OutputError::Conflict`] naming this instance if another one owns it
    pub fn write(&self, data: &[u8]) -> Result<(), OutputError> {
        self.arbiter.write(self.instance, data)
    }
}

/// Pump an instance's stdout through its contest writer until end-of-stream
pub async fn copy_to_contest<R>(mut reader: R, writer: &ContestWriter) -> Result<u64, OutputError>
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; 8192];
    let mut total = 0u64;
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            return Ok(total);
        }
        writer.write(&buf[..n])?;
        total += n as u64;
    }
}
