//! Instance side of the comm channel: framed sends on fd 4, deliveries on fd 3.

use std::env;
use std::fs::File;
use std::io::{self, BufReader, Read, Write};
use std::os::fd::FromRawFd;

use contracts::protocol::{
    decode_delivery_header, encode_receive, encode_send_header, COMM_RX_FD, COMM_TX_FD,
    DELIVERY_HEADER_LEN, ENV_COMM_RX_FD, ENV_COMM_TX_FD, ENV_NODES, ENV_NODE_ID,
    MAX_PAYLOAD_LEN, SEND_HEADER_LEN,
};
use tracing::trace;

use crate::CommError;

/// The last message handed out by [`Node::receive`]
#[derive(Debug, Default)]
struct Received {
    from: Option<u32>,
    payload: Vec<u8>,
    pos: usize,
}

/// One instance's end of the comm channel
///
/// Outgoing data is staged per target with the `put_*` calls and leaves as
/// one message on [`Node::send`]. Incoming data is read with the `get_*`
/// calls from the message returned by the latest [`Node::receive`].
#[derive(Debug)]
pub struct Node<R = File, W = File> {
    id: u32,
    nodes: u32,
    rx: BufReader<R>,
    tx: W,
    outgoing: Vec<Vec<u8>>,
    received: Received,
}

impl Node {
    /// Connect through the descriptors and identity exported by parunner
    pub fn from_env() -> Result<Self, CommError> {
        let nodes: u32 = required_var(ENV_NODES)?;
        let id: u32 = required_var(ENV_NODE_ID)?;
        if nodes == 0 {
            return Err(CommError::Environment {
                var: ENV_NODES,
                reason: "must be at least 1".into(),
            });
        }
        if id >= nodes {
            return Err(CommError::Environment {
                var: ENV_NODE_ID,
                reason: format!("{id} is not below {nodes}"),
            });
        }

        let rx_fd = optional_var(ENV_COMM_RX_FD)?.unwrap_or(COMM_RX_FD);
        let tx_fd = optional_var(ENV_COMM_TX_FD)?.unwrap_or(COMM_TX_FD);
        ensure_open(rx_fd)?;
        ensure_open(tx_fd)?;

        // SAFETY: both descriptors are open and were inherited for exclusive
        // use by this node; nothing else in the process owns them.
        let (rx, tx) = unsafe { (File::from_raw_fd(rx_fd), File::from_raw_fd(tx_fd)) };
        Ok(Node::with_channels(id, nodes, rx, tx))
    }
}

impl<R: Read, W: Write> Node<R, W> {
    /// Build a node over arbitrary channels
    pub fn with_channels(id: u32, nodes: u32, rx: R, tx: W) -> Self {
        Self {
            id,
            nodes,
            rx: BufReader::new(rx),
            tx,
            outgoing: vec![Vec::new(); nodes as usize],
            received: Received::default(),
        }
    }

    pub fn node_id(&self) -> u32 {
        self.id
    }

    pub fn number_of_nodes(&self) -> u32 {
        self.nodes
    }

    pub fn put_char(&mut self, target: u32, value: u8) -> Result<(), CommError> {
        self.put_bytes(target, &[value])
    }

    pub fn put_int(&mut self, target: u32, value: i32) -> Result<(), CommError> {
        self.put_bytes(target, &value.to_be_bytes())
    }

    pub fn put_ll(&mut self, target: u32, value: i64) -> Result<(), CommError> {
        self.put_bytes(target, &value.to_be_bytes())
    }

    pub fn put_bytes(&mut self, target: u32, bytes: &[u8]) -> Result<(), CommError> {
        let buffer = self.outgoing_mut(target)?;
        if buffer.len() + bytes.len() > MAX_PAYLOAD_LEN {
            return Err(CommError::MessageTooLarge {
                len: buffer.len() + bytes.len(),
            });
        }
        buffer.extend_from_slice(bytes);
        Ok(())
    }

    /// Send everything staged for `target` as one message
    ///
    /// Sending with nothing staged delivers an empty message.
    pub fn send(&mut self, target: u32) -> Result<(), CommError> {
        let payload = std::mem::take(self.outgoing_mut(target)?);

        let mut frame = Vec::with_capacity(payload.len() + SEND_HEADER_LEN);
        frame.extend_from_slice(&encode_send_header(target, payload.len()));
        frame.extend_from_slice(&payload);
        self.tx.write_all(&frame)?;
        self.tx.flush()?;

        trace!(from = self.id, to = target, bytes = payload.len(), "sent");
        Ok(())
    }

    /// Block until a message arrives, from `source` or from anyone
    ///
    /// Returns the sender. Unread data of the previous message is dropped.
    pub fn receive(&mut self, source: Option<u32>) -> Result<u32, CommError> {
        if let Some(source) = source {
            self.check_node(source)?;
        }
        self.tx.write_all(&encode_receive(source))?;
        self.tx.flush()?;

        let mut header = [0u8; DELIVERY_HEADER_LEN];
        read_frame_part(&mut self.rx, &mut header)?;
        let (from, len) = decode_delivery_header(&header);
        if len > MAX_PAYLOAD_LEN {
            return Err(CommError::MessageTooLarge { len });
        }

        let mut payload = vec![0u8; len];
        read_frame_part(&mut self.rx, &mut payload)?;
        self.received = Received {
            from: Some(from),
            payload,
            pos: 0,
        };

        trace!(node = self.id, from, bytes = len, "received");
        Ok(from)
    }

    /// Unread bytes left in the current message
    pub fn remaining(&self) -> usize {
        self.received.payload.len() - self.received.pos
    }

    pub fn get_char(&mut self) -> Result<u8, CommError> {
        Ok(self.take(1)?[0])
    }

    pub fn get_int(&mut self) -> Result<i32, CommError> {
        let mut raw = [0u8; 4];
        raw.copy_from_slice(self.take(4)?);
        Ok(i32::from_be_bytes(raw))
    }

    pub fn get_ll(&mut self) -> Result<i64, CommError> {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(self.take(8)?);
        Ok(i64::from_be_bytes(raw))
    }

    pub fn get_bytes(&mut self, len: usize) -> Result<Vec<u8>, CommError> {
        Ok(self.take(len)?.to_vec())
    }

    /// Give back the underlying channels
    pub fn into_channels(self) -> (R, W) {
        (self.rx.into_inner(), self.tx)
    }

    fn take(&mut self, wanted: usize) -> Result<&[u8], CommError> {
        if self.received.from.is_none() {
            return Err(CommError::NothingReceived);
        }
        let left = self.remaining();
        if wanted > left {
            return Err(CommError::ReadPastEnd { wanted, left });
        }
        let start = self.received.pos;
        self.received.pos += wanted;
        Ok(&self.received.payload[start..start + wanted])
    }

    fn check_node(&self, target: u32) -> Result<(), CommError> {
        if target >= self.nodes {
            return Err(CommError::NodeOutOfRange {
                target,
                nodes: self.nodes,
            });
        }
        Ok(())
    }

    fn outgoing_mut(&mut self, target: u32) -> Result<&mut Vec<u8>, CommError> {
        self.check_node(target)?;
        Ok(&mut self.outgoing[target as usize])
    }
}

fn read_frame_part<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<(), CommError> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Err(CommError::ChannelClosed),
        Err(e) => Err(CommError::Io(e)),
    }
}

fn required_var<T>(var: &'static str) -> Result<T, CommError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    optional_var(var)?.ok_or_else(|| CommError::Environment {
        var,
        reason: "not set".into(),
    })
}

fn optional_var<T>(var: &'static str) -> Result<Option<T>, CommError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(var) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e: T::Err| CommError::Environment {
                var,
                reason: format!("'{raw}': {e}"),
            }),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(e) => Err(CommError::Environment {
            var,
            reason: e.to_string(),
        }),
    }
}

fn ensure_open(fd: i32) -> Result<(), CommError> {
    // SAFETY: F_GETFD only inspects the descriptor table
    if unsafe { libc::fcntl(fd, libc::F_GETFD) } < 0 {
        return Err(CommError::DescriptorClosed { fd });
    }
    Ok(())
}
