//! Comm channel wire protocol
//!
//! Every instance gets two private pipes besides stdin/stdout/stderr:
//!
//! ```text
//!   instance fd 4 ──▶ router   outbound:  'S' u32 to  u32 len  payload
//!                                         'R' i32 source (-1 = any)
//!   instance fd 3 ◀── router   inbound:   u32 from  u32 len  payload
//! ```
//!
//! All integers are big-endian. One inbound frame answers one `'R'` request.

use crate::InstanceId;

/// Upper bound for `-n`
pub const MAX_INSTANCES: usize = 100;

/// Largest payload accepted in a single message (8 MiB)
pub const MAX_PAYLOAD_LEN: usize = 8 * 1024 * 1024;

/// Outbound tag: send a message
pub const TAG_SEND: u8 = b'S';

/// Outbound tag: request the next message
pub const TAG_RECEIVE: u8 = b'R';

/// Receive source meaning "from any instance"
pub const ANY_SOURCE: i32 = -1;

/// Descriptor the instance reads deliveries from
pub const COMM_RX_FD: i32 = 3;

/// Descriptor the instance writes frames to
pub const COMM_TX_FD: i32 = 4;

pub const ENV_NODE_ID: &str = "PARUNNER_NODE_ID";
pub const ENV_NODES: &str = "PARUNNER_NODES";
pub const ENV_COMM_RX_FD: &str = "PARUNNER_COMM_RX_FD";
pub const ENV_COMM_TX_FD: &str = "PARUNNER_COMM_TX_FD";

/// Header of a send frame: tag + destination + length
pub const SEND_HEADER_LEN: usize = 9;

/// Full receive request frame: tag + source
pub const RECEIVE_FRAME_LEN: usize = 5;

/// Header of a delivery frame: sender + length
pub const DELIVERY_HEADER_LEN: usize = 8;

/// Encode the header of a send frame
pub fn encode_send_header(to: InstanceId, len: usize) -> [u8; SEND_HEADER_LEN] {
    let mut header = [0u8; SEND_HEADER_LEN];
    header[0] = TAG_SEND;
    header[1..5].copy_from_slice(&to.to_be_bytes());
    header[5..9].copy_from_slice(&(len as u32).to_be_bytes());
    header
}

/// Encode a complete receive request
pub fn encode_receive(source: Option<InstanceId>) -> [u8; RECEIVE_FRAME_LEN] {
    let raw = source.map(|s| s as i32).unwrap_or(ANY_SOURCE);
    let mut frame = [0u8; RECEIVE_FRAME_LEN];
    frame[0] = TAG_RECEIVE;
    frame[1..5].copy_from_slice(&raw.to_be_bytes());
    frame
}

/// Encode the header of a delivery frame
pub fn encode_delivery_header(from: InstanceId, len: usize) -> [u8; DELIVERY_HEADER_LEN] {
    let mut header = [0u8; DELIVERY_HEADER_LEN];
    header[0..4].copy_from_slice(&from.to_be_bytes());
    header[4..8].copy_from_slice(&(len as u32).to_be_bytes());
    header
}

/// Decode a delivery header into `(from, len)`
pub fn decode_delivery_header(header: &[u8; DELIVERY_HEADER_LEN]) -> (InstanceId, usize) {
    let from = u32::from_be_bytes([header[0], header[1], header[2], header[3]]);
    let len = u32::from_be_bytes([header[4], header[5], header[6], header[7]]);
    (from, len as usize)
}
