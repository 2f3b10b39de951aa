use thiserror::Error;

#[derive(Debug, Error)]
pub enum CommError {
    /// A `PARUNNER_*` variable is missing or malformed
    #[error("environment variable {var}: {reason}")]
    Environment { var: &'static str, reason: String },

    #[error("comm descriptor {fd} is not open; is the program running under parunner?")]
    DescriptorClosed { fd: i32 },

    #[error("node {target} out of range (nodes: {nodes})")]
    NodeOutOfRange { target: u32, nodes: u32 },

    #[error("message of {len} bytes exceeds the 8 MiB limit")]
    MessageTooLarge { len: usize },

    /// A `get_*` call asked for more bytes than the received message holds
    #[error("read of {wanted} bytes past the end of the message ({left} left)")]
    ReadPastEnd { wanted: usize, left: usize },

    #[error("no message has been received yet")]
    NothingReceived,

    #[error("router closed the comm channel")]
    ChannelClosed,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
