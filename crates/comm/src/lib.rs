//! # Comm
//!
//! Instance-side client for the parunner comm channel. Programs run under
//! `parunner` link this crate to exchange messages with their peers:
//!
//! ```no_run
//! use comm::Node;
//!
//! let mut node = Node::from_env()?;
//! if node.node_id() == 0 {
//!     for peer in 1..node.number_of_nodes() {
//!         node.put_int(peer, 42)?;
//!         node.send(peer)?;
//!     }
//! } else {
//!     node.receive(Some(0))?;
//!     let value = node.get_int()?;
//!     assert_eq!(value, 42);
//! }
//! # Ok::<(), comm::CommError>(())
//! ```
//!
//! All calls block. A node is not meant to be shared between threads.

mod error;
mod node;

pub use error::CommError;
pub use node::Node;
