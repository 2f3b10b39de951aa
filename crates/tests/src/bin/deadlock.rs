//! Every instance waits for its successor, which never sends.

use comm::{CommError, Node};

fn main() -> Result<(), CommError> {
    let mut node = Node::from_env()?;
    let next = (node.node_id() + 1) % node.number_of_nodes();
    node.receive(Some(next))?;
    Ok(())
}
