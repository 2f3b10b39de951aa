//! Every instance but 0 sends its id to instance 0, which never receives.

use comm::{CommError, Node};

fn main() -> Result<(), CommError> {
    let mut node = Node::from_env()?;
    let id = node.node_id();
    if id != 0 {
        node.put_int(0, id as i32)?;
        node.send(0)?;
    }
    Ok(())
}
