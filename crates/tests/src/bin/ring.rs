//! Passes a counter once around the ring; instance 0 prints the final value.

use comm::{CommError, Node};

fn main() -> Result<(), CommError> {
    let mut node = Node::from_env()?;
    let id = node.node_id();
    let nodes = node.number_of_nodes();
    if nodes == 1 {
        println!("1");
        return Ok(());
    }

    let next = (id + 1) % nodes;
    let prev = (id + nodes - 1) % nodes;
    if id == 0 {
        node.put_ll(next, 1)?;
        node.send(next)?;
        node.receive(Some(prev))?;
        println!("{}", node.get_ll()?);
    } else {
        node.receive(Some(prev))?;
        let value = node.get_ll()?;
        node.put_ll(next, value + 1)?;
        node.send(next)?;
    }
    Ok(())
}
