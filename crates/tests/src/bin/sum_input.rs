//! Every instance sums its share of the numbers on stdin; instance 0 adds
//! up the partial sums and prints the total.

use std::io::Read;

use comm::{CommError, Node};

fn main() -> Result<(), CommError> {
    let mut node = Node::from_env()?;
    let id = node.node_id() as usize;
    let nodes = node.number_of_nodes();

    let mut input = String::new();
    std::io::stdin().read_to_string(&mut input)?;
    let partial: i64 = input
        .split_whitespace()
        .filter_map(|token| token.parse::<i64>().ok())
        .enumerate()
        .filter(|(i, _)| i % nodes as usize == id)
        .map(|(_, value)| value)
        .sum();

    if id != 0 {
        node.put_ll(0, partial)?;
        node.send(0)?;
        return Ok(());
    }

    let mut total = partial;
    for _ in 1..nodes {
        node.receive(None)?;
        total += node.get_ll()?;
    }
    println!("{total}");
    Ok(())
}
