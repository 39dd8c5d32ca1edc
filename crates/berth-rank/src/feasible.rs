//! Raw node sources.
//!
//! Candidate nodes arrive already filtered for hard constraints (drivers,
//! attributes, datacenters). A [`FeasibleIterator`] replays them into the
//! ranking stages.

use std::sync::Arc;

use berth_state::Node;

/// Pull-based stream of candidate nodes.
pub trait FeasibleIterator {
    /// Next node, or `None` once the stream is exhausted.
    fn next(&mut self) -> Option<Arc<Node>>;

    /// Rewind to the start of the stream.
    fn reset(&mut self);
}

impl<T: FeasibleIterator + ?Sized> FeasibleIterator for Box<T> {
    fn next(&mut self) -> Option<Arc<Node>> {
        (**self).next()
    }

    fn reset(&mut self) {
        (**self).reset()
    }
}

/// Replays a fixed list of nodes in order.
#[derive(Debug, Clone, Default)]
pub struct StaticIterator {
    nodes: Vec<Arc<Node>>,
    offset: usize,
}

impl StaticIterator {
    pub fn new(nodes: Vec<Arc<Node>>) -> Self {
        Self { nodes, offset: 0 }
    }

    /// Replace the node list and rewind.
    pub fn set_nodes(&mut self, nodes: Vec<Arc<Node>>) {
        self.nodes = nodes;
        self.offset = 0;
    }
}

impl FeasibleIterator for StaticIterator {
    fn next(&mut self) -> Option<Arc<Node>> {
        let node = self.nodes.get(self.offset)?;
        self.offset += 1;
        Some(Arc::clone(node))
    }

    fn reset(&mut self) {
        self.offset = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nodes(n: usize) -> Vec<Arc<Node>> {
        (0..n)
            .map(|i| {
                Arc::new(Node {
                    id: format!("node-{i}"),
                    ..Default::default()
                })
            })
            .collect()
    }

    #[test]
    fn replays_in_order_then_stays_exhausted() {
        let mut iter = StaticIterator::new(nodes(3));

        let ids: Vec<String> = std::iter::from_fn(|| iter.next())
            .map(|n| n.id.clone())
            .collect();
        assert_eq!(ids, vec!["node-0", "node-1", "node-2"]);

        for _ in 0..10 {
            assert!(iter.next().is_none());
        }
    }

    #[test]
    fn reset_rewinds() {
        let mut iter = StaticIterator::new(nodes(2));
        while iter.next().is_some() {}

        iter.reset();
        assert_eq!(iter.next().unwrap().id, "node-0");
    }

    #[test]
    fn set_nodes_replaces_and_rewinds() {
        let mut iter: Box<dyn FeasibleIterator> = Box::new(StaticIterator::new(nodes(1)));
        assert!(iter.next().is_some());
        assert!(iter.next().is_none());

        let mut inner = StaticIterator::default();
        assert!(inner.next().is_none());
        inner.set_nodes(nodes(2));
        assert_eq!(inner.next().unwrap().id, "node-0");
    }
}
