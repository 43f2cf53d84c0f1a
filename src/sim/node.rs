//! Heap node for the cost-ordered flood fills

use std::cmp::Ordering;

/// Entry in the expansion and dissipation priority queues.
///
/// Ordered by cost ascending with index as the tie-breaker, using the IEEE
/// total order so two peers always pop nodes in the same sequence. Heaps
/// are used without decrease-key: cells are re-pushed on improvement and
/// stale entries skipped on pop.
#[derive(Clone, Copy, Debug)]
pub struct VoxelNode {
    /// Flat linear index of the cell
    pub index: u32,
    /// Cell this node was relaxed from, if any
    pub parent: Option<u32>,
    /// Accumulated flood-fill cost at push time
    pub cost: f32,
}

impl Ord for VoxelNode {
    fn cmp(&self, other: &Self) -> Ordering {
        self.cost
            .total_cmp(&other.cost)
            .then_with(|| self.index.cmp(&other.index))
    }
}

impl PartialOrd for VoxelNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for VoxelNode {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for VoxelNode {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cmp::Reverse;
    use std::collections::BinaryHeap;

    fn node(index: u32, cost: f32) -> VoxelNode {
        VoxelNode { index, parent: None, cost }
    }

    #[test]
    fn test_ordered_by_cost() {
        assert!(node(5, 1.0) < node(0, 2.0));
        assert!(node(0, 3.0) > node(9, 2.0));
    }

    #[test]
    fn test_ties_break_by_index() {
        assert!(node(1, 2.0) < node(2, 2.0));
        assert_eq!(node(3, 2.0), node(3, 2.0));
    }

    #[test]
    fn test_min_heap_pop_order() {
        let mut heap = BinaryHeap::new();
        for n in [node(4, 3.0), node(2, 1.0), node(1, 1.0), node(3, 2.0)] {
            heap.push(Reverse(n));
        }
        let order: Vec<u32> = std::iter::from_fn(|| heap.pop().map(|Reverse(n)| n.index)).collect();
        assert_eq!(order, vec![1, 2, 3, 4]);
    }
}
