//! Recursive partitioning tree over connection bounding boxes.
//!
//! Each tree node picks the cutline that best balances the connections
//! reaching into either half, then splits them three ways: fully left,
//! fully right, and straddling (middle). Leaves are scheduled into levels
//! such that two leaves on the same level never have strictly intersecting
//! bounding boxes; all leaves of a level can then route in parallel with
//! unsynchronized commits, since the node sets their searches can touch are
//! disjoint.
//!
//! Tree nodes live in an arena and refer to each other by index.

use potter_common::BBox;
use potter_netlist::{ConnId, Connection};
use serde::{Deserialize, Serialize};

/// A cutline axis.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum Axis {
    /// Vertical cutline (splits along x).
    X,
    /// Horizontal cutline (splits along y).
    Y,
}

/// One node of the partitioning tree.
#[derive(Clone, Debug)]
pub struct TreeNode {
    /// Connections assigned to this node (for leaves, the routing unit).
    pub conn_ids: Vec<ConnId>,
    /// Covered region; for middle nodes, the union of member boxes.
    pub bbox: BBox,
    /// Depth in the tree.
    pub level: u32,
    /// Cutline chosen at this node, if it has children.
    pub cutline: Option<(Axis, i32)>,
    left: Option<usize>,
    right: Option<usize>,
    middle: Option<usize>,
}

impl TreeNode {
    fn leaf(conn_ids: Vec<ConnId>, bbox: BBox, level: u32) -> Self {
        Self {
            conn_ids,
            bbox,
            level,
            cutline: None,
            left: None,
            right: None,
            middle: None,
        }
    }

    /// Whether the node has no children.
    pub fn is_leaf(&self) -> bool {
        self.left.is_none()
    }
}

/// The recursive partitioning tree plus its leaf schedule.
pub struct PartitionTree {
    nodes: Vec<TreeNode>,
    root: usize,
    scheduled_levels: Vec<Vec<usize>>,
}

impl PartitionTree {
    /// Builds the tree over the given connections and schedules its leaves.
    pub fn build(conns: &[Connection], conn_ids: Vec<ConnId>, bbox: BBox) -> Self {
        let mut nodes = Vec::new();
        nodes.push(TreeNode::leaf(conn_ids, bbox, 0));
        let mut tree = Self {
            nodes,
            root: 0,
            scheduled_levels: Vec::new(),
        };
        tree.split(0, conns);
        tree.schedule();
        tree
    }

    /// The arena node at `idx`.
    pub fn node(&self, idx: usize) -> &TreeNode {
        &self.nodes[idx]
    }

    /// The root node index.
    pub fn root(&self) -> usize {
        self.root
    }

    /// Leaf indices grouped into conflict-free levels.
    pub fn scheduled_levels(&self) -> &[Vec<usize>] {
        &self.scheduled_levels
    }

    /// Number of scheduled levels.
    pub fn num_scheduled_levels(&self) -> usize {
        self.scheduled_levels.len()
    }

    fn split(&mut self, idx: usize, conns: &[Connection]) {
        let Some((axis, pos)) = self.find_cutline(idx, conns) else {
            return;
        };

        let (parent_bbox, level, conn_ids) = {
            let node = &mut self.nodes[idx];
            node.cutline = Some((axis, pos));
            (node.bbox, node.level, std::mem::take(&mut node.conn_ids))
        };

        let mut left_ids = Vec::new();
        let mut right_ids = Vec::new();
        let mut middle_ids = Vec::new();
        let mut middle_bbox = BBox::empty();
        for conn_id in &conn_ids {
            let cb = conns[conn_id.index()].bbox();
            let (lo, hi) = match axis {
                Axis::X => (cb.x_min, cb.x_max),
                Axis::Y => (cb.y_min, cb.y_max),
            };
            if hi <= pos {
                left_ids.push(*conn_id);
            } else if lo >= pos {
                right_ids.push(*conn_id);
            } else {
                middle_ids.push(*conn_id);
                middle_bbox.update(cb.x_min, cb.y_min);
                middle_bbox.update(cb.x_max, cb.y_max);
            }
        }
        self.nodes[idx].conn_ids = conn_ids;

        let (left_bbox, right_bbox) = match axis {
            Axis::X => (
                BBox::new(parent_bbox.x_min, parent_bbox.y_min, pos, parent_bbox.y_max),
                BBox::new(pos, parent_bbox.y_min, parent_bbox.x_max, parent_bbox.y_max),
            ),
            Axis::Y => (
                BBox::new(parent_bbox.x_min, parent_bbox.y_min, parent_bbox.x_max, pos),
                BBox::new(parent_bbox.x_min, pos, parent_bbox.x_max, parent_bbox.y_max),
            ),
        };

        let left = self.push_child(left_ids, left_bbox, level + 1);
        let right = self.push_child(right_ids, right_bbox, level + 1);
        let middle = self.push_child(middle_ids, middle_bbox, level + 1);
        {
            let node = &mut self.nodes[idx];
            node.left = Some(left);
            node.right = Some(right);
            node.middle = Some(middle);
        }
        self.split(left, conns);
        self.split(right, conns);
        self.split(middle, conns);
    }

    fn push_child(&mut self, conn_ids: Vec<ConnId>, bbox: BBox, level: u32) -> usize {
        self.nodes.push(TreeNode::leaf(conn_ids, bbox, level));
        self.nodes.len() - 1
    }

    /// Picks the axis and position minimizing the normalized imbalance
    /// between connections reaching into either half.
    ///
    /// Returns `None` when every cutline would leave one side empty.
    fn find_cutline(&self, idx: usize, conns: &[Connection]) -> Option<(Axis, i32)> {
        let node = &self.nodes[idx];
        if node.conn_ids.len() <= 1 || !node.bbox.is_valid() {
            return None;
        }
        let bbox = node.bbox;
        let mut best: Option<(Axis, i32)> = None;
        let mut best_score = f64::INFINITY;

        let mut consider = |axis: Axis, best: &mut Option<(Axis, i32)>| {
            let (lo, extent) = match axis {
                Axis::X => (bbox.x_min, bbox.width()),
                Axis::Y => (bbox.y_min, bbox.height()),
            };
            if extent < 2 {
                return;
            }
            let slots = (extent - 1) as usize;
            let mut before = vec![0i64; slots];
            let mut after = vec![0i64; slots];
            for conn_id in &node.conn_ids {
                let cb = conns[conn_id.index()].bbox();
                let (c_lo, c_hi) = match axis {
                    Axis::X => (cb.x_min, cb.x_max),
                    Axis::Y => (cb.y_min, cb.y_max),
                };
                let start = (c_lo.max(lo) - lo).max(0) as usize;
                let end = ((c_hi.min(lo + extent - 1) - lo).max(0) as usize).min(slots);
                for slot in before.iter_mut().take(slots).skip(start) {
                    *slot += 1;
                }
                for slot in after.iter_mut().take(end) {
                    *slot += 1;
                }
            }
            let max_before = before[slots - 1];
            let max_after = after[0];
            for x in 0..slots {
                // Cutting here would leave one side empty.
                if before[x] == max_before || after[x] == max_after {
                    continue;
                }
                let score =
                    (before[x] - after[x]).abs() as f64 / before[x].max(after[x]) as f64;
                if score < best_score {
                    best_score = score;
                    *best = Some((axis, lo + x as i32));
                }
            }
        };

        consider(Axis::X, &mut best);
        consider(Axis::Y, &mut best);
        best
    }

    /// Assigns every non-empty leaf to the first level where its bounding
    /// box strictly intersects no already-scheduled leaf.
    ///
    /// Leaves are offered in order of decreasing connection count.
    fn schedule(&mut self) {
        let mut leaves: Vec<usize> = (0..self.nodes.len())
            .filter(|&i| self.nodes[i].is_leaf() && !self.nodes[i].conn_ids.is_empty())
            .collect();
        let total: usize = leaves.iter().map(|&i| self.nodes[i].conn_ids.len()).sum();
        assert_eq!(
            total,
            self.nodes[self.root].conn_ids.len(),
            "leaves must partition the root's connections"
        );

        leaves.sort_by(|&a, &b| {
            self.nodes[b]
                .conn_ids
                .len()
                .cmp(&self.nodes[a].conn_ids.len())
        });

        let mut levels: Vec<Vec<usize>> = Vec::new();
        for leaf in leaves {
            let bbox = self.nodes[leaf].bbox;
            let slot = levels.iter_mut().find(|level| {
                level
                    .iter()
                    .all(|&other| !bbox.strictly_intersects(&self.nodes[other].bbox))
            });
            match slot {
                Some(level) => level.push(leaf),
                None => levels.push(vec![leaf]),
            }
        }
        self.scheduled_levels = levels;
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use potter_netlist::NetId;
    use potter_device::NodeId;

    fn conn(id: u32, bbox: BBox) -> Connection {
        Connection::new(
            ConnId::from_raw(id),
            NetId::from_raw(0),
            NodeId::from_raw(0),
            NodeId::from_raw(1),
            bbox,
        )
    }

    fn all_ids(n: u32) -> Vec<ConnId> {
        (0..n).map(ConnId::from_raw).collect()
    }

    #[test]
    fn single_connection_stays_at_root() {
        let conns = vec![conn(0, BBox::new(0, 0, 2, 2))];
        let tree = PartitionTree::build(&conns, all_ids(1), BBox::new(0, 0, 10, 10));
        assert!(tree.node(tree.root()).is_leaf());
        assert_eq!(tree.num_scheduled_levels(), 1);
    }

    #[test]
    fn disjoint_halves_split_and_share_a_level() {
        let conns = vec![
            conn(0, BBox::new(0, 0, 2, 10)),
            conn(1, BBox::new(0, 0, 2, 10)),
            conn(2, BBox::new(8, 0, 10, 10)),
            conn(3, BBox::new(8, 0, 10, 10)),
        ];
        let tree = PartitionTree::build(&conns, all_ids(4), BBox::new(0, 0, 10, 10));
        let root = tree.node(tree.root());
        assert!(!root.is_leaf());

        // Every connection ends up in exactly one scheduled leaf.
        let mut seen: Vec<u32> = tree
            .scheduled_levels()
            .iter()
            .flatten()
            .flat_map(|&leaf| tree.node(leaf).conn_ids.iter().map(|c| c.as_raw()))
            .collect();
        seen.sort_unstable();
        assert_eq!(seen, vec![0, 1, 2, 3]);

        // The two leaves do not strictly intersect, so one level suffices.
        assert_eq!(tree.num_scheduled_levels(), 1);
    }

    #[test]
    fn scheduled_levels_are_conflict_free() {
        let conns = vec![
            conn(0, BBox::new(0, 0, 4, 4)),
            conn(1, BBox::new(3, 3, 7, 7)),
            conn(2, BBox::new(6, 6, 10, 10)),
            conn(3, BBox::new(0, 6, 4, 10)),
            conn(4, BBox::new(6, 0, 10, 4)),
        ];
        let tree = PartitionTree::build(&conns, all_ids(5), BBox::new(0, 0, 10, 10));
        for level in tree.scheduled_levels() {
            for (i, &a) in level.iter().enumerate() {
                for &b in &level[i + 1..] {
                    assert!(
                        !tree
                            .node(a)
                            .bbox
                            .strictly_intersects(&tree.node(b).bbox),
                        "leaves {a} and {b} conflict on one level"
                    );
                }
            }
        }
    }

    #[test]
    fn identical_boxes_cannot_split() {
        let conns = vec![
            conn(0, BBox::new(2, 2, 8, 8)),
            conn(1, BBox::new(2, 2, 8, 8)),
            conn(2, BBox::new(2, 2, 8, 8)),
        ];
        let tree = PartitionTree::build(&conns, all_ids(3), BBox::new(0, 0, 10, 10));
        assert!(tree.node(tree.root()).is_leaf());
        assert_eq!(tree.node(tree.root()).conn_ids.len(), 3);
    }
}
