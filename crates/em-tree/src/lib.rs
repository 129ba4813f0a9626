//! # em-tree
//!
//! The ordered tree representation shared by augmentation, the models, and
//! the MCEM driver.  A tree is a sequence of nodes sorted by branching time;
//! missing speciations and their extinctions form linked pairs, and every
//! node records the number of lineages alive in the half-open interval
//! ending at its time.

#![warn(missing_docs)]
#![forbid(unsafe_code)]

use em_core::{ensure, Real, Result, Time};

/// `t_ext` value marking a present-day tip.
pub const T_EXT_TIP: Real = 10e10;

/// `t_ext` value marking an extinction node.
pub const T_EXT_EXTINCT: Real = 0.0;

/// The three node kinds, distinguished solely by `t_ext`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// A species observed at the present.
    Tip,
    /// The death of an unobserved lineage.
    Extinction,
    /// A speciation whose descendant lineage went unobserved; `t_ext` holds
    /// the time that lineage dies out.
    MissingSpeciation,
}

/// A single tree node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Node {
    /// Branching time, measured from the root forward.
    pub brts: Time,
    /// Number of lineages alive in `[brts(prev), brts(this))`.
    pub n: Real,
    /// Extinction-time annotation; see [`NodeKind`].
    pub t_ext: Real,
    /// Phylogenetic diversity accumulated up to this node.
    pub pd: Real,
}

impl Node {
    /// A present-day tip.
    pub fn tip(brts: Time, n: Real) -> Self {
        Self { brts, n, t_ext: T_EXT_TIP, pd: 0.0 }
    }

    /// A missing speciation whose unobserved descendant dies at `t_ext`.
    pub fn missing(brts: Time, n: Real, t_ext: Time) -> Self {
        Self { brts, n, t_ext, pd: 0.0 }
    }

    /// An extinction node.
    pub fn extinction(brts: Time, n: Real) -> Self {
        Self { brts, n, t_ext: T_EXT_EXTINCT, pd: 0.0 }
    }

    /// Whether this node is a present-day tip.
    #[inline]
    pub fn is_tip(&self) -> bool {
        self.t_ext == T_EXT_TIP
    }

    /// Whether this node is an extinction.
    #[inline]
    pub fn is_extinction(&self) -> bool {
        self.t_ext == T_EXT_EXTINCT
    }

    /// Whether this node is a missing speciation.
    #[inline]
    pub fn is_missing(&self) -> bool {
        !(self.is_extinction() || self.is_tip())
    }

    /// The node kind.
    pub fn kind(&self) -> NodeKind {
        if self.is_tip() {
            NodeKind::Tip
        } else if self.is_extinction() {
            NodeKind::Extinction
        } else {
            NodeKind::MissingSpeciation
        }
    }

    /// The lineage count in effect just after this node.
    #[inline]
    pub fn n_after(&self) -> Real {
        if self.is_extinction() {
            self.n - 1.0
        } else {
            self.n + 1.0
        }
    }
}

/// An ordered sequence of nodes sorted by branching time.
#[derive(Debug, PartialEq, Default)]
pub struct Tree {
    nodes: Vec<Node>,
}

impl Clone for Tree {
    fn clone(&self) -> Self {
        Self { nodes: self.nodes.clone() }
    }

    fn clone_from(&mut self, source: &Self) {
        self.nodes.clone_from(&source.nodes);
    }
}

impl Tree {
    /// Build the initial tree from observed branching times.
    ///
    /// The input follows the reverse-age convention (oldest first); the
    /// cumulative-difference transform converts it to absolute times.  All
    /// nodes are tips and lineage counts run `soc, soc + 1, …`.
    pub fn from_branching_times(brts: &[Real], soc: Real) -> Result<Self> {
        ensure!(!brts.is_empty(), "branching times must not be empty");
        ensure!(
            brts.iter().all(|b| b.is_finite()),
            "branching times must be finite"
        );
        let mut times = brts.to_vec();
        let mut sum = 0.0;
        for i in 1..times.len() {
            sum += times[i - 1] - times[i];
            times[i - 1] = sum;
        }
        let last = times.len() - 1;
        times[last] += sum;
        let mut nodes: Vec<Node> = times
            .iter()
            .enumerate()
            .map(|(i, &t)| Node::tip(t, soc + i as Real))
            .collect();
        nodes.sort_by(|a, b| a.brts.total_cmp(&b.brts));
        Ok(Self { nodes })
    }

    /// Build a tree from pre-constructed nodes (assumed sorted by `brts`).
    pub fn from_nodes(nodes: Vec<Node>) -> Self {
        Self { nodes }
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the tree has no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The nodes as a slice.
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Iterator over nodes.
    pub fn iter(&self) -> std::slice::Iter<'_, Node> {
        self.nodes.iter()
    }

    /// The present time (branching time of the last node).
    pub fn present_time(&self) -> Time {
        self.nodes[self.nodes.len() - 1].brts
    }

    /// Branching time of the first node strictly later than `cbt`, or the
    /// present time if none.
    pub fn next_branching_time(&self, cbt: Time) -> Time {
        let i = self.nodes.partition_point(|nd| nd.brts <= cbt);
        if i < self.nodes.len() {
            self.nodes[i].brts
        } else {
            self.present_time()
        }
    }

    /// The node governing time `t`: the first node with `brts >= t`, clamped
    /// to the last node.
    pub fn node_at(&self, t: Time) -> &Node {
        let i = self.nodes.partition_point(|nd| nd.brts < t);
        &self.nodes[i.min(self.nodes.len() - 1)]
    }

    /// Reserve capacity for at least `additional` more nodes.
    pub fn reserve(&mut self, additional: usize) {
        self.nodes.reserve(additional);
    }

    /// Insert the linked pair of a missing speciation at `t_spec` and its
    /// extinction at `t_ext`, repairing lineage counts in between.
    pub fn insert_species(&mut self, t_spec: Time, t_ext: Time) {
        self.nodes.reserve(2);
        let first = self.nodes.partition_point(|nd| nd.brts < t_spec);
        let n = if first > 0 {
            self.nodes[first - 1].n_after()
        } else {
            self.nodes[0].n
        };
        self.nodes.insert(first, Node::missing(t_spec, n, t_ext));
        let mut i = first + 1;
        while i < self.nodes.len() && self.nodes[i].brts < t_ext {
            self.nodes[i].n = self.nodes[i - 1].n_after();
            i += 1;
        }
        let n_ext = self.nodes[i - 1].n_after();
        self.nodes.insert(i, Node::extinction(t_ext, n_ext));
    }

    /// Recompute the `pd` column in a single forward pass.
    ///
    /// Each missing speciation contributes the span since the previous
    /// missing speciation times the running lineage count.
    pub fn calculate_pd(&mut self) {
        let Some(front) = self.nodes.first() else {
            return;
        };
        let mut sum = 0.0;
        let mut brts0 = 0.0;
        let mut ni = front.n;
        for node in &mut self.nodes {
            if node.is_missing() {
                sum += (node.brts - brts0) * ni;
                ni += 1.0;
                brts0 = node.brts;
            }
            node.pd = sum;
        }
    }

    /// Phylogenetic diversity accumulated strictly before time `t`, computed
    /// by a fresh walk (valid even while the `pd` column is stale).
    pub fn pd_at(&self, t: Time) -> Real {
        let Some(front) = self.nodes.first() else {
            return 0.0;
        };
        let mut sum = 0.0;
        let mut brts0 = 0.0;
        let mut ni = front.n;
        for node in &self.nodes {
            if node.brts >= t {
                break;
            }
            if node.is_missing() {
                sum += (node.brts - brts0) * ni;
                ni += 1.0;
                brts0 = node.brts;
            }
        }
        sum
    }

    /// Number of missing-speciation nodes.
    pub fn num_missing(&self) -> usize {
        self.nodes.iter().filter(|nd| nd.is_missing()).count()
    }
}

impl std::ops::Index<usize> for Tree {
    type Output = Node;
    fn index(&self, i: usize) -> &Node {
        &self.nodes[i]
    }
}

impl<'a> IntoIterator for &'a Tree {
    type Item = &'a Node;
    type IntoIter = std::slice::Iter<'a, Node>;
    fn into_iter(self) -> Self::IntoIter {
        self.nodes.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn five_tip_tree() -> Tree {
        // reverse-age input [5, 4, 3, 2, 1] -> absolute times [1, 2, 3, 4, 5]
        Tree::from_branching_times(&[5.0, 4.0, 3.0, 2.0, 1.0], 2.0).unwrap()
    }

    #[test]
    fn reverse_age_conversion() {
        let tree = five_tip_tree();
        let times: Vec<Real> = tree.iter().map(|nd| nd.brts).collect();
        assert_eq!(times, vec![1.0, 2.0, 3.0, 4.0, 5.0]);
        let counts: Vec<Real> = tree.iter().map(|nd| nd.n).collect();
        assert_eq!(counts, vec![2.0, 3.0, 4.0, 5.0, 6.0]);
        assert!(tree.iter().all(|nd| nd.is_tip()));
        assert_eq!(tree.present_time(), 5.0);
    }

    #[test]
    fn single_branching_time() {
        let tree = Tree::from_branching_times(&[7.5], 1.0).unwrap();
        assert_eq!(tree.len(), 1);
        assert_eq!(tree[0].brts, 7.5);
        assert_eq!(tree[0].n, 1.0);
    }

    #[test]
    fn empty_input_is_rejected() {
        assert!(Tree::from_branching_times(&[], 2.0).is_err());
    }

    #[test]
    fn next_branching_time_walks_the_sequence() {
        let tree = five_tip_tree();
        assert_eq!(tree.next_branching_time(0.0), 1.0);
        assert_eq!(tree.next_branching_time(1.0), 2.0);
        assert_eq!(tree.next_branching_time(3.5), 4.0);
        assert_eq!(tree.next_branching_time(5.0), 5.0);
    }

    #[test]
    fn insert_species_repairs_lineage_counts() {
        let mut tree = five_tip_tree();
        tree.insert_species(1.5, 3.5);
        let brts: Vec<Real> = tree.iter().map(|nd| nd.brts).collect();
        assert_eq!(brts, vec![1.0, 1.5, 2.0, 3.0, 3.5, 4.0, 5.0]);
        // running count from soc = 2: tip +1, missing +1, extinction -1
        let counts: Vec<Real> = tree.iter().map(|nd| nd.n).collect();
        assert_eq!(counts, vec![2.0, 3.0, 4.0, 5.0, 6.0, 5.0, 6.0]);
        assert!(tree[1].is_missing());
        assert!(tree[4].is_extinction());
        assert_eq!(tree[1].t_ext, 3.5);
    }

    #[test]
    fn linked_pairs_stay_matched() {
        let mut tree = five_tip_tree();
        tree.insert_species(0.5, 4.5);
        tree.insert_species(2.2, 2.8);
        for nd in tree.iter().filter(|nd| nd.is_missing()) {
            let matches = tree
                .iter()
                .filter(|e| e.is_extinction() && e.brts == nd.t_ext)
                .count();
            assert_eq!(matches, 1, "missing node at {} unpaired", nd.brts);
        }
        // counts still satisfy the running-sum invariant
        let mut expected = tree[0].n;
        for nd in tree.iter() {
            assert_eq!(nd.n, expected);
            expected = nd.n_after();
        }
    }

    #[test]
    fn pd_accumulates_only_at_missing_nodes() {
        let mut tree = five_tip_tree();
        tree.insert_species(1.5, 3.5);
        tree.calculate_pd();
        // first missing node at 1.5 with running count 2: (1.5 - 0) * 2 = 3
        assert_relative_eq!(tree[1].pd, 3.0);
        // pd is flat afterwards (no further missing nodes)
        assert_relative_eq!(tree[6].pd, 3.0);
        assert_relative_eq!(tree[0].pd, 0.0);
    }

    #[test]
    fn pd_at_matches_recomputed_column() {
        let mut tree = five_tip_tree();
        tree.insert_species(1.5, 3.5);
        tree.insert_species(2.5, 4.2);
        tree.calculate_pd();
        for i in 0..tree.len() {
            let t = tree[i].brts;
            // pd_at excludes the node at exactly t, so probe just above
            assert_relative_eq!(tree.pd_at(t + 1e-9), tree[i].pd, epsilon = 1e-6);
        }
    }

    #[test]
    fn node_at_clamps_to_last() {
        let tree = five_tip_tree();
        assert_eq!(tree.node_at(0.0).brts, 1.0);
        assert_eq!(tree.node_at(2.5).brts, 3.0);
        assert_eq!(tree.node_at(99.0).brts, 5.0);
    }
}
