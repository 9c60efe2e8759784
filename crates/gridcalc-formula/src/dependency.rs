//! Dependency tracking for formula calculation
//!
//! [`DependencyGraph`] keeps, for every cell that takes part in an edge, the
//! cells it reads (precedents) and the cells that read it (dependents).
//! Nodes live in an arena and are numbered in insertion order; that number
//! is the tie-breaker wherever an order has to be picked.
//!
//! [`RecalcSchedule`] orders one recalculation pass over a subset of the
//! graph (Kahn's algorithm, one wave of ready cells at a time) and finds the
//! cycles that block it. None of the traversals recurse.

use ahash::{AHashMap, AHashSet};
use gridcalc_core::CellAddress;
use std::collections::{BTreeSet, VecDeque};
use std::fmt;

/// Unique key for a cell (sheet index + address)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellKey {
    pub sheet: usize,
    pub row: u32,
    pub col: u16,
}

impl CellKey {
    /// Create a new cell key
    pub fn new(sheet: usize, row: u32, col: u16) -> Self {
        Self { sheet, row, col }
    }

    /// Create from sheet index and cell address
    pub fn from_address(sheet: usize, addr: &CellAddress) -> Self {
        Self::new(sheet, addr.row, addr.col)
    }

    /// Address part of the key, without `$` markers
    pub fn address(&self) -> CellAddress {
        CellAddress::new(self.row, self.col)
    }
}

impl fmt::Display for CellKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}!{}", self.sheet, self.address())
    }
}

/// Calculation state of a cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CellState {
    /// Published value is current
    #[default]
    Clean,
    /// Waiting to be (re)calculated
    Dirty,
    /// Being calculated right now
    Evaluating,
}

type NodeId = usize;

/// Dead nodes tolerated before the arena is compacted
const COMPACT_SLACK: usize = 64;

#[derive(Debug)]
struct Node {
    key: CellKey,
    precedents: Vec<NodeId>,
    dependents: Vec<NodeId>,
    state: CellState,
    live: bool,
}

impl Node {
    fn is_isolated(&self) -> bool {
        self.precedents.is_empty() && self.dependents.is_empty()
    }
}

/// Dependency graph for formula cells
///
/// A cell keeps its node while it has edges, or while it is a formula cell
/// whose references were set with [`set_precedents`](Self::set_precedents).
/// Released nodes are dropped from the arena once they outnumber the live
/// ones; compaction keeps the relative order of the survivors.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    nodes: Vec<Node>,
    index: AHashMap<CellKey, NodeId>,
}

impl DependencyGraph {
    /// Create a new empty dependency graph
    pub fn new() -> Self {
        Self::default()
    }

    fn node_id(&self, cell: CellKey) -> Option<NodeId> {
        self.index.get(&cell).copied()
    }

    fn ensure_node(&mut self, cell: CellKey) -> NodeId {
        if let Some(id) = self.node_id(cell) {
            return id;
        }
        let id = self.nodes.len();
        self.nodes.push(Node {
            key: cell,
            precedents: Vec::new(),
            dependents: Vec::new(),
            state: CellState::Clean,
            live: true,
        });
        self.index.insert(cell, id);
        id
    }

    fn keys_of(&self, ids: impl IntoIterator<Item = NodeId>) -> Vec<CellKey> {
        ids.into_iter().map(|id| self.nodes[id].key).collect()
    }

    /// Replace everything `cell` depends on
    ///
    /// The forward edges and the matching reverse edges change together.
    /// `cell` gets a node even when `precedents` is empty. Duplicates are
    /// ignored; the first occurrence fixes the order.
    pub fn set_precedents(&mut self, cell: CellKey, precedents: impl IntoIterator<Item = CellKey>) {
        let id = self.ensure_node(cell);
        let old = self.detach(id);

        let mut seen = AHashSet::new();
        for precedent in precedents {
            let pid = self.ensure_node(precedent);
            if !seen.insert(pid) {
                continue;
            }
            self.nodes[id].precedents.push(pid);
            self.nodes[pid].dependents.push(id);
        }

        for pid in old {
            if pid != id {
                self.release_if_isolated(pid);
            }
        }
        self.compact_if_sparse();
    }

    /// Remove the edges from `cell` to the cells it depends on
    ///
    /// Cells that depend on `cell` keep their edges. Nodes left without any
    /// edge, `cell` included, are released.
    pub fn clear_precedents(&mut self, cell: CellKey) {
        let id = match self.node_id(cell) {
            Some(id) => id,
            None => return,
        };

        for pid in self.detach(id) {
            self.release_if_isolated(pid);
        }
        self.release_if_isolated(id);
        self.compact_if_sparse();
    }

    /// Drop the outgoing edges of `id`, returning its former precedents
    fn detach(&mut self, id: NodeId) -> Vec<NodeId> {
        let precedents = std::mem::take(&mut self.nodes[id].precedents);
        for &pid in &precedents {
            self.nodes[pid].dependents.retain(|&d| d != id);
        }
        precedents
    }

    fn release_if_isolated(&mut self, id: NodeId) {
        let node = &mut self.nodes[id];
        if node.live && node.is_isolated() {
            node.live = false;
            self.index.remove(&node.key);
        }
    }

    /// Renumber the live nodes once released ones make up most of the arena
    fn compact_if_sparse(&mut self) {
        let live = self.index.len();
        if self.nodes.len() <= 2 * live + COMPACT_SLACK {
            return;
        }

        let mut remap = vec![0; self.nodes.len()];
        let nodes = std::mem::take(&mut self.nodes);
        for (old, node) in nodes.into_iter().enumerate() {
            if node.live {
                remap[old] = self.nodes.len();
                self.nodes.push(node);
            }
        }

        for (id, node) in self.nodes.iter_mut().enumerate() {
            for p in &mut node.precedents {
                *p = remap[*p];
            }
            for d in &mut node.dependents {
                *d = remap[*d];
            }
            self.index.insert(node.key, id);
        }
    }

    /// Cells that directly depend on `cell`, in the order the edges were added
    pub fn dependents(&self, cell: CellKey) -> Vec<CellKey> {
        self.node_id(cell)
            .map(|id| self.keys_of(self.nodes[id].dependents.iter().copied()))
            .unwrap_or_default()
    }

    /// Cells `cell` directly depends on, in reference order
    pub fn precedents(&self, cell: CellKey) -> Vec<CellKey> {
        self.node_id(cell)
            .map(|id| self.keys_of(self.nodes[id].precedents.iter().copied()))
            .unwrap_or_default()
    }

    /// Whether `cell` has a node
    pub fn contains(&self, cell: CellKey) -> bool {
        self.index.contains_key(&cell)
    }

    /// Number of cells with a node
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Every cell with a node, in insertion order
    pub fn cells(&self) -> impl Iterator<Item = CellKey> + '_ {
        self.nodes.iter().filter(|n| n.live).map(|n| n.key)
    }

    /// Breadth-first walk from `start` along dependents (`forward`) or
    /// precedents; `start` itself is only included when a cycle leads back
    fn reachable(&self, start: NodeId, forward: bool) -> Vec<bool> {
        let mut seen = vec![false; self.nodes.len()];
        let mut queue = VecDeque::from([start]);

        while let Some(id) = queue.pop_front() {
            let next = if forward {
                &self.nodes[id].dependents
            } else {
                &self.nodes[id].precedents
            };
            for &n in next {
                if !seen[n] {
                    seen[n] = true;
                    queue.push_back(n);
                }
            }
        }
        seen
    }

    /// Every cell that depends on `cell`, directly or not, nearest first
    pub fn transitive_dependents(&self, cell: CellKey) -> Vec<CellKey> {
        let start = match self.node_id(cell) {
            Some(id) => id,
            None => return Vec::new(),
        };

        let mut seen = vec![false; self.nodes.len()];
        seen[start] = true;
        let mut queue = VecDeque::from([start]);
        let mut order = Vec::new();

        while let Some(id) = queue.pop_front() {
            for &d in &self.nodes[id].dependents {
                if !seen[d] {
                    seen[d] = true;
                    order.push(d);
                    queue.push_back(d);
                }
            }
        }
        self.keys_of(order)
    }

    /// Cells lying on a cycle through `cell`, in insertion order
    ///
    /// Empty when `cell` is not on a cycle.
    pub fn cycle_members(&self, cell: CellKey) -> Vec<CellKey> {
        let start = match self.node_id(cell) {
            Some(id) => id,
            None => return Vec::new(),
        };

        let downstream = self.reachable(start, true);
        let upstream = self.reachable(start, false);
        self.keys_of((0..self.nodes.len()).filter(|&id| downstream[id] && upstream[id]))
    }

    /// Current calculation state; cells without a node are clean
    pub fn state(&self, cell: CellKey) -> CellState {
        self.node_id(cell)
            .map_or(CellState::Clean, |id| self.nodes[id].state)
    }

    /// Set the calculation state; ignored for cells without a node
    pub fn set_state(&mut self, cell: CellKey, state: CellState) {
        if let Some(id) = self.node_id(cell) {
            self.nodes[id].state = state;
        }
    }
}

/// Order of evaluation for one recalculation pass
///
/// The affected set is the roots plus everything downstream of them. A cell
/// becomes ready once every affected cell it reads has been completed;
/// [`take_wave`](Self::take_wave) hands out all ready cells at once, lowest
/// node number first.
#[derive(Debug)]
pub struct RecalcSchedule {
    affected: Vec<NodeId>,
    in_affected: Vec<bool>,
    resolved: Vec<bool>,
    pending: Vec<usize>,
    ready: BTreeSet<NodeId>,
    remaining: usize,
}

impl RecalcSchedule {
    /// Plan a pass starting from `roots`; roots without a node are skipped
    pub fn new(graph: &DependencyGraph, roots: impl IntoIterator<Item = CellKey>) -> Self {
        let n = graph.nodes.len();
        let mut in_affected = vec![false; n];
        let mut queue = VecDeque::new();

        for root in roots {
            if let Some(id) = graph.node_id(root) {
                if !in_affected[id] {
                    in_affected[id] = true;
                    queue.push_back(id);
                }
            }
        }
        while let Some(id) = queue.pop_front() {
            for &d in &graph.nodes[id].dependents {
                if !in_affected[d] {
                    in_affected[d] = true;
                    queue.push_back(d);
                }
            }
        }

        let affected: Vec<NodeId> = (0..n).filter(|&id| in_affected[id]).collect();
        let mut pending = vec![0; n];
        let mut ready = BTreeSet::new();
        for &id in &affected {
            pending[id] = graph.nodes[id]
                .precedents
                .iter()
                .filter(|&&p| in_affected[p])
                .count();
            if pending[id] == 0 {
                ready.insert(id);
            }
        }

        Self {
            remaining: affected.len(),
            affected,
            in_affected,
            resolved: vec![false; n],
            pending,
            ready,
        }
    }

    /// Cells in this pass, in node order
    pub fn affected_keys(&self, graph: &DependencyGraph) -> Vec<CellKey> {
        graph.keys_of(self.affected.iter().copied())
    }

    /// Take every cell that is ready now
    ///
    /// Empty while cells remain means the rest is blocked by a cycle.
    pub fn take_wave(&mut self, graph: &DependencyGraph) -> Vec<CellKey> {
        let wave = std::mem::take(&mut self.ready);
        graph.keys_of(wave)
    }

    /// Mark `cell` as done, releasing the cells waiting on it
    pub fn complete(&mut self, graph: &DependencyGraph, cell: CellKey) {
        let id = match graph.node_id(cell) {
            Some(id) if self.in_affected[id] && !self.resolved[id] => id,
            _ => return,
        };
        self.resolved[id] = true;
        self.ready.remove(&id);
        self.remaining -= 1;

        for &d in &graph.nodes[id].dependents {
            if self.in_affected[d] && !self.resolved[d] && self.pending[d] > 0 {
                self.pending[d] -= 1;
                if self.pending[d] == 0 {
                    self.ready.insert(d);
                }
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        self.remaining == 0
    }

    /// Cells not completed yet, in node order
    pub fn remaining(&self, graph: &DependencyGraph) -> Vec<CellKey> {
        graph.keys_of(self.affected.iter().copied().filter(|&id| !self.resolved[id]))
    }

    /// Members of cycles among the cells not completed yet
    ///
    /// Strongly connected components with more than one cell, plus cells
    /// that read themselves. Cells that merely sit downstream of a cycle are
    /// not included. Uses an iterative Tarjan walk.
    pub fn cycle_cells(&self, graph: &DependencyGraph) -> Vec<CellKey> {
        let n = graph.nodes.len();
        let open = |id: NodeId| self.in_affected[id] && !self.resolved[id];

        let mut index: Vec<Option<usize>> = vec![None; n];
        let mut lowlink = vec![0; n];
        let mut on_stack = vec![false; n];
        let mut stack: Vec<NodeId> = Vec::new();
        let mut counter = 0;
        let mut members: Vec<NodeId> = Vec::new();

        for &root in self.affected.iter().filter(|&&id| open(id)) {
            if index[root].is_some() {
                continue;
            }

            // (node, next dependent to look at)
            let mut calls: Vec<(NodeId, usize)> = Vec::new();
            index[root] = Some(counter);
            lowlink[root] = counter;
            counter += 1;
            stack.push(root);
            on_stack[root] = true;
            calls.push((root, 0));

            while let Some(frame) = calls.last_mut() {
                let v = frame.0;
                let dependents = &graph.nodes[v].dependents;
                if frame.1 < dependents.len() {
                    let w = dependents[frame.1];
                    frame.1 += 1;
                    if !open(w) {
                        continue;
                    }
                    match index[w] {
                        None => {
                            index[w] = Some(counter);
                            lowlink[w] = counter;
                            counter += 1;
                            stack.push(w);
                            on_stack[w] = true;
                            calls.push((w, 0));
                        }
                        Some(w_index) if on_stack[w] => {
                            lowlink[v] = lowlink[v].min(w_index);
                        }
                        Some(_) => {}
                    }
                    continue;
                }

                calls.pop();
                if let Some(&(parent, _)) = calls.last() {
                    lowlink[parent] = lowlink[parent].min(lowlink[v]);
                }

                if Some(lowlink[v]) == index[v] {
                    let mut component = Vec::new();
                    while let Some(w) = stack.pop() {
                        on_stack[w] = false;
                        component.push(w);
                        if w == v {
                            break;
                        }
                    }
                    let self_loop = graph.nodes[v].precedents.contains(&v);
                    if component.len() > 1 || self_loop {
                        members.extend(component);
                    }
                }
            }
        }

        members.sort_unstable();
        graph.keys_of(members)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn key(col: u16) -> CellKey {
        CellKey::new(0, 0, col)
    }

    #[test]
    fn test_set_precedents_updates_both_directions() {
        let mut graph = DependencyGraph::new();
        let (a1, b1, c1) = (key(0), key(1), key(2));

        graph.set_precedents(c1, [a1, b1, a1]);
        assert_eq!(graph.precedents(c1), vec![a1, b1]);
        assert_eq!(graph.dependents(a1), vec![c1]);
        assert_eq!(graph.dependents(b1), vec![c1]);

        graph.set_precedents(c1, [b1]);
        assert_eq!(graph.precedents(c1), vec![b1]);
        assert!(graph.dependents(a1).is_empty());
        assert!(!graph.contains(a1));
        assert_eq!(graph.len(), 2);
    }

    #[test]
    fn test_formula_cell_without_references_keeps_its_node() {
        let mut graph = DependencyGraph::new();
        graph.set_precedents(key(0), []);
        assert!(graph.contains(key(0)));

        graph.clear_precedents(key(0));
        assert!(graph.is_empty());
    }

    #[test]
    fn test_large_reference_list_is_deduplicated() {
        let mut graph = DependencyGraph::new();
        let target = CellKey::new(1, 0, 0);
        let column = |rows: u32| (0..rows).map(|row| CellKey::new(0, row, 0));

        graph.set_precedents(target, column(200_000).chain(column(200_000)));
        assert_eq!(graph.precedents(target).len(), 200_000);
        assert_eq!(graph.dependents(CellKey::new(0, 199_999, 0)), vec![target]);
    }

    #[test]
    fn test_released_nodes_are_compacted_in_order() {
        let mut graph = DependencyGraph::new();
        let (a1, b1, c1) = (key(0), key(1), key(2));
        let column = |rows: u32| (1..=rows).map(|row| CellKey::new(0, row, 5));

        graph.set_precedents(b1, [a1]);
        graph.set_precedents(c1, column(1000));
        assert_eq!(graph.nodes.len(), 1003);

        graph.set_precedents(c1, [b1]);
        assert_eq!(graph.nodes.len(), 3);
        assert_eq!(graph.cells().collect::<Vec<_>>(), vec![b1, a1, c1]);
        assert_eq!(graph.dependents(b1), vec![c1]);
        assert_eq!(graph.precedents(b1), vec![a1]);

        let mut schedule = RecalcSchedule::new(&graph, [a1]);
        assert_eq!(schedule.take_wave(&graph), vec![a1]);
        schedule.complete(&graph, a1);
        assert_eq!(schedule.take_wave(&graph), vec![b1]);
    }

    #[test]
    fn test_clear_precedents_keeps_incoming_edges() {
        let mut graph = DependencyGraph::new();
        let (a1, b1, c1) = (key(0), key(1), key(2));

        graph.set_precedents(b1, [a1]);
        graph.set_precedents(c1, [b1]);
        graph.clear_precedents(b1);

        assert!(graph.precedents(b1).is_empty());
        assert!(graph.dependents(a1).is_empty());
        assert_eq!(graph.dependents(b1), vec![c1]);
    }

    #[test]
    fn test_transitive_dependents_nearest_first() {
        let mut graph = DependencyGraph::new();
        let (a1, b1, c1, d1) = (key(0), key(1), key(2), key(3));

        graph.set_precedents(b1, [a1]);
        graph.set_precedents(c1, [b1]);
        graph.set_precedents(d1, [a1, c1]);

        assert_eq!(graph.transitive_dependents(a1), vec![b1, d1, c1]);
        assert!(graph.transitive_dependents(d1).is_empty());
    }

    #[test]
    fn test_cycle_members() {
        let mut graph = DependencyGraph::new();
        let (a1, b1, c1, d1) = (key(0), key(1), key(2), key(3));

        // A1 -> B1 -> C1 -> A1, and D1 reads C1
        graph.set_precedents(a1, [c1]);
        graph.set_precedents(b1, [a1]);
        graph.set_precedents(c1, [b1]);
        graph.set_precedents(d1, [c1]);

        assert_eq!(graph.cycle_members(b1), vec![a1, c1, b1]);
        assert!(graph.cycle_members(d1).is_empty());
    }

    #[test]
    fn test_schedule_runs_in_waves() {
        let mut graph = DependencyGraph::new();
        let (a1, b1, c1, d1) = (key(0), key(1), key(2), key(3));

        graph.set_precedents(b1, [a1]);
        graph.set_precedents(c1, [a1]);
        graph.set_precedents(d1, [b1, c1]);

        let mut schedule = RecalcSchedule::new(&graph, [a1]);
        assert_eq!(schedule.affected_keys(&graph), vec![b1, a1, c1, d1]);

        let mut waves = Vec::new();
        while !schedule.is_finished() {
            let wave = schedule.take_wave(&graph);
            assert!(!wave.is_empty());
            for &cell in &wave {
                schedule.complete(&graph, cell);
            }
            waves.push(wave);
        }
        assert_eq!(waves, vec![vec![a1], vec![b1, c1], vec![d1]]);
    }

    #[test]
    fn test_schedule_reports_cycles_but_not_downstream() {
        let mut graph = DependencyGraph::new();
        let (a1, b1, c1, d1) = (key(0), key(1), key(2), key(3));

        graph.set_precedents(a1, [b1]);
        graph.set_precedents(b1, [a1]);
        graph.set_precedents(c1, [a1]);
        graph.set_precedents(d1, [d1]);

        let mut schedule = RecalcSchedule::new(&graph, [a1, d1]);
        assert!(schedule.take_wave(&graph).is_empty());
        assert_eq!(schedule.cycle_cells(&graph), vec![a1, b1, d1]);

        for cell in schedule.cycle_cells(&graph) {
            schedule.complete(&graph, cell);
        }
        assert_eq!(schedule.take_wave(&graph), vec![c1]);
        schedule.complete(&graph, c1);
        assert!(schedule.is_finished());
    }

    #[test]
    fn test_long_cycle_does_not_recurse() {
        let mut graph = DependencyGraph::new();
        let n = 50_000u16;
        for col in 0..n {
            graph.set_precedents(key(col), [key((col + 1) % n)]);
        }
        let schedule = RecalcSchedule::new(&graph, [key(0)]);
        assert_eq!(schedule.cycle_cells(&graph).len(), n as usize);
    }
}
