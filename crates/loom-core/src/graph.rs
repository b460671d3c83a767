//! Directed graph with adjacency lists and Kahn topological sorting.
//!
//! Nodes are addressed by small integer handles. Ownership is flat: node data
//! lives in one `Vec`, forward and reverse adjacency in two parallel `Vec`s.
//! [`GraphMap`] is the string-keyed wrapper used for package dependency
//! graphs.

use crate::error::{Error, ErrorCode, Result};
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt::Write as _;

/// Node handle.
pub type NodeId = usize;

/// A directed graph over node payloads of type `N`.
#[derive(Debug, Clone, Default)]
pub struct Graph<N> {
    nodes: Vec<N>,
    adj: Vec<Vec<NodeId>>,
    radj: Vec<Vec<NodeId>>,
}

impl<N> Graph<N> {
    /// Create an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            adj: Vec::new(),
            radj: Vec::new(),
        }
    }

    /// Add a node, returning its handle.
    pub fn add_node(&mut self, data: N) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(data);
        self.adj.push(Vec::new());
        self.radj.push(Vec::new());
        id
    }

    /// Add a directed edge `from -> to`.
    pub fn add_edge(&mut self, from: NodeId, to: NodeId) {
        self.adj[from].push(to);
        self.radj[to].push(from);
    }

    /// Returns true if the edge `from -> to` exists.
    #[must_use]
    pub fn has_edge(&self, from: NodeId, to: NodeId) -> bool {
        self.adj[from].contains(&to)
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn node(&self, id: NodeId) -> &N {
        &self.nodes[id]
    }

    /// Successors of a node.
    #[must_use]
    pub fn successors(&self, id: NodeId) -> &[NodeId] {
        &self.adj[id]
    }

    /// Predecessors of a node.
    #[must_use]
    pub fn predecessors(&self, id: NodeId) -> &[NodeId] {
        &self.radj[id]
    }

    #[must_use]
    pub fn in_degree(&self, id: NodeId) -> usize {
        self.radj[id].len()
    }

    #[must_use]
    pub fn out_degree(&self, id: NodeId) -> usize {
        self.adj[id].len()
    }

    /// Topological sort via Kahn's algorithm.
    ///
    /// # Errors
    ///
    /// Returns a `Cycle` error if the graph contains a cycle.
    pub fn topological_sort(&self) -> Result<Vec<NodeId>> {
        let n = self.nodes.len();
        let mut in_deg: Vec<usize> = (0..n).map(|i| self.radj[i].len()).collect();

        let mut queue: VecDeque<NodeId> =
            (0..n).filter(|&i| in_deg[i] == 0).collect();

        let mut order = Vec::with_capacity(n);
        while let Some(u) = queue.pop_front() {
            order.push(u);
            for &v in &self.adj[u] {
                in_deg[v] -= 1;
                if in_deg[v] == 0 {
                    queue.push_back(v);
                }
            }
        }

        if order.len() != n {
            return Err(Error::new(ErrorCode::Cycle, "graph contains a cycle"));
        }
        Ok(order)
    }

    /// Topological sort restricted to the nodes reachable from `root`.
    ///
    /// # Errors
    ///
    /// Returns a `Cycle` error if the reachable subgraph contains a cycle.
    pub fn topological_sort_from(&self, root: NodeId) -> Result<Vec<NodeId>> {
        // BFS for the reachable set.
        let mut reachable = HashSet::new();
        let mut bfs = VecDeque::new();
        bfs.push_back(root);
        reachable.insert(root);
        while let Some(u) = bfs.pop_front() {
            for &v in &self.adj[u] {
                if reachable.insert(v) {
                    bfs.push_back(v);
                }
            }
        }

        // Kahn's on the subgraph.
        let mut in_deg: HashMap<NodeId, usize> =
            reachable.iter().map(|&id| (id, 0)).collect();
        for &id in &reachable {
            for &v in &self.adj[id] {
                if let Some(deg) = in_deg.get_mut(&v) {
                    *deg += 1;
                }
            }
        }

        let mut queue: VecDeque<NodeId> = in_deg
            .iter()
            .filter(|&(_, &deg)| deg == 0)
            .map(|(&id, _)| id)
            .collect();

        let mut order = Vec::with_capacity(reachable.len());
        while let Some(u) = queue.pop_front() {
            order.push(u);
            for &v in &self.adj[u] {
                if let Some(deg) = in_deg.get_mut(&v) {
                    *deg -= 1;
                    if *deg == 0 {
                        queue.push_back(v);
                    }
                }
            }
        }

        if order.len() != reachable.len() {
            return Err(Error::new(
                ErrorCode::Cycle,
                "graph contains a cycle in reachable subgraph",
            ));
        }
        Ok(order)
    }

    /// Returns true if the graph contains any cycle.
    #[must_use]
    pub fn has_cycle(&self) -> bool {
        self.topological_sort().is_err()
    }

    /// Depth-first traversal from `start`, visiting each node once.
    pub fn dfs(&self, start: NodeId, mut visitor: impl FnMut(NodeId)) {
        let mut visited = HashSet::new();
        let mut stack = vec![start];
        while let Some(u) = stack.pop() {
            if !visited.insert(u) {
                continue;
            }
            visitor(u);
            // Reverse so children visit in insertion order.
            for &v in self.adj[u].iter().rev() {
                if !visited.contains(&v) {
                    stack.push(v);
                }
            }
        }
    }

    /// Render the subtree rooted at `root` as an indented tree.
    /// Revisited nodes are marked with `(*)` and not expanded again.
    pub fn tree_display(&self, root: NodeId, to_string: impl Fn(&N) -> String) -> String {
        let mut out = String::new();
        let mut visited = HashSet::new();
        self.tree_display_impl(root, "", true, &mut visited, &to_string, &mut out);
        out
    }

    fn tree_display_impl(
        &self,
        u: NodeId,
        prefix: &str,
        is_last: bool,
        visited: &mut HashSet<NodeId>,
        to_string: &impl Fn(&N) -> String,
        out: &mut String,
    ) {
        out.push_str(prefix);
        if !prefix.is_empty() {
            out.push_str(if is_last { "└── " } else { "├── " });
        }
        let _ = write!(out, "{}", to_string(&self.nodes[u]));

        if !visited.insert(u) {
            out.push_str(" (*)\n");
            return;
        }
        out.push('\n');

        let edges = &self.adj[u];
        for (i, &v) in edges.iter().enumerate() {
            let mut child_prefix = prefix.to_string();
            if !prefix.is_empty() {
                child_prefix.push_str(if is_last { "    " } else { "│   " });
            } else {
                child_prefix.push_str("  ");
            }
            self.tree_display_impl(
                v,
                &child_prefix,
                i == edges.len() - 1,
                visited,
                to_string,
                out,
            );
        }
    }
}

/// String-keyed graph used for package dependency graphs.
#[derive(Debug, Clone, Default)]
pub struct GraphMap {
    graph: Graph<String>,
    ids: HashMap<String, NodeId>,
}

impl GraphMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a node if missing, returning its handle.
    pub fn add_node(&mut self, name: &str) -> NodeId {
        if let Some(&id) = self.ids.get(name) {
            return id;
        }
        let id = self.graph.add_node(name.to_string());
        self.ids.insert(name.to_string(), id);
        id
    }

    #[must_use]
    pub fn has_node(&self, name: &str) -> bool {
        self.ids.contains_key(name)
    }

    /// Add an edge, creating missing nodes.
    pub fn add_edge(&mut self, from: &str, to: &str) {
        let f = self.add_node(from);
        let t = self.add_node(to);
        self.graph.add_edge(f, t);
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Topological sort returning node names.
    ///
    /// # Errors
    ///
    /// Returns a `Cycle` error if the graph contains a cycle.
    pub fn topological_sort(&self) -> Result<Vec<String>> {
        let order = self.graph.topological_sort()?;
        Ok(order.iter().map(|&id| self.graph.node(id).clone()).collect())
    }

    #[must_use]
    pub fn has_cycle(&self) -> bool {
        self.graph.has_cycle()
    }

    /// Render the dependency tree rooted at `root`, or empty if unknown.
    #[must_use]
    pub fn tree_display(&self, root: &str) -> String {
        match self.ids.get(root) {
            Some(&id) => self.graph.tree_display(id, Clone::clone),
            None => String::new(),
        }
    }

    /// Access the underlying graph.
    #[must_use]
    pub fn inner(&self) -> &Graph<String> {
        &self.graph
    }
}
