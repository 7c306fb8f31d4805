//! The project's import graph.
//!
//! Nodes are [ResolvedFile]s, edges point from a file to each of its imports. The graph is built
//! by a BFS from the root files that resolves imports until the node set is closed. Import cycles
//! are legal in solidity and are preserved, every traversal guards with a visited set.

use crate::{
    error::Result,
    resolver::{ResolvedFile, Resolver},
};
use std::collections::{HashMap, HashSet, VecDeque};

/// A fully resolved dependency graph of a single build.
///
/// The first `num_input_files` nodes are the root files the build was asked to compile, all
/// following nodes were pulled in as imports.
#[derive(Debug)]
pub struct DependencyGraph {
    nodes: Vec<ResolvedFile>,
    /// `edges[n]` is the set of outgoing edges of `nodes[n]`
    edges: Vec<Vec<usize>>,
    /// source name -> node index
    indices: HashMap<String, usize>,
    num_input_files: usize,
}

impl DependencyGraph {
    /// Resolves the given root files and all their transitive imports until closure
    pub fn resolve(resolver: &Resolver, roots: &[String]) -> Result<Self> {
        let mut nodes = resolver.resolve_many(roots)?;
        let num_input_files = nodes.len();

        let mut indices: HashMap<String, usize> = nodes
            .iter()
            .enumerate()
            .map(|(idx, node)| (node.source_name.clone(), idx))
            .collect();

        let mut edges = Vec::with_capacity(nodes.len());
        let mut unresolved: VecDeque<usize> = (0..nodes.len()).collect();

        while let Some(idx) = unresolved.pop_front() {
            let imports = nodes[idx].imports.clone();
            let mut resolved_imports = Vec::with_capacity(imports.len());
            for import in imports {
                if let Some(target) = indices.get(&import).copied() {
                    resolved_imports.push(target);
                } else {
                    let node = resolver.resolve(&import)?;
                    let target = nodes.len();
                    indices.insert(import, target);
                    nodes.push(node);
                    unresolved.push_back(target);
                    resolved_imports.push(target);
                }
            }
            if edges.len() <= idx {
                edges.resize(idx + 1, Vec::new());
            }
            edges[idx] = resolved_imports;
        }
        edges.resize(nodes.len(), Vec::new());

        tracing::trace!(
            "resolved graph with {} nodes from {} input files",
            nodes.len(),
            num_input_files
        );
        Ok(Self { nodes, edges, indices, num_input_files })
    }

    /// How many files were originally part of the input set
    pub fn num_input_files(&self) -> usize {
        self.num_input_files
    }

    /// Total number of resolved files
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Gets a node by index.
    ///
    /// # Panics
    ///
    /// if the `index` node id is not included in the graph
    pub fn node(&self, index: usize) -> &ResolvedFile {
        &self.nodes[index]
    }

    /// Returns the node with the given source name
    pub fn find(&self, source_name: &str) -> Option<&ResolvedFile> {
        self.indices.get(source_name).map(|idx| &self.nodes[*idx])
    }

    pub fn node_id(&self, source_name: &str) -> Option<usize> {
        self.indices.get(source_name).copied()
    }

    /// All resolved files of the graph
    pub fn files(&self) -> impl Iterator<Item = &ResolvedFile> {
        self.nodes.iter()
    }

    /// Returns an iterator that yields only the root files, not any resolved imports
    pub fn input_files(&self) -> impl Iterator<Item = &ResolvedFile> {
        self.nodes.iter().take(self.num_input_files)
    }

    /// Returns true if the file was part of the input set and not only added as a resolved import
    pub fn is_input_file(&self, index: usize) -> bool {
        index < self.num_input_files
    }

    /// Returns a list of nodes the given node index points to
    pub fn imported_nodes(&self, from: usize) -> &[usize] {
        &self.edges[from]
    }

    /// All files the given file imports directly
    pub fn direct_dependencies(&self, source_name: &str) -> Vec<&ResolvedFile> {
        self.node_id(source_name)
            .map(|idx| self.edges[idx].iter().map(|dep| &self.nodes[*dep]).collect())
            .unwrap_or_default()
    }

    /// All files that directly import the given file
    pub fn direct_dependents(&self, source_name: &str) -> Vec<&ResolvedFile> {
        self.node_id(source_name)
            .map(|idx| {
                self.edges
                    .iter()
                    .enumerate()
                    .filter(|(_, targets)| targets.contains(&idx))
                    .map(|(dependent, _)| &self.nodes[dependent])
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Returns the ids of all nodes reachable from `start` by imports, excluding `start` itself
    pub fn transitive_ids(&self, start: usize) -> Vec<usize> {
        NodesIter::new(start, self).skip(1).collect()
    }

    /// All files transitively reachable from the given file by imports
    pub fn transitive_dependencies(&self, source_name: &str) -> Vec<&ResolvedFile> {
        self.node_id(source_name)
            .map(|idx| self.transitive_ids(idx).into_iter().map(|dep| &self.nodes[dep]).collect())
            .unwrap_or_default()
    }

    /// Computes the weakly connected components of the graph.
    ///
    /// Two files end up in the same component if they are connected by an undirected path of
    /// imports. Components decouple otherwise independent build clusters.
    pub fn connected_components(&self) -> Vec<Vec<usize>> {
        let mut undirected: Vec<HashSet<usize>> = vec![HashSet::new(); self.nodes.len()];
        for (from, targets) in self.edges.iter().enumerate() {
            for to in targets {
                undirected[from].insert(*to);
                undirected[*to].insert(from);
            }
        }

        let mut components = Vec::new();
        let mut visited = vec![false; self.nodes.len()];
        for start in 0..self.nodes.len() {
            if visited[start] {
                continue
            }
            let mut component = Vec::new();
            let mut queue = VecDeque::from([start]);
            visited[start] = true;
            while let Some(node) = queue.pop_front() {
                component.push(node);
                for next in undirected[node].iter().copied() {
                    if !visited[next] {
                        visited[next] = true;
                        queue.push_back(next);
                    }
                }
            }
            component.sort_unstable();
            components.push(component);
        }
        components
    }

    /// Returns the shortest import path from `from` to `to`, both inclusive, if one exists
    pub fn import_path(&self, from: usize, to: usize) -> Option<Vec<usize>> {
        let mut predecessor: HashMap<usize, usize> = HashMap::new();
        let mut queue = VecDeque::from([from]);
        let mut visited = HashSet::from([from]);
        while let Some(node) = queue.pop_front() {
            if node == to {
                let mut path = vec![to];
                let mut current = to;
                while current != from {
                    current = predecessor[&current];
                    path.push(current);
                }
                path.reverse();
                return Some(path)
            }
            for next in self.edges[node].iter().copied() {
                if visited.insert(next) {
                    predecessor.insert(next, node);
                    queue.push_back(next);
                }
            }
        }
        None
    }
}

/// An iterator over a node and its dependencies, breadth first, deduplicated
#[derive(Debug)]
pub struct NodesIter<'a> {
    /// stack of nodes
    stack: VecDeque<usize>,
    visited: HashSet<usize>,
    graph: &'a DependencyGraph,
}

impl<'a> NodesIter<'a> {
    fn new(start: usize, graph: &'a DependencyGraph) -> Self {
        Self { stack: VecDeque::from([start]), visited: HashSet::new(), graph }
    }
}

impl<'a> Iterator for NodesIter<'a> {
    type Item = usize;
    fn next(&mut self) -> Option<Self::Item> {
        while let Some(node) = self.stack.pop_front() {
            if self.visited.insert(node) {
                // push the node's direct dependencies, cycles end here
                self.stack.extend(self.graph.imported_nodes(node).iter().copied());
                return Some(node)
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils;
    use std::{
        fs::{create_dir_all, File},
        io::Write,
        path::Path,
    };

    fn touch(path: &Path, content: &str) {
        create_dir_all(path.parent().unwrap()).unwrap();
        File::create(path).unwrap().write_all(content.as_bytes()).unwrap();
    }

    fn diamond_project() -> tempfile::TempDir {
        let tmp = utils::tempdir("graph").unwrap();
        let root = tmp.path();
        touch(
            &root.join("contracts/A.sol"),
            "pragma solidity ^0.8.0;\nimport \"./B.sol\";\nimport \"./C.sol\";\n",
        );
        touch(&root.join("contracts/B.sol"), "pragma solidity ^0.8.0;\nimport \"./D.sol\";\n");
        touch(&root.join("contracts/C.sol"), "pragma solidity ^0.8.0;\nimport \"./D.sol\";\n");
        touch(&root.join("contracts/D.sol"), "pragma solidity ^0.8.0;\n");
        tmp
    }

    #[test]
    fn can_resolve_diamond_imports() {
        let tmp = diamond_project();
        let resolver = Resolver::with_node_modules(tmp.path());
        let graph =
            DependencyGraph::resolve(&resolver, &["contracts/A.sol".to_string()]).unwrap();

        assert_eq!(graph.len(), 4);
        assert_eq!(graph.num_input_files(), 1);

        let deps = graph
            .transitive_dependencies("contracts/A.sol")
            .into_iter()
            .map(|dep| dep.source_name.clone())
            .collect::<Vec<_>>();
        assert_eq!(deps, vec!["contracts/B.sol", "contracts/C.sol", "contracts/D.sol"]);

        let dependents = graph
            .direct_dependents("contracts/D.sol")
            .into_iter()
            .map(|dep| dep.source_name.as_str())
            .collect::<Vec<_>>();
        assert_eq!(dependents, vec!["contracts/B.sol", "contracts/C.sol"]);
    }

    #[test]
    fn cycles_terminate() {
        let tmp = utils::tempdir("graph").unwrap();
        let root = tmp.path();
        touch(&root.join("contracts/A.sol"), "pragma solidity ^0.8.0;\nimport \"./B.sol\";\n");
        touch(&root.join("contracts/B.sol"), "pragma solidity ^0.8.0;\nimport \"./A.sol\";\n");

        let resolver = Resolver::with_node_modules(root);
        let graph =
            DependencyGraph::resolve(&resolver, &["contracts/A.sol".to_string()]).unwrap();
        assert_eq!(graph.len(), 2);

        let deps = graph.transitive_dependencies("contracts/A.sol");
        assert_eq!(deps.len(), 1);
        assert_eq!(deps[0].source_name, "contracts/B.sol");

        assert_eq!(graph.connected_components(), vec![vec![0, 1]]);
    }

    #[test]
    fn components_split_independent_clusters() {
        let tmp = utils::tempdir("graph").unwrap();
        let root = tmp.path();
        touch(&root.join("contracts/A.sol"), "pragma solidity ^0.7.0;\n");
        touch(&root.join("contracts/B.sol"), "pragma solidity ^0.8.0;\nimport \"./C.sol\";\n");
        touch(&root.join("contracts/C.sol"), "pragma solidity ^0.8.0;\n");

        let resolver = Resolver::with_node_modules(root);
        let graph = DependencyGraph::resolve(
            &resolver,
            &["contracts/A.sol".to_string(), "contracts/B.sol".to_string()],
        )
        .unwrap();

        let components = graph.connected_components();
        assert_eq!(components.len(), 2);
        assert_eq!(components, vec![vec![0], vec![1, 2]]);
    }

    #[test]
    fn can_find_import_paths() {
        let tmp = diamond_project();
        let resolver = Resolver::with_node_modules(tmp.path());
        let graph =
            DependencyGraph::resolve(&resolver, &["contracts/A.sol".to_string()]).unwrap();

        let a = graph.node_id("contracts/A.sol").unwrap();
        let d = graph.node_id("contracts/D.sol").unwrap();
        let path = graph.import_path(a, d).unwrap();
        let path = path.into_iter().map(|id| graph.node(id).source_name.as_str()).collect::<Vec<_>>();
        assert_eq!(path, vec!["contracts/A.sol", "contracts/B.sol", "contracts/D.sol"]);
    }
}
