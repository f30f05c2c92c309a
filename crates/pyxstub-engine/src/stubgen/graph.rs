//! Import-following graph
//!
//! Nodes are the modules of one package; an edge `a -> b` means module `a`
//! cimports from module `b`. The resolver searches this graph breadth
//! first to find where a leaked type is defined.

use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::VecDeque;
use std::path::Path;
use thiserror::Error;

use crate::stubgen::model::Package;

/// Errors related to import graph operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// Module not found in graph
    #[error("Module not found in import graph: {0}")]
    ModuleNotFound(String),
}

/// A node in the import graph
#[derive(Debug, Clone, Default)]
pub struct ModuleNode {
    pub path: String,
    /// Modules this module cimports from, sorted
    pub follows: Vec<String>,
    /// Modules that cimport from this module, sorted
    pub followed_by: Vec<String>,
}

impl ModuleNode {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Default)]
pub struct ModuleGraph {
    nodes: FxHashMap<String, ModuleNode>,
}

impl ModuleGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the graph of every cimport edge between modules of `package`.
    ///
    /// `from pkg cimport mod` follows `pkg.mod` when that is a module of
    /// the package, and `pkg` otherwise.
    pub fn from_package(package: &Package) -> Self {
        let mut graph = Self::new();
        for module in &package.modules {
            graph.add_module(&module.path);
            for binding in module.imports.iter().filter(|b| b.cimport) {
                let submodule = binding
                    .member
                    .as_ref()
                    .map(|member| format!("{}.{}", binding.module, member));
                let target = match submodule {
                    Some(sub) if package.contains(&sub) => sub,
                    _ => binding.module.clone(),
                };
                if target != module.path && package.contains(&target) {
                    graph.add_edge(&module.path, &target);
                }
            }
        }
        graph
    }

    pub fn add_module(&mut self, path: &str) {
        if !self.nodes.contains_key(path) {
            self.nodes.insert(path.to_string(), ModuleNode::new(path));
        }
    }

    /// Add an import-following edge (`from` cimports from `to`)
    pub fn add_edge(&mut self, from: &str, to: &str) {
        self.add_module(from);
        self.add_module(to);

        if let Some(node) = self.nodes.get_mut(from) {
            if let Err(pos) = node.follows.binary_search_by(|p| p.as_str().cmp(to)) {
                node.follows.insert(pos, to.to_string());
            }
        }
        if let Some(node) = self.nodes.get_mut(to) {
            if let Err(pos) = node.followed_by.binary_search_by(|p| p.as_str().cmp(from)) {
                node.followed_by.insert(pos, from.to_string());
            }
        }
    }

    pub fn get(&self, path: &str) -> Option<&ModuleNode> {
        self.nodes.get(path)
    }

    /// All module paths, sorted
    pub fn modules(&self) -> Vec<&str> {
        let mut paths: Vec<&str> = self.nodes.keys().map(String::as_str).collect();
        paths.sort_unstable();
        paths
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Modules reachable from `path` with their hop count, ordered by
    /// fewest hops and then by path. `path` itself is not included.
    pub fn reachable(&self, path: &str) -> Result<Vec<(String, usize)>, GraphError> {
        let start = self
            .nodes
            .get(path)
            .ok_or_else(|| GraphError::ModuleNotFound(path.to_string()))?;

        let mut visited: FxHashSet<&str> = FxHashSet::default();
        visited.insert(start.path.as_str());
        let mut queue: VecDeque<(&ModuleNode, usize)> = VecDeque::new();
        queue.push_back((start, 0));
        let mut found = Vec::new();

        while let Some((node, hops)) = queue.pop_front() {
            for next in &node.follows {
                if !visited.insert(next.as_str()) {
                    continue;
                }
                found.push((next.clone(), hops + 1));
                if let Some(next_node) = self.nodes.get(next) {
                    queue.push_back((next_node, hops + 1));
                }
            }
        }

        found.sort_by(|(a, ha), (b, hb)| ha.cmp(hb).then_with(|| a.cmp(b)));
        Ok(found)
    }
}

/// Dotted module path of `file` inside the package rooted at `root`.
///
/// The root directory's own name is the first segment, and `__init__`
/// modules name their package: `root/sub/__init__.pyx` is `root.sub`.
pub fn module_name(root: &Path, file: &Path) -> Option<String> {
    let relative = file.strip_prefix(root).ok()?;
    let mut segments: Vec<String> = Vec::new();
    if let Some(root_name) = root.file_name() {
        segments.push(root_name.to_string_lossy().into_owned());
    }

    let components: Vec<_> = relative.components().collect();
    let last = components.len().checked_sub(1)?;
    for (i, component) in components.iter().enumerate() {
        let text = component.as_os_str().to_string_lossy();
        if i == last {
            let stem = Path::new(text.as_ref()).file_stem()?.to_string_lossy().into_owned();
            if stem != "__init__" {
                segments.push(stem);
            }
        } else {
            segments.push(text.into_owned());
        }
    }

    if segments.is_empty() {
        None
    } else {
        Some(segments.join("."))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_reachable_orders_by_hops_then_path() {
        let mut graph = ModuleGraph::new();
        graph.add_edge("pkg.c", "pkg.b");
        graph.add_edge("pkg.c", "pkg.z");
        graph.add_edge("pkg.b", "pkg.a");
        graph.add_edge("pkg.z", "pkg.a");

        let reachable = graph.reachable("pkg.c").unwrap();
        assert_eq!(
            reachable,
            vec![
                ("pkg.b".to_string(), 1),
                ("pkg.z".to_string(), 1),
                ("pkg.a".to_string(), 2)
            ]
        );
    }

    #[test]
    fn test_cycles_terminate() {
        let mut graph = ModuleGraph::new();
        graph.add_edge("a", "b");
        graph.add_edge("b", "a");
        assert_eq!(graph.reachable("a").unwrap(), vec![("b".to_string(), 1)]);
    }

    #[test]
    fn test_unknown_module() {
        let graph = ModuleGraph::new();
        assert_eq!(
            graph.reachable("nope"),
            Err(GraphError::ModuleNotFound("nope".to_string()))
        );
    }

    #[test]
    fn test_duplicate_edges_are_ignored() {
        let mut graph = ModuleGraph::new();
        graph.add_edge("a", "b");
        graph.add_edge("a", "b");
        assert_eq!(graph.get("a").unwrap().follows.len(), 1);
        assert_eq!(graph.get("b").unwrap().followed_by, vec!["a".to_string()]);
        assert_eq!(graph.modules(), vec!["a", "b"]);
    }

    #[test]
    fn test_module_name() {
        let root = PathBuf::from("/src/pkg");
        assert_eq!(
            module_name(&root, &root.join("sub/a.pyx")).as_deref(),
            Some("pkg.sub.a")
        );
        assert_eq!(
            module_name(&root, &root.join("sub/__init__.pyx")).as_deref(),
            Some("pkg.sub")
        );
        assert_eq!(module_name(&root, &root.join("__init__.pyx")).as_deref(), Some("pkg"));
        assert_eq!(module_name(&root, Path::new("/elsewhere/x.pyx")), None);
    }
}
