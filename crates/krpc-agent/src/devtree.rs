use std::collections::HashMap;
use std::fmt;
use std::sync::{PoisonError, RwLock};

/// Path of a devicetree node, e.g. `/rpmsg/acpu/channel/krpc-agent`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(path: impl Into<String>) -> Self {
        let path = path.into();
        let trimmed = path.trim_end_matches('/');
        if trimmed.is_empty() {
            Self("/".to_string())
        } else {
            Self(trimmed.to_string())
        }
    }

    pub fn path(&self) -> &str {
        &self.0
    }

    /// Last path component.
    pub fn name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or("")
    }

    /// Parent by path, `None` for the root.
    pub fn parent(&self) -> Option<NodeId> {
        if self.0 == "/" {
            return None;
        }
        match self.0.rfind('/') {
            Some(0) => Some(NodeId("/".to_string())),
            Some(idx) => Some(NodeId(self.0[..idx].to_string())),
            None => None,
        }
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(path: &str) -> Self {
        NodeId::new(path)
    }
}

/// The slice of a devicetree that agent lookup needs.
pub trait DeviceTree: Send + Sync {
    /// Follow entry `index` of phandle list `property` on `node`.
    fn parse_phandle(&self, node: &NodeId, property: &str, index: usize) -> Option<NodeId>;

    /// Parent node.
    fn parent(&self, node: &NodeId) -> Option<NodeId>;

    /// True when the node exists and its status is not `disabled`.
    fn is_available(&self, node: &NodeId) -> bool;
}

#[derive(Debug, Default)]
struct NodeEntry {
    enabled: bool,
    phandles: HashMap<String, Vec<NodeId>>,
}

/// In-memory devicetree.
///
/// Parents are derived from paths; adding a node adds its missing ancestors
/// as enabled nodes.
#[derive(Debug, Default)]
pub struct StaticTree {
    nodes: RwLock<HashMap<NodeId, NodeEntry>>,
}

impl StaticTree {
    pub fn new() -> Self {
        let tree = Self::default();
        tree.add_node("/");
        tree
    }

    /// Add an enabled node (and its ancestors).
    pub fn add_node(&self, path: &str) -> NodeId {
        let node = NodeId::new(path);
        let mut nodes = self.nodes.write().unwrap_or_else(PoisonError::into_inner);
        let mut cursor = Some(node.clone());
        while let Some(current) = cursor {
            cursor = current.parent();
            nodes.entry(current).or_insert_with(|| NodeEntry {
                enabled: true,
                ..NodeEntry::default()
            });
        }
        node
    }

    /// Set a node's `status` to okay (`true`) or disabled.
    pub fn set_enabled(&self, node: &NodeId, enabled: bool) {
        let mut nodes = self.nodes.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(entry) = nodes.get_mut(node) {
            entry.enabled = enabled;
        }
    }

    /// Set phandle list `property` on `node`, adding the node if needed.
    pub fn set_phandles(&self, node: &NodeId, property: &str, targets: &[NodeId]) {
        self.add_node(node.path());
        let mut nodes = self.nodes.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(entry) = nodes.get_mut(node) {
            entry
                .phandles
                .insert(property.to_string(), targets.to_vec());
        }
    }

    pub fn contains(&self, node: &NodeId) -> bool {
        self.nodes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(node)
    }
}

impl DeviceTree for StaticTree {
    fn parse_phandle(&self, node: &NodeId, property: &str, index: usize) -> Option<NodeId> {
        let nodes = self.nodes.read().unwrap_or_else(PoisonError::into_inner);
        let target = nodes.get(node)?.phandles.get(property)?.get(index)?;
        // A dangling phandle resolves to nothing.
        nodes.contains_key(target).then(|| target.clone())
    }

    fn parent(&self, node: &NodeId) -> Option<NodeId> {
        node.parent()
    }

    fn is_available(&self, node: &NodeId) -> bool {
        self.nodes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(node)
            .is_some_and(|entry| entry.enabled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_paths() {
        let node = NodeId::new("/rpmsg/acpu/krpc-agent/");
        assert_eq!(node.path(), "/rpmsg/acpu/krpc-agent");
        assert_eq!(node.name(), "krpc-agent");
        assert_eq!(node.parent(), Some(NodeId::new("/rpmsg/acpu")));
        assert_eq!(NodeId::new("/rpmsg").parent(), Some(NodeId::new("/")));
        assert_eq!(NodeId::new("/").parent(), None);
    }

    #[test]
    fn add_node_creates_ancestors() {
        let tree = StaticTree::new();
        tree.add_node("/a/b/c");
        assert!(tree.contains(&"/a".into()));
        assert!(tree.contains(&"/a/b".into()));
        assert!(tree.is_available(&"/a/b/c".into()));
    }

    #[test]
    fn phandles_resolve_by_index() {
        let tree = StaticTree::new();
        let consumer = tree.add_node("/sound");
        let first = tree.add_node("/rpmsg/acpu/agent");
        let second = tree.add_node("/rpmsg/hifi/agent");
        tree.set_phandles(&consumer, "krpc", &[first.clone(), second.clone()]);

        assert_eq!(tree.parse_phandle(&consumer, "krpc", 0), Some(first));
        assert_eq!(tree.parse_phandle(&consumer, "krpc", 1), Some(second));
        assert_eq!(tree.parse_phandle(&consumer, "krpc", 2), None);
        assert_eq!(tree.parse_phandle(&consumer, "other", 0), None);
    }

    #[test]
    fn dangling_phandle_is_absent() {
        let tree = StaticTree::new();
        let consumer = tree.add_node("/sound");
        tree.set_phandles(&consumer, "krpc", &[NodeId::new("/missing")]);
        assert_eq!(tree.parse_phandle(&consumer, "krpc", 0), None);
    }

    #[test]
    fn disabled_nodes_are_unavailable() {
        let tree = StaticTree::new();
        let link = tree.add_node("/rpmsg/video");
        tree.set_enabled(&link, false);
        assert!(!tree.is_available(&link));
        assert!(!tree.is_available(&"/nope".into()));
    }
}
