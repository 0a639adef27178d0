//! Registry of live nodes keyed by name.

use rand::Rng;
use rand::seq::SliceRandom;
use std::collections::{HashMap, HashSet};
use takeoff_client::ApiClient;

use crate::node::{Node, NodeInfo};
use crate::{Error, Result};

/// Live nodes, unique by name and by port.
///
/// Only the cluster manager mutates it. Listings are sorted by port so
/// snapshots are stable between calls.
#[derive(Default)]
pub(crate) struct NodeRegistry {
    nodes: HashMap<String, Node>,
    ports: HashSet<u16>,
}

impl NodeRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&mut self, node: Node) -> Result<()> {
        if self.nodes.contains_key(node.name()) {
            return Err(Error::DuplicateNode(node.name().to_string()));
        }
        if !self.ports.insert(node.port()) {
            return Err(Error::DuplicatePort(node.port()));
        }

        self.nodes.insert(node.name().to_string(), node);
        Ok(())
    }

    pub(crate) fn remove(&mut self, name: &str) -> Result<Node> {
        let node = self
            .nodes
            .remove(name)
            .ok_or_else(|| Error::NodeNotFound(name.to_string()))?;
        self.ports.remove(&node.port());
        Ok(node)
    }

    pub(crate) fn get(&self, name: &str) -> Result<&Node> {
        self.nodes
            .get(name)
            .ok_or_else(|| Error::NodeNotFound(name.to_string()))
    }

    pub(crate) fn get_mut(&mut self, name: &str) -> Result<&mut Node> {
        self.nodes
            .get_mut(name)
            .ok_or_else(|| Error::NodeNotFound(name.to_string()))
    }

    pub(crate) fn len(&self) -> usize {
        self.nodes.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn sorted(&self) -> Vec<&Node> {
        let mut nodes: Vec<&Node> = self.nodes.values().collect();
        nodes.sort_by_key(|node| node.port());
        nodes
    }

    pub(crate) fn names(&self) -> Vec<String> {
        self.sorted()
            .into_iter()
            .map(|node| node.name().to_string())
            .collect()
    }

    pub(crate) fn clients(&self) -> Vec<ApiClient> {
        self.sorted()
            .into_iter()
            .map(|node| node.client().clone())
            .collect()
    }

    pub(crate) fn named_clients(&self) -> Vec<(String, ApiClient)> {
        self.sorted()
            .into_iter()
            .map(|node| (node.name().to_string(), node.client().clone()))
            .collect()
    }

    pub(crate) fn infos(&self) -> Vec<NodeInfo> {
        self.sorted().into_iter().map(Node::info).collect()
    }

    /// Client of a uniformly chosen node.
    pub(crate) fn random_client<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<ApiClient> {
        self.sorted()
            .choose(rng)
            .map(|node| node.client().clone())
            .ok_or(Error::EmptyCluster)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{NodeHandle, NodeStatus};
    use proptest::prelude::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::collections::BTreeSet;

    fn node(port: u16) -> Node {
        let client = ApiClient::for_node("127.0.0.1", port).unwrap();
        Node::new(NodeHandle::managed(port), client)
    }

    #[test]
    fn test_insert_and_lookup() {
        let mut registry = NodeRegistry::new();
        registry.insert(node(5001)).unwrap();
        registry.insert(node(5000)).unwrap();

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.names(), vec!["node-5000", "node-5001"]);
        assert_eq!(registry.get("node-5001").unwrap().port(), 5001);
        assert_eq!(
            registry.infos()[0].status,
            NodeStatus::Starting
        );
    }

    #[test]
    fn test_duplicate_rejected() {
        let mut registry = NodeRegistry::new();
        registry.insert(node(5000)).unwrap();

        let result = registry.insert(node(5000));
        assert!(matches!(result, Err(Error::DuplicateNode(name)) if name == "node-5000"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_remove_unknown_node() {
        let mut registry = NodeRegistry::new();
        registry.insert(node(5000)).unwrap();
        registry.remove("node-5000").unwrap();

        assert!(matches!(
            registry.remove("node-5000"),
            Err(Error::NodeNotFound(_))
        ));
        assert!(matches!(registry.get("node-5000"), Err(Error::NodeNotFound(_))));
    }

    #[test]
    fn test_random_client_on_empty_registry() {
        let registry = NodeRegistry::new();
        let mut rng = StdRng::seed_from_u64(7);
        assert!(matches!(
            registry.random_client(&mut rng),
            Err(Error::EmptyCluster)
        ));
    }

    #[test]
    fn test_random_client_covers_all_nodes() {
        let mut registry = NodeRegistry::new();
        for port in 5000..5004 {
            registry.insert(node(port)).unwrap();
        }

        let mut rng = StdRng::seed_from_u64(42);
        let seen: BTreeSet<String> = (0..200)
            .map(|_| {
                registry
                    .random_client(&mut rng)
                    .unwrap()
                    .base_url()
                    .to_string()
            })
            .collect();
        assert_eq!(seen.len(), 4);
    }

    proptest! {
        #[test]
        fn prop_names_and_ports_stay_unique(ops in prop::collection::vec((any::<bool>(), 0u16..16), 1..64)) {
            let mut registry = NodeRegistry::new();
            let mut model = BTreeSet::new();

            for (insert, offset) in ops {
                let port = 6000 + offset;
                if insert {
                    let inserted = registry.insert(node(port)).is_ok();
                    prop_assert_eq!(inserted, model.insert(port));
                } else {
                    let removed = registry.remove(&format!("node-{port}")).is_ok();
                    prop_assert_eq!(removed, model.remove(&port));
                }

                let expected: Vec<String> = model.iter().map(|p| format!("node-{p}")).collect();
                prop_assert_eq!(registry.names(), expected);
                prop_assert_eq!(registry.len(), model.len());
            }
        }
    }
}
