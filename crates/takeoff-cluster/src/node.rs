//! Node records and process handles.

use std::fmt;
use std::process::Child;
use takeoff_client::ApiClient;

/// Status of a cluster node.
///
/// `Starting` → `Healthy` → `Stopped`. A node that is not registered yet has
/// no status at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeStatus {
    /// Spawned, not yet answering health checks.
    Starting,

    /// Answered one health check.
    Healthy,

    /// Terminated. Terminal; the name and port are never reused.
    Stopped,
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NodeStatus::Starting => "starting",
            NodeStatus::Healthy => "healthy",
            NodeStatus::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// Name of the node bound to `port`.
pub fn node_name(port: u16) -> String {
    format!("node-{port}")
}

/// What a supervisor needs to tear a node down again.
#[derive(Debug)]
pub enum HandleKind {
    /// The spawned child is the service itself.
    Child(Child),

    /// The launcher daemonized; the service is found by its listening port.
    Detached,

    /// Container started by a container runtime.
    Container { id: String },

    /// Tracked by the supervisor itself, keyed by port.
    Managed,
}

/// Process or container handle owned by exactly one node.
#[derive(Debug)]
pub struct NodeHandle {
    port: u16,
    kind: HandleKind,
}

impl NodeHandle {
    pub fn child(port: u16, child: Child) -> Self {
        Self {
            port,
            kind: HandleKind::Child(child),
        }
    }

    pub fn detached(port: u16) -> Self {
        Self {
            port,
            kind: HandleKind::Detached,
        }
    }

    pub fn container(port: u16, id: impl Into<String>) -> Self {
        Self {
            port,
            kind: HandleKind::Container { id: id.into() },
        }
    }

    pub fn managed(port: u16) -> Self {
        Self {
            port,
            kind: HandleKind::Managed,
        }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn kind(&self) -> &HandleKind {
        &self.kind
    }

    pub fn kind_mut(&mut self) -> &mut HandleKind {
        &mut self.kind
    }
}

/// Snapshot of a node's identity and state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeInfo {
    pub name: String,
    pub port: u16,
    pub status: NodeStatus,
}

/// A registered node.
pub(crate) struct Node {
    name: String,
    port: u16,
    handle: NodeHandle,
    client: ApiClient,
    status: NodeStatus,
}

impl Node {
    /// A freshly spawned node, in `Starting`.
    pub(crate) fn new(handle: NodeHandle, client: ApiClient) -> Self {
        let port = handle.port();
        Self {
            name: node_name(port),
            port,
            handle,
            client,
            status: NodeStatus::Starting,
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn port(&self) -> u16 {
        self.port
    }

    pub(crate) fn client(&self) -> &ApiClient {
        &self.client
    }

    pub(crate) fn status(&self) -> NodeStatus {
        self.status
    }

    pub(crate) fn handle_mut(&mut self) -> &mut NodeHandle {
        &mut self.handle
    }

    /// Starting → Healthy. Any other transition is ignored.
    pub(crate) fn mark_healthy(&mut self) {
        if self.status == NodeStatus::Starting {
            self.status = NodeStatus::Healthy;
        }
    }

    pub(crate) fn info(&self) -> NodeInfo {
        NodeInfo {
            name: self.name.clone(),
            port: self.port,
            status: self.status,
        }
    }

    /// Consumes a terminated node.
    pub(crate) fn into_stopped(self) -> NodeInfo {
        NodeInfo {
            name: self.name,
            port: self.port,
            status: NodeStatus::Stopped,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_node(port: u16) -> Node {
        let client = ApiClient::for_node("127.0.0.1", port).unwrap();
        Node::new(NodeHandle::managed(port), client)
    }

    #[test]
    fn test_node_creation() {
        let node = test_node(27220);

        assert_eq!(node.name(), "node-27220");
        assert_eq!(node.port(), 27220);
        assert_eq!(node.status(), NodeStatus::Starting);
        assert_eq!(node.client().base_url(), "http://127.0.0.1:27220");
    }

    #[test]
    fn test_status_transitions() {
        let mut node = test_node(27221);

        node.mark_healthy();
        assert_eq!(node.status(), NodeStatus::Healthy);

        node.mark_healthy();
        assert_eq!(node.status(), NodeStatus::Healthy);

        let stopped = node.into_stopped();
        assert_eq!(stopped.status, NodeStatus::Stopped);
        assert_eq!(stopped.name, "node-27221");
    }

    #[test]
    fn test_handle_kinds() {
        assert!(matches!(NodeHandle::detached(1).kind(), HandleKind::Detached));
        assert!(matches!(
            NodeHandle::container(2, "abc").kind(),
            HandleKind::Container { id } if id == "abc"
        ));
        assert_eq!(NodeHandle::managed(3).port(), 3);
    }
}
