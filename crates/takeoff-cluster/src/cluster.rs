//! Cluster lifecycle manager.

use takeoff_client::ApiClient;
use takeoff_config::HarnessConfig;
use tracing::{debug, info, warn};

use crate::node::{Node, NodeInfo, node_name};
use crate::probe::{HealthProber, RetryPolicy};
use crate::registry::NodeRegistry;
use crate::supervisor::{self, ProcessSupervisor};
use crate::{Error, Result};

/// A set of service nodes on consecutive ports.
///
/// The n-th node ever created (0-based) listens on `base_port + n` and is
/// named `node-<port>`. Ports are never reused, so a stopped node's name
/// cannot come back. Dropping the cluster terminates every remaining node.
pub struct Cluster {
    base_port: u16,
    created: u32,
    host: String,
    supervisor: Box<dyn ProcessSupervisor>,
    prober: HealthProber,
    registry: NodeRegistry,
}

impl Cluster {
    /// Creates an empty cluster. No process is started.
    pub fn new(
        base_port: u16,
        supervisor: Box<dyn ProcessSupervisor>,
        prober: HealthProber,
    ) -> Self {
        let host = supervisor.host().to_string();
        Self {
            base_port,
            created: 0,
            host,
            supervisor,
            prober,
            registry: NodeRegistry::new(),
        }
    }

    /// Creates an empty cluster with the supervisor and probe policy from
    /// `config`.
    pub fn from_config(config: &HarnessConfig) -> Result<Self> {
        let supervisor = supervisor::from_settings(&config.supervisor, &config.cluster.host)?;
        let prober = HealthProber::new(RetryPolicy::from(&config.probe));
        Ok(Self::new(config.cluster.base_port, supervisor, prober))
    }

    /// Like [`Cluster::from_config`] with a different base port.
    pub fn from_config_at(config: &HarnessConfig, base_port: u16) -> Result<Self> {
        let mut cluster = Self::from_config(config)?;
        cluster.base_port = base_port;
        Ok(cluster)
    }

    fn check_capacity(&self, count: usize) -> Result<()> {
        if count == 0 {
            return Ok(());
        }
        let last = u64::from(self.base_port) + u64::from(self.created) + count as u64 - 1;
        if last > u64::from(u16::MAX) {
            return Err(Error::PortExhausted {
                base: self.base_port,
                requested: self.created as usize + count,
            });
        }
        Ok(())
    }

    fn next_port(&mut self) -> Result<u16> {
        self.check_capacity(1)?;
        let port = u16::try_from(u32::from(self.base_port) + self.created).map_err(|_| {
            Error::PortExhausted {
                base: self.base_port,
                requested: self.created as usize + 1,
            }
        })?;
        self.created += 1;
        Ok(port)
    }

    /// Spawns one process and registers it as `Starting`.
    fn spawn_node(&mut self) -> Result<String> {
        let port = self.next_port()?;
        let name = node_name(port);
        let client = ApiClient::for_node(&self.host, port)?;

        let handle = self.supervisor.spawn(port, &name)?;
        info!(node = %name, port, "node spawned");

        self.registry.insert(Node::new(handle, client))?;
        Ok(name)
    }

    /// Probes a `Starting` node until healthy.
    fn probe_node(&mut self, name: &str) -> Result<()> {
        let node = self.registry.get_mut(name)?;
        let client = node.client().clone();
        let supervisor = &self.supervisor;

        self.prober
            .wait_until_healthy(name, &client, || supervisor.is_alive(node.handle_mut()))?;
        node.mark_healthy();
        Ok(())
    }

    /// Tears down a node that never became healthy, keeping the probe error.
    ///
    /// If the node cannot be terminated it stays registered as `Starting`
    /// and the startup error says so.
    fn abandon(&mut self, name: &str, error: Error) -> Error {
        let Err(stop_err) = self.stop_node(name) else {
            return error;
        };
        warn!(node = name, error = %stop_err, "failed to clean up unhealthy node");
        match error {
            Error::StartupFailed {
                node,
                attempts,
                reason,
            } => Error::StartupFailed {
                node,
                attempts,
                reason: format!("{reason}; node left registered, cleanup failed: {stop_err}"),
            },
            other => other,
        }
    }

    /// Starts one node and blocks until it is healthy. Returns its name.
    ///
    /// On failure the node is terminated and deregistered again. Should the
    /// termination itself fail, the node stays registered as `Starting` and
    /// the returned error carries both causes; `stop_all` retries it.
    pub fn start_node(&mut self) -> Result<String> {
        let name = self.spawn_node()?;
        if let Err(e) = self.probe_node(&name) {
            return Err(self.abandon(&name, e));
        }
        Ok(name)
    }

    /// Starts `count` nodes on consecutive ports and blocks until all are
    /// healthy. Returns their names in port order.
    ///
    /// All processes are spawned before any is probed. If one never becomes
    /// healthy the remaining probes are skipped, the unhealthy node is torn
    /// down and the error is returned; nodes that did become healthy stay
    /// registered.
    pub fn start_nodes(&mut self, count: usize) -> Result<Vec<String>> {
        if count == 0 {
            return Err(Error::InvalidNodeCount(count));
        }
        self.check_capacity(count)?;

        let mut names = Vec::with_capacity(count);
        for _ in 0..count {
            names.push(self.spawn_node()?);
        }

        for name in &names {
            if let Err(e) = self.probe_node(name) {
                return Err(self.abandon(name, e));
            }
        }

        info!(count, base_port = self.base_port, "cluster nodes healthy");
        Ok(names)
    }

    /// Forcibly terminates a node and removes it from the cluster.
    ///
    /// If termination fails the node stays registered.
    pub fn stop_node(&mut self, name: &str) -> Result<NodeInfo> {
        let node = self.registry.get_mut(name)?;
        self.supervisor.terminate(node.handle_mut())?;

        let stopped = self.registry.remove(name)?.into_stopped();
        info!(node = name, port = stopped.port, "node stopped");
        Ok(stopped)
    }

    /// Stops every node. Every node is attempted even if some fail; the
    /// first failure is returned.
    pub fn stop_all(&mut self) -> Result<()> {
        let mut first_error = None;

        for name in self.registry.names() {
            if let Err(e) = self.stop_node(&name) {
                warn!(node = %name, error = %e, "failed to stop node");
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => {
                debug!("all nodes stopped");
                Ok(())
            }
        }
    }

    /// Client bound to the named node.
    pub fn client(&self, name: &str) -> Result<ApiClient> {
        Ok(self.registry.get(name)?.client().clone())
    }

    /// Client of a uniformly random live node.
    pub fn some_client(&self) -> Result<ApiClient> {
        self.registry.random_client(&mut rand::thread_rng())
    }

    /// Names of all live nodes, in port order.
    pub fn node_names(&self) -> Vec<String> {
        self.registry.names()
    }

    /// One client per live node, in port order.
    pub fn clients(&self) -> Vec<ApiClient> {
        self.registry.clients()
    }

    /// `(name, client)` per live node, in port order.
    pub fn named_clients(&self) -> Vec<(String, ApiClient)> {
        self.registry.named_clients()
    }

    /// Snapshot of one node.
    pub fn node(&self, name: &str) -> Result<NodeInfo> {
        Ok(self.registry.get(name)?.info())
    }

    /// Snapshot of all live nodes, in port order.
    pub fn status(&self) -> Vec<NodeInfo> {
        self.registry.infos()
    }

    pub fn len(&self) -> usize {
        self.registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }

    pub fn base_port(&self) -> u16 {
        self.base_port
    }

    pub fn host(&self) -> &str {
        &self.host
    }
}

impl Drop for Cluster {
    fn drop(&mut self) {
        if self.registry.is_empty() {
            return;
        }
        warn!(nodes = self.registry.len(), "cluster dropped with live nodes, stopping them");
        if let Err(e) = self.stop_all() {
            warn!(error = %e, "failed to stop all nodes on drop");
        }
    }
}
