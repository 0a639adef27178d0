//! Supervisor that runs fake nodes inside the test process.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use takeoff_cluster::{Error, NodeHandle, ProcessSupervisor, Result};
use tracing::debug;

use crate::http::HttpServer;
use crate::service::{FakeTakeOff, ResponseFilter};

#[derive(Default)]
struct Servers {
    by_port: HashMap<u16, HttpServer>,
    spawned: usize,
    terminated: usize,
}

/// Serves a [`FakeTakeOff`] node on each spawned port.
///
/// Clones share state, so a test can keep one clone to inspect or crash
/// nodes while the cluster owns another.
#[derive(Clone, Default)]
pub struct InProcessSupervisor {
    service: FakeTakeOff,
    servers: Arc<Mutex<Servers>>,
    filter: Option<ResponseFilter>,
}

impl InProcessSupervisor {
    pub fn new(service: FakeTakeOff) -> Self {
        Self {
            service,
            servers: Arc::default(),
            filter: None,
        }
    }

    /// Nodes spawned from now on answer through `filter`.
    #[must_use]
    pub fn with_filter(mut self, filter: ResponseFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn service(&self) -> &FakeTakeOff {
        &self.service
    }

    /// Kills the node on `port` behind the cluster's back.
    pub fn crash(&self, port: u16) {
        if let Some(mut server) = self.lock().by_port.remove(&port) {
            server.shutdown();
        }
        self.service.mark_down(port);
    }

    /// Ports currently served.
    pub fn running_ports(&self) -> Vec<u16> {
        let mut ports: Vec<u16> = self.lock().by_port.keys().copied().collect();
        ports.sort_unstable();
        ports
    }

    pub fn spawned(&self) -> usize {
        self.lock().spawned
    }

    pub fn terminated(&self) -> usize {
        self.lock().terminated
    }

    fn lock(&self) -> MutexGuard<'_, Servers> {
        self.servers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ProcessSupervisor for InProcessSupervisor {
    fn spawn(&self, port: u16, name: &str) -> Result<NodeHandle> {
        let served = match &self.filter {
            Some(filter) => self.service.serve_filtered(port, name, Arc::clone(filter)),
            None => self.service.serve(port, name),
        };
        let server = served.map_err(|e| Error::SpawnFailed {
            node: name.to_string(),
            reason: e.to_string(),
        })?;

        let mut servers = self.lock();
        servers.by_port.insert(port, server);
        servers.spawned += 1;
        debug!(node = name, port, "fake node spawned");
        Ok(NodeHandle::managed(port))
    }

    fn terminate(&self, handle: &mut NodeHandle) -> Result<()> {
        let port = handle.port();
        let server = {
            let mut servers = self.lock();
            servers.terminated += 1;
            servers.by_port.remove(&port)
        };
        if let Some(mut server) = server {
            server.shutdown();
        }
        self.service.mark_down(port);
        Ok(())
    }

    fn is_alive(&self, handle: &mut NodeHandle) -> bool {
        self.lock().by_port.contains_key(&handle.port())
    }

    fn host(&self) -> &str {
        "127.0.0.1"
    }
}
