//! Process supervisors: how a node is launched and torn down.

use std::fs::{self, OpenOptions};
use std::process::{Command, Stdio};
use takeoff_config::{
    ContainerSettings, HOST_PLACEHOLDER, NAME_PLACEHOLDER, PORT_PLACEHOLDER, ProcessSettings,
    SupervisorKind, SupervisorSettings, parse_env_entries,
};
use tracing::{debug, warn};

use crate::node::{HandleKind, NodeHandle};
use crate::{Error, Result};

/// Launches service instances and forcibly terminates them.
///
/// Implementations must be shareable across threads; the cluster manager
/// owns one behind a `Box<dyn ProcessSupervisor>`.
pub trait ProcessSupervisor: Send + Sync {
    /// Starts one instance bound to `port`, identified by `name`.
    fn spawn(&self, port: u16, name: &str) -> Result<NodeHandle>;

    /// Forcibly terminates the instance behind `handle`.
    fn terminate(&self, handle: &mut NodeHandle) -> Result<()>;

    /// Whether the instance is still running. Supervisors that cannot tell
    /// report `true` and leave the verdict to health probing.
    fn is_alive(&self, _handle: &mut NodeHandle) -> bool {
        true
    }

    /// Host the instances listen on.
    fn host(&self) -> &str;
}

/// Builds the supervisor selected by `settings.kind`.
pub fn from_settings(
    settings: &SupervisorSettings,
    host: &str,
) -> Result<Box<dyn ProcessSupervisor>> {
    Ok(match settings.kind {
        SupervisorKind::Process => Box::new(LocalProcessSupervisor::new(
            settings.process.clone(),
            host,
        )?),
        SupervisorKind::Container => Box::new(ContainerSupervisor::new(
            settings.container.clone(),
            host,
        )?),
    })
}

/// Replaces `{port}`, `{name}` and `{host}` in a launch template.
pub fn expand_template(template: &str, port: u16, name: &str, host: &str) -> String {
    template
        .replace(PORT_PLACEHOLDER, &port.to_string())
        .replace(NAME_PLACEHOLDER, name)
        .replace(HOST_PLACEHOLDER, host)
}

/// Runs each node as an operating-system process on this machine.
///
/// In detached mode the launcher is expected to daemonize the service and
/// exit; termination then kills whatever listens on the node's port.
#[derive(Debug)]
pub struct LocalProcessSupervisor {
    settings: ProcessSettings,
    env: Vec<(String, String)>,
    host: String,
}

impl LocalProcessSupervisor {
    pub fn new(settings: ProcessSettings, host: impl Into<String>) -> Result<Self> {
        let env = parse_env_entries(&settings.env)?;
        Ok(Self {
            settings,
            env,
            host: host.into(),
        })
    }

    fn command(&self, port: u16, name: &str) -> Result<Command> {
        let mut command = Command::new(&self.settings.program);
        command
            .args(
                self.settings
                    .args
                    .iter()
                    .map(|arg| expand_template(arg, port, name, &self.host)),
            )
            .envs(
                self.env
                    .iter()
                    .map(|(key, value)| (key, expand_template(value, port, name, &self.host))),
            )
            .stdin(Stdio::null());

        if let Some(dir) = &self.settings.working_dir {
            command.current_dir(dir);
        }

        match &self.settings.log_dir {
            Some(dir) => {
                fs::create_dir_all(dir)?;
                let log = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(dir.join(format!("{name}.log")))?;
                command.stdout(log.try_clone()?).stderr(log);
            }
            None => {
                command.stdout(Stdio::null()).stderr(Stdio::null());
            }
        }

        Ok(command)
    }
}

impl ProcessSupervisor for LocalProcessSupervisor {
    fn spawn(&self, port: u16, name: &str) -> Result<NodeHandle> {
        let mut command = self.command(port, name)?;
        debug!(node = name, port, program = %self.settings.program, "spawning node process");

        let mut child = command.spawn().map_err(|e| Error::SpawnFailed {
            node: name.to_string(),
            reason: e.to_string(),
        })?;

        if !self.settings.detached {
            return Ok(NodeHandle::child(port, child));
        }

        let status = child.wait()?;
        if !status.success() {
            return Err(Error::SpawnFailed {
                node: name.to_string(),
                reason: format!("launcher exited with {status}"),
            });
        }
        Ok(NodeHandle::detached(port))
    }

    fn terminate(&self, handle: &mut NodeHandle) -> Result<()> {
        let port = handle.port();
        match handle.kind_mut() {
            HandleKind::Child(child) => {
                if child.try_wait()?.is_some() {
                    return Ok(());
                }
                child.kill().map_err(|e| Error::TerminateFailed {
                    port,
                    reason: e.to_string(),
                })?;
                child.wait()?;
                Ok(())
            }
            HandleKind::Detached => kill_listener(port),
            HandleKind::Container { .. } | HandleKind::Managed => Err(Error::TerminateFailed {
                port,
                reason: "handle was not created by a local process supervisor".to_string(),
            }),
        }
    }

    fn is_alive(&self, handle: &mut NodeHandle) -> bool {
        match handle.kind_mut() {
            HandleKind::Child(child) => matches!(child.try_wait(), Ok(None)),
            _ => true,
        }
    }

    fn host(&self) -> &str {
        &self.host
    }
}

/// Sends SIGKILL to every process listening on TCP `port`.
fn kill_listener(port: u16) -> Result<()> {
    let output = Command::new("lsof")
        .args(["-s", "TCP:LISTEN", "-t", "-i"])
        .arg(format!("tcp:{port}"))
        .output()
        .map_err(|e| Error::TerminateFailed {
            port,
            reason: format!("lsof unavailable: {e}"),
        })?;

    let pids: Vec<String> = String::from_utf8_lossy(&output.stdout)
        .split_whitespace()
        .map(str::to_string)
        .collect();

    if pids.is_empty() {
        warn!(port, "no process listening, treating node as already gone");
        return Ok(());
    }

    for pid in &pids {
        let status = Command::new("kill").args(["-9", pid.as_str()]).status()?;
        if !status.success() {
            return Err(Error::TerminateFailed {
                port,
                reason: format!("kill -9 {pid} exited with {status}"),
            });
        }
    }

    debug!(port, ?pids, "killed listening processes");
    Ok(())
}

/// Runs each node as a container through a docker-compatible runtime.
#[derive(Debug)]
pub struct ContainerSupervisor {
    settings: ContainerSettings,
    env: Vec<(String, String)>,
    host: String,
}

impl ContainerSupervisor {
    pub fn new(settings: ContainerSettings, host: impl Into<String>) -> Result<Self> {
        let env = parse_env_entries(&settings.env)?;
        Ok(Self {
            settings,
            env,
            host: host.into(),
        })
    }

    /// Arguments passed to the runtime to start a node.
    pub fn run_args(&self, port: u16, name: &str) -> Vec<String> {
        let mut args = vec![
            "run".to_string(),
            "-d".to_string(),
            "--name".to_string(),
            name.to_string(),
        ];

        match self.settings.network.as_deref() {
            Some("host") => args.extend(["--network".to_string(), "host".to_string()]),
            Some(network) => {
                args.extend(["--network".to_string(), network.to_string()]);
                args.extend([
                    "-p".to_string(),
                    format!("{port}:{}", self.settings.container_port),
                ]);
            }
            None => args.extend([
                "-p".to_string(),
                format!("{port}:{}", self.settings.container_port),
            ]),
        }

        for (key, value) in &self.env {
            args.push("-e".to_string());
            args.push(format!(
                "{key}={}",
                expand_template(value, port, name, &self.host)
            ));
        }

        args.push(self.settings.image.clone());
        args.extend(
            self.settings
                .args
                .iter()
                .map(|arg| expand_template(arg, port, name, &self.host)),
        );
        args
    }

    fn runtime(&self) -> Command {
        Command::new(&self.settings.runtime)
    }
}

impl ProcessSupervisor for ContainerSupervisor {
    fn spawn(&self, port: u16, name: &str) -> Result<NodeHandle> {
        debug!(node = name, port, image = %self.settings.image, "starting node container");

        let output = self
            .runtime()
            .args(self.run_args(port, name))
            .stdin(Stdio::null())
            .output()
            .map_err(|e| Error::SpawnFailed {
                node: name.to_string(),
                reason: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(Error::SpawnFailed {
                node: name.to_string(),
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let id = String::from_utf8_lossy(&output.stdout).trim().to_string();
        Ok(NodeHandle::container(port, id))
    }

    fn terminate(&self, handle: &mut NodeHandle) -> Result<()> {
        let port = handle.port();
        let HandleKind::Container { id } = handle.kind() else {
            return Err(Error::TerminateFailed {
                port,
                reason: "handle was not created by a container supervisor".to_string(),
            });
        };

        let output = self.runtime().args(["rm", "-f", id.as_str()]).output()?;
        if !output.status.success() {
            return Err(Error::TerminateFailed {
                port,
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }

    fn is_alive(&self, handle: &mut NodeHandle) -> bool {
        let HandleKind::Container { id } = handle.kind() else {
            return false;
        };

        self.runtime()
            .args(["inspect", "-f", "{{.State.Running}}", id.as_str()])
            .output()
            .is_ok_and(|output| {
                output.status.success() && String::from_utf8_lossy(&output.stdout).trim() == "true"
            })
    }

    fn host(&self) -> &str {
        &self.host
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_template() {
        assert_eq!(
            expand_template("{name}@{host}", 27220, "node-27220", "127.0.0.1"),
            "node-27220@127.0.0.1"
        );
        assert_eq!(expand_template("PORT={port}", 27221, "n", "h"), "PORT=27221");
        assert_eq!(expand_template("plain", 1, "n", "h"), "plain");
    }

    #[test]
    fn test_invalid_env_entry_rejected() {
        let settings = ProcessSettings {
            env: vec!["NOT_AN_ASSIGNMENT".to_string()],
            ..ProcessSettings::default()
        };
        assert!(matches!(
            LocalProcessSupervisor::new(settings, "127.0.0.1"),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_container_run_args_host_network() {
        let supervisor =
            ContainerSupervisor::new(ContainerSettings::default(), "127.0.0.1").unwrap();
        let args = supervisor.run_args(27220, "node-27220");

        assert_eq!(&args[..4], ["run", "-d", "--name", "node-27220"]);
        assert!(args.windows(2).any(|w| w == ["--network", "host"]));
        assert!(!args.contains(&"-p".to_string()));
        assert!(args.contains(&"PORT=27220".to_string()));
        assert!(args.contains(&"NODE_NAME=node-27220".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("iasc-take-off:latest"));
    }

    #[test]
    fn test_container_run_args_published_port() {
        let settings = ContainerSettings {
            network: None,
            args: vec!["--port".to_string(), "{port}".to_string()],
            ..ContainerSettings::default()
        };
        let supervisor = ContainerSupervisor::new(settings, "127.0.0.1").unwrap();
        let args = supervisor.run_args(27300, "node-27300");

        assert!(args.windows(2).any(|w| w == ["-p", "27300:4000"]));
        assert_eq!(&args[args.len() - 2..], ["--port", "27300"]);
    }

    #[test]
    fn test_container_terminate_rejects_foreign_handle() {
        let supervisor =
            ContainerSupervisor::new(ContainerSettings::default(), "127.0.0.1").unwrap();
        let mut handle = NodeHandle::managed(27220);
        assert!(matches!(
            supervisor.terminate(&mut handle),
            Err(Error::TerminateFailed { port: 27220, .. })
        ));
    }

    #[cfg(unix)]
    fn process_settings(program: &str, args: &[&str], detached: bool) -> ProcessSettings {
        ProcessSettings {
            program: program.to_string(),
            args: args.iter().map(|a| (*a).to_string()).collect(),
            env: vec!["PORT={port}".to_string()],
            working_dir: None,
            detached,
            log_dir: None,
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_attached_process_lifecycle() {
        let supervisor =
            LocalProcessSupervisor::new(process_settings("sleep", &["30"], false), "127.0.0.1")
                .unwrap();

        let mut handle = supervisor.spawn(40001, "node-40001").unwrap();
        assert!(matches!(handle.kind(), HandleKind::Child(_)));
        assert!(supervisor.is_alive(&mut handle));

        supervisor.terminate(&mut handle).unwrap();
        assert!(!supervisor.is_alive(&mut handle));
    }

    #[cfg(unix)]
    #[test]
    fn test_detached_launcher_exit_status() {
        let ok = LocalProcessSupervisor::new(process_settings("true", &[], true), "127.0.0.1")
            .unwrap();
        let handle = ok.spawn(40002, "node-40002").unwrap();
        assert!(matches!(handle.kind(), HandleKind::Detached));

        let failing =
            LocalProcessSupervisor::new(process_settings("false", &[], true), "127.0.0.1")
                .unwrap();
        assert!(matches!(
            failing.spawn(40003, "node-40003"),
            Err(Error::SpawnFailed { .. })
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_log_dir_receives_output() {
        let temp = tempfile::tempdir().unwrap();
        let settings = ProcessSettings {
            log_dir: Some(temp.path().join("logs")),
            ..process_settings("sh", &["-c", "echo started on $PORT"], true)
        };
        let supervisor = LocalProcessSupervisor::new(settings, "127.0.0.1").unwrap();

        supervisor.spawn(40004, "node-40004").unwrap();

        let log = fs::read_to_string(temp.path().join("logs").join("node-40004.log")).unwrap();
        assert_eq!(log.trim(), "started on 40004");
    }

    #[test]
    fn test_missing_program_is_spawn_failure() {
        let settings = ProcessSettings {
            program: "takeoff-definitely-not-a-program".to_string(),
            args: Vec::new(),
            env: Vec::new(),
            working_dir: None,
            detached: false,
            log_dir: None,
        };
        let supervisor = LocalProcessSupervisor::new(settings, "127.0.0.1").unwrap();
        assert!(matches!(
            supervisor.spawn(40005, "node-40005"),
            Err(Error::SpawnFailed { node, .. }) if node == "node-40005"
        ));
    }
}
