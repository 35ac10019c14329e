//! In-memory container runtime shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use run_local::container::{ContainerDescriptor, ContainerRuntime};
use run_local::docker::DockerError;
use std::collections::HashMap;
use std::net::TcpListener;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Containers by name, `true` when running.
pub struct FakeRuntime {
    pub available: bool,
    pub ready: bool,
    pub fail_create: bool,
    pub containers: Mutex<HashMap<String, bool>>,
    pub creates: AtomicU32,
    pub resumes: AtomicU32,
    pub probes: AtomicU32,
    pub stopped: Mutex<Vec<String>>,
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self {
            available: true,
            ready: true,
            fail_create: false,
            containers: Mutex::new(HashMap::new()),
            creates: AtomicU32::new(0),
            resumes: AtomicU32::new(0),
            probes: AtomicU32::new(0),
            stopped: Mutex::new(Vec::new()),
        }
    }

    pub fn absent() -> Self {
        Self {
            available: false,
            ..Self::new()
        }
    }

    pub fn with_stopped_container(self, name: &str) -> Self {
        self.containers
            .lock()
            .unwrap()
            .insert(name.to_string(), false);
        self
    }

    pub fn count(&self, name: &str) -> usize {
        self.containers
            .lock()
            .unwrap()
            .keys()
            .filter(|k| k.as_str() == name)
            .count()
    }

    fn unavailable(&self) -> DockerError {
        DockerError::exec_failed(
            "docker inspect",
            std::io::Error::new(std::io::ErrorKind::NotFound, "docker: not found"),
        )
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn available(&self) -> bool {
        self.available
    }

    async fn is_running(&self, name: &str) -> bool {
        self.containers
            .lock()
            .unwrap()
            .get(name)
            .copied()
            .unwrap_or(false)
    }

    async fn exists(&self, name: &str) -> Result<bool, DockerError> {
        if !self.available {
            return Err(self.unavailable());
        }
        Ok(self.containers.lock().unwrap().contains_key(name))
    }

    async fn start(&self, name: &str) -> Result<(), DockerError> {
        let mut containers = self.containers.lock().unwrap();
        match containers.get_mut(name) {
            Some(running) => {
                *running = true;
                self.resumes.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
            None => Err(DockerError::ContainerNotFound {
                container: name.to_string(),
            }),
        }
    }

    async fn create(&self, desc: &ContainerDescriptor) -> Result<(), DockerError> {
        if self.fail_create {
            return Err(DockerError::CommandFailed {
                command: format!("docker run {}", desc.image),
                exit_code: Some(125),
                stderr: "pull access denied".to_string(),
            });
        }
        let mut containers = self.containers.lock().unwrap();
        if containers.contains_key(&desc.name) {
            return Err(DockerError::CommandFailed {
                command: "docker run".to_string(),
                exit_code: Some(125),
                stderr: format!(
                    "Conflict. The container name \"/{}\" is already in use",
                    desc.name
                ),
            });
        }
        containers.insert(desc.name.clone(), true);
        self.creates.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&self, name: &str) -> Result<(), DockerError> {
        if let Some(running) = self.containers.lock().unwrap().get_mut(name) {
            *running = false;
        }
        self.stopped.lock().unwrap().push(name.to_string());
        Ok(())
    }

    async fn exec(
        &self,
        _name: &str,
        _argv: &[String],
        _timeout: Duration,
    ) -> Result<bool, DockerError> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        Ok(self.ready)
    }
}

/// A port nothing listens on (probe-then-release; races are accepted).
pub fn free_port() -> u16 {
    let listener = TcpListener::bind(("127.0.0.1", 0)).unwrap();
    listener.local_addr().unwrap().port()
}

/// The built-in descriptor moved to a free host port.
pub fn on_free_port(mut desc: ContainerDescriptor) -> ContainerDescriptor {
    desc.host_port = free_port();
    desc
}
