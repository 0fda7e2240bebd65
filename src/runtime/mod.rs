//! Container runtime control-plane abstraction.
//!
//! The lifecycle manager never holds a live client: every start/stop call
//! obtains a fresh runtime through [`RuntimeConnector`] and re-resolves the
//! workload by name filter. The traits exist so tests can run against a
//! fake instead of a real daemon.

pub mod docker;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::workload::WorkloadSpec;

#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("runtime connection failed: {0}")]
    Connect(String),

    #[error("{0}")]
    Api(String),
}

pub type Result<T> = std::result::Result<T, RuntimeError>;

/// One connected control-plane session with the container runtime.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    async fn pull_image(&self, image: &str) -> Result<()>;

    /// Create an isolated network, returning its id.
    async fn create_network(&self, name: &str) -> Result<String>;

    /// Create the workload container, returning its id.
    async fn create_container(&self, spec: &WorkloadSpec) -> Result<String>;

    async fn start_container(&self, name: &str) -> Result<()>;

    /// Ids of containers whose name matches the filter.
    async fn list_containers(&self, name: &str) -> Result<Vec<String>>;

    /// Ids of networks whose name matches the filter.
    async fn list_networks(&self, name: &str) -> Result<Vec<String>>;

    /// Forced stop with a zero-second grace period.
    async fn stop_container(&self, name: &str) -> Result<()>;

    async fn remove_network(&self, name: &str) -> Result<()>;
}

/// Produces a fresh [`ContainerRuntime`] per lifecycle call.
#[async_trait]
pub trait RuntimeConnector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn ContainerRuntime>>;
}

#[cfg(test)]
pub mod fakes {
    //! Scriptable in-memory runtime for lifecycle tests.

    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};

    use super::*;

    /// Steps that can be made to fail.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum FailStep {
        Pull,
        NetworkCreate,
        ContainerCreate,
        ContainerStart,
        ContainerList,
        NetworkList,
        ContainerStop,
        NetworkRemove,
    }

    #[derive(Default)]
    pub struct FakeState {
        pub containers: Mutex<Vec<String>>,
        pub running: Mutex<Vec<String>>,
        pub networks: Mutex<Vec<String>>,
        pub fail_on: Mutex<Option<FailStep>>,
        pub connect_fails: AtomicBool,
    }

    impl FakeState {
        pub fn fail_on(&self, step: FailStep) {
            *self.fail_on.lock().unwrap() = Some(step);
        }

        fn check(&self, step: FailStep) -> Result<()> {
            if *self.fail_on.lock().unwrap() == Some(step) {
                return Err(RuntimeError::Api(format!("injected failure at {step:?}")));
            }
            Ok(())
        }
    }

    pub struct FakeRuntime(pub Arc<FakeState>);

    #[async_trait]
    impl ContainerRuntime for FakeRuntime {
        async fn pull_image(&self, _image: &str) -> Result<()> {
            self.0.check(FailStep::Pull)
        }

        async fn create_network(&self, name: &str) -> Result<String> {
            self.0.check(FailStep::NetworkCreate)?;
            self.0.networks.lock().unwrap().push(name.to_string());
            Ok(format!("net-{name}"))
        }

        async fn create_container(&self, spec: &WorkloadSpec) -> Result<String> {
            self.0.check(FailStep::ContainerCreate)?;
            self.0
                .containers
                .lock()
                .unwrap()
                .push(spec.container_name.clone());
            Ok(format!("ctr-{}", spec.container_name))
        }

        async fn start_container(&self, name: &str) -> Result<()> {
            self.0.check(FailStep::ContainerStart)?;
            self.0.running.lock().unwrap().push(name.to_string());
            Ok(())
        }

        async fn list_containers(&self, name: &str) -> Result<Vec<String>> {
            self.0.check(FailStep::ContainerList)?;
            Ok(self
                .0
                .containers
                .lock()
                .unwrap()
                .iter()
                .filter(|c| c.as_str() == name)
                .cloned()
                .collect())
        }

        async fn list_networks(&self, name: &str) -> Result<Vec<String>> {
            self.0.check(FailStep::NetworkList)?;
            Ok(self
                .0
                .networks
                .lock()
                .unwrap()
                .iter()
                .filter(|n| n.as_str() == name)
                .cloned()
                .collect())
        }

        async fn stop_container(&self, name: &str) -> Result<()> {
            self.0.check(FailStep::ContainerStop)?;
            self.0.containers.lock().unwrap().retain(|c| c != name);
            self.0.running.lock().unwrap().retain(|c| c != name);
            Ok(())
        }

        async fn remove_network(&self, name: &str) -> Result<()> {
            self.0.check(FailStep::NetworkRemove)?;
            self.0.networks.lock().unwrap().retain(|n| n != name);
            Ok(())
        }
    }

    pub struct FakeConnector(pub Arc<FakeState>);

    #[async_trait]
    impl RuntimeConnector for FakeConnector {
        async fn connect(&self) -> Result<Box<dyn ContainerRuntime>> {
            if self.0.connect_fails.load(Ordering::SeqCst) {
                return Err(RuntimeError::Connect("injected connect failure".into()));
            }
            Ok(Box::new(FakeRuntime(self.0.clone())))
        }
    }
}
