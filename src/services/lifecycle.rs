//! Workload lifecycle: materialize or tear down the container+network pair.

use std::sync::Arc;

use crate::models::workload::{LifecycleReport, LifecycleStatus, WorkloadSpec};
use crate::runtime::RuntimeConnector;

/// Drives the container runtime through the ordered start chain and the
/// idempotent lookup-then-act stop.
///
/// Every call builds a fresh runtime client and re-resolves the workload by
/// name filter, so start/stop stay correct across process restarts; no
/// handle is cached between calls.
pub struct LifecycleManager {
    connector: Arc<dyn RuntimeConnector>,
    workload: WorkloadSpec,
}

impl LifecycleManager {
    pub fn new(connector: Arc<dyn RuntimeConnector>, workload: WorkloadSpec) -> Self {
        Self {
            connector,
            workload,
        }
    }

    /// Client → image → network → container → running. Each step failure
    /// maps to its own classification.
    pub async fn start(&self) -> LifecycleReport {
        let spec = self.workload.clone();

        let runtime = match self.connector.connect().await {
            Ok(rt) => rt,
            Err(e) => {
                tracing::error!(error = %e, "runtime client init failed");
                return LifecycleReport::failed(LifecycleStatus::ClientInitError, spec, e.to_string());
            }
        };

        if let Err(e) = runtime.pull_image(&spec.image).await {
            tracing::error!(image = %spec.image, error = %e, "image pull failed");
            return LifecycleReport::failed(LifecycleStatus::ImagePullError, spec, e.to_string());
        }

        match runtime.create_network(&spec.network_name).await {
            Ok(id) => tracing::info!(network = %spec.network_name, %id, "created network"),
            Err(e) => {
                tracing::error!(network = %spec.network_name, error = %e, "network create failed");
                return LifecycleReport::failed(
                    LifecycleStatus::NetworkCreateError,
                    spec,
                    e.to_string(),
                );
            }
        }

        match runtime.create_container(&spec).await {
            Ok(id) => tracing::info!(container = %spec.container_name, %id, "created container"),
            Err(e) => {
                tracing::error!(container = %spec.container_name, error = %e, "container create failed");
                return LifecycleReport::failed(
                    LifecycleStatus::ContainerCreateError,
                    spec,
                    e.to_string(),
                );
            }
        }

        if let Err(e) = runtime.start_container(&spec.container_name).await {
            tracing::error!(container = %spec.container_name, error = %e, "container start failed");
            return LifecycleReport::failed(LifecycleStatus::ContainerStartError, spec, e.to_string());
        }

        tracing::info!(container = %spec.container_name, "workload started");
        LifecycleReport::new(LifecycleStatus::ContainerStarted, spec)
    }

    /// Lookup-then-act teardown. Nothing found is "already stopped", not an
    /// error; more than one match of either kind is an invariant violation
    /// and nothing is touched.
    pub async fn stop(&self) -> LifecycleReport {
        let spec = self.workload.clone();

        let runtime = match self.connector.connect().await {
            Ok(rt) => rt,
            Err(e) => {
                tracing::error!(error = %e, "runtime client init failed");
                return LifecycleReport::failed(LifecycleStatus::ClientInitError, spec, e.to_string());
            }
        };

        let containers = match runtime.list_containers(&spec.container_name).await {
            Ok(c) => c,
            Err(e) => {
                tracing::error!(error = %e, "container list failed");
                return LifecycleReport::failed(
                    LifecycleStatus::ContainerListError,
                    spec,
                    e.to_string(),
                );
            }
        };

        let networks = match runtime.list_networks(&spec.network_name).await {
            Ok(n) => n,
            Err(e) => {
                tracing::error!(error = %e, "network list failed");
                return LifecycleReport::failed(
                    LifecycleStatus::NetworkListError,
                    spec,
                    e.to_string(),
                );
            }
        };

        if containers.is_empty() && networks.is_empty() {
            tracing::info!(container = %spec.container_name, "nothing to stop");
            return LifecycleReport::new(LifecycleStatus::ContainerDoesNotExistError, spec);
        }

        if containers.len() > 1 || networks.len() > 1 {
            tracing::error!(
                containers = containers.len(),
                networks = networks.len(),
                "name filter matched more than one resource"
            );
            return LifecycleReport::failed(
                LifecycleStatus::LookupAmbiguousError,
                spec,
                format!(
                    "{} containers and {} networks match the configured names",
                    containers.len(),
                    networks.len()
                ),
            );
        }

        if containers.len() == 1 {
            if let Err(e) = runtime.stop_container(&spec.container_name).await {
                tracing::error!(container = %spec.container_name, error = %e, "container stop failed");
                return LifecycleReport::failed(
                    LifecycleStatus::ContainerStopError,
                    spec,
                    e.to_string(),
                );
            }
        }

        if networks.len() == 1 {
            if let Err(e) = runtime.remove_network(&spec.network_name).await {
                tracing::error!(network = %spec.network_name, error = %e, "network remove failed");
                return LifecycleReport::failed(
                    LifecycleStatus::NetworkRemoveError,
                    spec,
                    e.to_string(),
                );
            }
        }

        tracing::info!(container = %spec.container_name, "workload stopped");
        LifecycleReport::new(LifecycleStatus::ContainerStopped, spec)
    }
}
