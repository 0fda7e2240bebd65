//! The managed workload: one container attached to one isolated network.

use std::path::PathBuf;

use serde::Serialize;

use crate::config::AppConfig;

/// Desired runtime parameters for the managed workload.
///
/// Built once at process start from configuration and never persisted;
/// observed state is always re-queried from the runtime by name filter.
#[derive(Debug, Clone, Serialize)]
pub struct WorkloadSpec {
    pub container_name: String,
    pub network_name: String,
    pub image: String,
    /// Memory ceiling in bytes.
    pub memory_bytes: i64,
    /// Host directory bind-mounted to the runtime's expected data path.
    pub live_data_dir: PathBuf,
    /// Path inside the container the live data is mounted at.
    pub container_data_path: String,
    /// TCP port exposed and published 1:1 on the host.
    pub game_port: u16,
    pub env: Vec<String>,
}

impl WorkloadSpec {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            container_name: config.container_name.clone(),
            network_name: config.network_name.clone(),
            image: config.image.clone(),
            memory_bytes: config.memory_gib * 1024 * 1024 * 1024,
            live_data_dir: config.live_data_dir.clone(),
            container_data_path: "/data".into(),
            game_port: config.game_port,
            env: config.container_env.clone(),
        }
    }
}

/// Classification of every lifecycle failure point plus the two success
/// terminals. Serialized snake_case so callers can branch on the string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleStatus {
    ClientInitError,
    ImagePullError,
    NetworkCreateError,
    ContainerCreateError,
    ContainerStartError,
    ContainerStarted,
    ContainerListError,
    NetworkListError,
    /// Nothing to stop: no container and no network matched. Not an error.
    ContainerDoesNotExistError,
    ContainerStopError,
    NetworkRemoveError,
    ContainerStopped,
    /// More than one container or network matched the configured name.
    LookupAmbiguousError,
}

impl LifecycleStatus {
    pub fn is_start_success(self) -> bool {
        self == LifecycleStatus::ContainerStarted
    }

    /// "Stopped" and "was never running" both leave the workload stopped.
    pub fn is_stop_success(self) -> bool {
        matches!(
            self,
            LifecycleStatus::ContainerStopped | LifecycleStatus::ContainerDoesNotExistError
        )
    }
}

/// Outcome of one start or stop call: the classification plus the resolved
/// configuration for observability.
#[derive(Debug, Clone, Serialize)]
pub struct LifecycleReport {
    pub status: LifecycleStatus,
    pub workload: WorkloadSpec,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl LifecycleReport {
    pub fn new(status: LifecycleStatus, workload: WorkloadSpec) -> Self {
        Self {
            status,
            workload,
            error: None,
        }
    }

    pub fn failed(status: LifecycleStatus, workload: WorkloadSpec, error: String) -> Self {
        Self {
            status,
            workload,
            error: Some(error),
        }
    }
}
