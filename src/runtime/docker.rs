//! Docker control plane via bollard.

use std::collections::HashMap;

use async_trait::async_trait;
use bollard::models::{
    ContainerCreateBody, EndpointSettings, HostConfig, NetworkCreateRequest, NetworkingConfig,
    PortBinding,
};
use bollard::query_parameters::{
    CreateContainerOptions, CreateImageOptions, ListContainersOptions, ListNetworksOptions,
    StartContainerOptions, StopContainerOptions,
};
use bollard::Docker;
use futures_util::StreamExt;

use super::{ContainerRuntime, Result, RuntimeConnector, RuntimeError};
use crate::models::workload::WorkloadSpec;

/// Connects to the local Docker daemon. A fresh client is built and pinged
/// on every lifecycle call; nothing is pooled across calls.
pub struct DockerConnector;

#[async_trait]
impl RuntimeConnector for DockerConnector {
    async fn connect(&self) -> Result<Box<dyn ContainerRuntime>> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| RuntimeError::Connect(e.to_string()))?;
        docker
            .ping()
            .await
            .map_err(|e| RuntimeError::Connect(format!("docker ping failed: {e}")))?;
        Ok(Box::new(DockerRuntime { docker }))
    }
}

pub struct DockerRuntime {
    docker: Docker,
}

/// Parse an image reference into name and tag.
fn parse_image_ref(image: &str) -> (&str, &str) {
    if image.contains('@') {
        return (image, "");
    }
    if let Some((name, tag)) = image.rsplit_once(':') {
        // A '/' after the ':' means the colon belonged to a registry port.
        if !tag.contains('/') {
            return (name, tag);
        }
    }
    (image, "latest")
}

fn name_filter(name: &str) -> HashMap<String, Vec<String>> {
    HashMap::from([("name".to_string(), vec![name.to_string()])])
}

/// Exposed-ports map keyed `<port>/tcp`; the API wants empty objects as
/// values.
fn exposed_port_map(port: u16) -> HashMap<String, HashMap<(), ()>> {
    HashMap::from([(format!("{port}/tcp"), HashMap::new())])
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn pull_image(&self, image: &str) -> Result<()> {
        let (name, tag) = parse_image_ref(image);
        tracing::info!(image = %image, "pulling image");

        let options = CreateImageOptions {
            from_image: Some(name.to_string()),
            tag: if tag.is_empty() {
                None
            } else {
                Some(tag.to_string())
            },
            ..Default::default()
        };

        let mut stream = self.docker.create_image(Some(options), None, None);
        while let Some(result) = stream.next().await {
            match result {
                Ok(info) => {
                    if let Some(status) = info.status {
                        tracing::debug!(status = %status, "pull progress");
                    }
                }
                Err(e) => return Err(RuntimeError::Api(e.to_string())),
            }
        }
        Ok(())
    }

    async fn create_network(&self, name: &str) -> Result<String> {
        let response = self
            .docker
            .create_network(NetworkCreateRequest {
                name: name.to_string(),
                ..Default::default()
            })
            .await
            .map_err(|e| RuntimeError::Api(e.to_string()))?;
        tracing::info!(network = %name, id = %response.id, "network created");
        Ok(response.id)
    }

    async fn create_container(&self, spec: &WorkloadSpec) -> Result<String> {
        let port_bindings = HashMap::from([(
            format!("{}/tcp", spec.game_port),
            Some(vec![PortBinding {
                host_ip: Some("0.0.0.0".to_string()),
                host_port: Some(spec.game_port.to_string()),
            }]),
        )]);

        let host_config = HostConfig {
            binds: Some(vec![format!(
                "{}:{}",
                spec.live_data_dir.display(),
                spec.container_data_path
            )]),
            memory: Some(spec.memory_bytes),
            port_bindings: Some(port_bindings),
            network_mode: Some(spec.network_name.clone()),
            auto_remove: Some(true),
            ..Default::default()
        };

        let networking_config = NetworkingConfig {
            endpoints_config: Some(HashMap::from([(
                spec.network_name.clone(),
                EndpointSettings::default(),
            )])),
        };

        let config = ContainerCreateBody {
            image: Some(spec.image.clone()),
            env: Some(spec.env.clone()),
            exposed_ports: Some(exposed_port_map(spec.game_port)),
            host_config: Some(host_config),
            networking_config: Some(networking_config),
            ..Default::default()
        };

        let options = CreateContainerOptions {
            name: Some(spec.container_name.clone()),
            platform: String::new(),
        };

        let response = self
            .docker
            .create_container(Some(options), config)
            .await
            .map_err(|e| RuntimeError::Api(e.to_string()))?;
        tracing::info!(container = %spec.container_name, id = %response.id, "container created");
        Ok(response.id)
    }

    async fn start_container(&self, name: &str) -> Result<()> {
        self.docker
            .start_container(name, None::<StartContainerOptions>)
            .await
            .map_err(|e| RuntimeError::Api(e.to_string()))?;
        tracing::info!(container = %name, "container started");
        Ok(())
    }

    async fn list_containers(&self, name: &str) -> Result<Vec<String>> {
        let options = ListContainersOptions {
            all: true,
            filters: Some(name_filter(name)),
            ..Default::default()
        };
        let containers = self
            .docker
            .list_containers(Some(options))
            .await
            .map_err(|e| RuntimeError::Api(e.to_string()))?;
        Ok(containers.into_iter().filter_map(|c| c.id).collect())
    }

    async fn list_networks(&self, name: &str) -> Result<Vec<String>> {
        let options = ListNetworksOptions {
            filters: Some(name_filter(name)),
        };
        let networks = self
            .docker
            .list_networks(Some(options))
            .await
            .map_err(|e| RuntimeError::Api(e.to_string()))?;
        Ok(networks.into_iter().filter_map(|n| n.id).collect())
    }

    async fn stop_container(&self, name: &str) -> Result<()> {
        // Forced stop: no grace period.
        let options = StopContainerOptions {
            t: Some(0),
            signal: None,
        };
        self.docker
            .stop_container(name, Some(options))
            .await
            .map_err(|e| RuntimeError::Api(e.to_string()))?;
        tracing::info!(container = %name, "container stopped");
        Ok(())
    }

    async fn remove_network(&self, name: &str) -> Result<()> {
        self.docker
            .remove_network(name)
            .await
            .map_err(|e| RuntimeError::Api(e.to_string()))?;
        tracing::info!(network = %name, "network removed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_refs_split_into_name_and_tag() {
        assert_eq!(parse_image_ref("itzg/minecraft-server:latest"), ("itzg/minecraft-server", "latest"));
        assert_eq!(parse_image_ref("alpine"), ("alpine", "latest"));
        assert_eq!(parse_image_ref("localhost:5000/img"), ("localhost:5000/img", "latest"));
        assert_eq!(parse_image_ref("img@sha256:abc").1, "");
    }

    #[test]
    fn exposed_ports_are_empty_objects_keyed_by_port_and_protocol() {
        let map = exposed_port_map(25565);
        assert_eq!(map.len(), 1);
        assert!(map["25565/tcp"].is_empty());
    }
}
