//! Docker-backed implementation of the build collaborators

mod builder;
mod container;
mod dockerfile;
mod image;

pub use builder::DockerImageBuilder;
pub use container::{process_report, DockerContainerInspector, ReportSummary};
pub use dockerfile::{render_slim_dockerfile, reverse_history};
pub use image::{slim_repo_name, DockerImageInspector};

use crate::pipeline::request::{DockerClientConfig, HttpProbeCmd};
use crate::probe::ReqwestHttpProbe;
use crate::toolkit::{
    BuilderSpec, ContainerInspector, ContainerSpec, HttpProbe, ImageBuilder, ImageInspector,
    Toolkit,
};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use bollard::{Docker, API_DEFAULT_VERSION};
use std::path::Path;
use tracing::debug;

/// Production [`Toolkit`] talking to a Docker daemon through bollard
#[derive(Debug, Clone, Copy, Default)]
pub struct DockerToolkit;

impl DockerToolkit {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Toolkit for DockerToolkit {
    type Client = Docker;

    async fn connect(&self, config: &DockerClientConfig) -> Result<Docker> {
        let docker = connect_docker(config)?;
        docker
            .ping()
            .await
            .context("Docker daemon did not answer ping")?;
        debug!("Connected to Docker daemon");
        Ok(docker)
    }

    async fn image_inspector(
        &self,
        client: &Docker,
        image_ref: &str,
    ) -> Result<Box<dyn ImageInspector>> {
        let inspector = DockerImageInspector::resolve(client.clone(), image_ref).await?;
        Ok(Box::new(inspector))
    }

    fn container_inspector(
        &self,
        client: &Docker,
        spec: ContainerSpec,
    ) -> Result<Box<dyn ContainerInspector>> {
        Ok(Box::new(DockerContainerInspector::new(client.clone(), spec)))
    }

    fn http_probe(
        &self,
        container: &dyn ContainerInspector,
        commands: &[HttpProbeCmd],
    ) -> Result<Box<dyn HttpProbe>> {
        let probe = ReqwestHttpProbe::with_targets(container.probe_targets(), commands.to_vec())?;
        Ok(Box::new(probe))
    }

    fn image_builder(&self, client: &Docker, spec: BuilderSpec) -> Result<Box<dyn ImageBuilder>> {
        Ok(Box::new(DockerImageBuilder::new(client.clone(), spec)))
    }
}

/// Opens a client for the configured endpoint without contacting the daemon
pub fn connect_docker(config: &DockerClientConfig) -> Result<Docker> {
    let timeout = config.timeout_secs;

    let Some(host) = config.host.as_deref() else {
        return Docker::connect_with_local_defaults()
            .map(|d| d.with_timeout(std::time::Duration::from_secs(timeout)))
            .context("Failed to connect to Docker with local defaults");
    };

    match endpoint_kind(host, config.tls_verify)? {
        Endpoint::Unix => Docker::connect_with_unix(host, timeout, API_DEFAULT_VERSION)
            .with_context(|| format!("Failed to connect to Docker socket {}", host)),
        Endpoint::Http => Docker::connect_with_http(host, timeout, API_DEFAULT_VERSION)
            .with_context(|| format!("Failed to connect to Docker at {}", host)),
        Endpoint::Tls => {
            let cert_path = config
                .cert_path
                .as_deref()
                .context("TLS requested but no certificate directory is configured")?;
            connect_tls(host, cert_path, timeout)
        }
    }
}

fn connect_tls(host: &str, cert_path: &Path, timeout: u64) -> Result<Docker> {
    let key = cert_path.join("key.pem");
    let cert = cert_path.join("cert.pem");
    let ca = cert_path.join("ca.pem");
    for file in [&key, &cert, &ca] {
        if !file.is_file() {
            bail!("Missing TLS file {}", file.display());
        }
    }

    Docker::connect_with_ssl(host, &key, &cert, &ca, timeout, API_DEFAULT_VERSION)
        .with_context(|| format!("Failed to connect to Docker over TLS at {}", host))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Endpoint {
    Unix,
    Http,
    Tls,
}

fn endpoint_kind(host: &str, tls_verify: bool) -> Result<Endpoint> {
    if host.starts_with("unix://") {
        Ok(Endpoint::Unix)
    } else if host.starts_with("https://") {
        Ok(Endpoint::Tls)
    } else if host.starts_with("tcp://") || host.starts_with("http://") {
        Ok(if tls_verify {
            Endpoint::Tls
        } else {
            Endpoint::Http
        })
    } else {
        bail!("Unsupported Docker host '{}'", host)
    }
}

/// Daemon version string, e.g. `27.3.1 (API 1.47)`
pub async fn docker_version(config: &DockerClientConfig) -> Result<String> {
    let docker = connect_docker(config)?;
    let version = docker
        .version()
        .await
        .context("Failed to query Docker version")?;

    Ok(format!(
        "{} (API {})",
        version.version.unwrap_or_else(|| "unknown".to_string()),
        version.api_version.unwrap_or_else(|| "unknown".to_string())
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use yare::parameterized;

    #[parameterized(
        unix = { "unix:///var/run/docker.sock", false, Endpoint::Unix },
        tcp = { "tcp://10.0.0.1:2375", false, Endpoint::Http },
        tcp_tls = { "tcp://10.0.0.1:2376", true, Endpoint::Tls },
        http = { "http://localhost:2375", false, Endpoint::Http },
        https = { "https://localhost:2376", false, Endpoint::Tls },
    )]
    fn test_endpoint_kind(host: &str, tls_verify: bool, expected: Endpoint) {
        assert_eq!(endpoint_kind(host, tls_verify).unwrap(), expected);
    }

    #[test]
    fn test_unsupported_host_rejected() {
        assert!(endpoint_kind("ftp://docker", false).is_err());
        let config = DockerClientConfig {
            host: Some("npipe:////./pipe/docker".to_string()),
            ..Default::default()
        };
        assert!(connect_docker(&config).is_err());
    }

    #[test]
    fn test_tls_without_cert_path_fails() {
        let config = DockerClientConfig {
            host: Some("tcp://127.0.0.1:2376".to_string()),
            tls_verify: true,
            cert_path: None,
            ..Default::default()
        };
        let err = connect_docker(&config).unwrap_err();
        assert!(err.to_string().contains("certificate directory"));
    }

    #[test]
    fn test_tls_with_missing_files_fails() {
        let certs = TempDir::new().unwrap();
        let config = DockerClientConfig {
            host: Some("tcp://127.0.0.1:2376".to_string()),
            tls_verify: true,
            cert_path: Some(certs.path().to_path_buf()),
            ..Default::default()
        };
        let err = connect_docker(&config).unwrap_err();
        assert!(err.to_string().contains("key.pem"));
    }

    #[test]
    fn test_http_client_is_created_lazily() {
        let config = DockerClientConfig {
            host: Some("tcp://127.0.0.1:1".to_string()),
            ..Default::default()
        };
        assert!(connect_docker(&config).is_ok());
    }
}
