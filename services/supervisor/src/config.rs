//! Service configuration from `SUPERVISOR_*` environment variables.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use roomvisor_model::Region;

use crate::adapters::{BackoffPolicy, GrpcEndpoints, RetryPolicy};
use crate::capacity::{KubernetesConfig, Quantity, RegionLabels, RoomPodTemplate};
use crate::coordinator::CoordinatorConfig;
use crate::db::DbConfig;

const SERVICE_ACCOUNT_DIR: &str = "/var/run/secrets/kubernetes.io/serviceaccount";

/// Kubernetes API location and credentials.
#[derive(Debug, Clone)]
pub struct KubernetesSettings {
    pub api_url: String,
    pub token_path: Option<PathBuf>,
    pub ca_path: Option<PathBuf>,
    pub namespace: String,
}

/// A gRPC dependency.
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub urls: Vec<String>,
    pub ca_path: Option<PathBuf>,
    pub domain: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub listen_addr: SocketAddr,
    pub log_level: String,
    pub dev_mode: bool,
    pub database: DbConfig,
    pub kubernetes: KubernetesSettings,
    pub room: RoomPodTemplate,
    pub region_labels: RegionLabels,
    pub chakra: ServiceSettings,
    pub gateway: ServiceSettings,
    pub coordinator: CoordinatorConfig,
    pub retry: RetryPolicy,
}

fn list(raw: Option<String>) -> Vec<String> {
    raw.map(|s| {
        s.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    })
    .unwrap_or_default()
}

fn seconds(var: &impl Fn(&str) -> Option<String>, key: &str, default: u64) -> Result<Duration> {
    match var(key) {
        Some(raw) => {
            let secs: u64 = raw
                .parse()
                .with_context(|| format!("{key} must be a whole number of seconds"))?;
            Ok(Duration::from_secs(secs))
        }
        None => Ok(Duration::from_secs(default)),
    }
}

fn quantity(var: &impl Fn(&str) -> Option<String>, key: &str, default: &str) -> Result<String> {
    let raw = var(key).unwrap_or_else(|| default.to_string());
    Quantity::parse(&raw).with_context(|| format!("{key} is not a valid quantity"))?;
    Ok(raw)
}

/// Parses `REGION=value` pairs, e.g. `EUW=europe-west1,NAE=us-east1`.
fn region_labels(key: String, overrides: Option<String>) -> Result<RegionLabels> {
    let mut labels = RegionLabels::new(key);
    for pair in list(overrides) {
        let Some((region, value)) = pair.split_once('=') else {
            bail!("region label override '{pair}' must look like REGION=value");
        };
        let region: Region = region
            .trim()
            .parse()
            .with_context(|| format!("region label override '{pair}'"))?;
        if region.is_any() {
            bail!("region ANY has no node label");
        }
        labels = labels.with_value(region, value.trim());
    }
    Ok(labels)
}

fn service(var: &impl Fn(&str) -> Option<String>, prefix: &str, default_url: &str) -> ServiceSettings {
    let mut urls = list(var(&format!("{prefix}_ADDRS")));
    if urls.is_empty() {
        urls.push(default_url.to_string());
    }
    ServiceSettings {
        urls,
        ca_path: var(&format!("{prefix}_CA_PATH")).map(PathBuf::from),
        domain: var(&format!("{prefix}_DOMAIN")),
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_vars(|key| std::env::var(key).ok().filter(|v| !v.is_empty()))
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let listen_addr = var("SUPERVISOR_LISTEN_ADDR")
            .unwrap_or_else(|| "127.0.0.1:8080".to_string())
            .parse()
            .context("SUPERVISOR_LISTEN_ADDR")?;

        let log_level = var("SUPERVISOR_LOG_LEVEL").unwrap_or_else(|| "info".to_string());

        let dev_mode = var("SUPERVISOR_DEV")
            .map(|v| v == "1" || v.to_lowercase() == "true")
            .unwrap_or(false);

        let database = DbConfig::from_vars(&var);

        // In-cluster service account unless an explicit API URL is given.
        let in_cluster = var("KUBERNETES_SERVICE_HOST")
            .map(|host| {
                let port = var("KUBERNETES_SERVICE_PORT").unwrap_or_else(|| "443".to_string());
                format!("https://{host}:{port}")
            });
        let kubernetes = match (var("SUPERVISOR_K8S_API_URL"), in_cluster) {
            (Some(api_url), _) => KubernetesSettings {
                api_url,
                token_path: var("SUPERVISOR_K8S_TOKEN_PATH").map(PathBuf::from),
                ca_path: var("SUPERVISOR_K8S_CA_PATH").map(PathBuf::from),
                namespace: var("SUPERVISOR_ROOM_NAMESPACE").unwrap_or_else(|| "rooms".to_string()),
            },
            (None, Some(api_url)) => KubernetesSettings {
                api_url,
                token_path: Some(
                    var("SUPERVISOR_K8S_TOKEN_PATH")
                        .map(PathBuf::from)
                        .unwrap_or_else(|| PathBuf::from(SERVICE_ACCOUNT_DIR).join("token")),
                ),
                ca_path: Some(
                    var("SUPERVISOR_K8S_CA_PATH")
                        .map(PathBuf::from)
                        .unwrap_or_else(|| PathBuf::from(SERVICE_ACCOUNT_DIR).join("ca.crt")),
                ),
                namespace: var("SUPERVISOR_ROOM_NAMESPACE").unwrap_or_else(|| "rooms".to_string()),
            },
            (None, None) => KubernetesSettings {
                // kubectl proxy
                api_url: "http://127.0.0.1:8001".to_string(),
                token_path: var("SUPERVISOR_K8S_TOKEN_PATH").map(PathBuf::from),
                ca_path: var("SUPERVISOR_K8S_CA_PATH").map(PathBuf::from),
                namespace: var("SUPERVISOR_ROOM_NAMESPACE").unwrap_or_else(|| "rooms".to_string()),
            },
        };

        let chakra = service(&var, "SUPERVISOR_CHAKRA", "http://127.0.0.1:4000");
        let gateway = service(&var, "SUPERVISOR_GATEWAY", "http://127.0.0.1:4001");

        let room = RoomPodTemplate {
            image: var("SUPERVISOR_ROOM_IMAGE").unwrap_or_else(|| "roomvisor/room:latest".to_string()),
            cpu_limit: quantity(&var, "SUPERVISOR_ROOM_CPU_LIMIT", "2")?,
            memory_limit: quantity(&var, "SUPERVISOR_ROOM_MEMORY_LIMIT", "4Gi")?,
            cpu_request: quantity(&var, "SUPERVISOR_ROOM_CPU_REQUESTS", "1")?,
            memory_request: quantity(&var, "SUPERVISOR_ROOM_MEMORY_REQUESTS", "2Gi")?,
            chakra_addr: var("SUPERVISOR_ROOM_CHAKRA_ADDR")
                .unwrap_or_else(|| chakra.urls[0].clone()),
        };

        let region_labels = region_labels(
            var("SUPERVISOR_REGION_LABEL").unwrap_or_else(|| "region".to_string()),
            var("SUPERVISOR_REGION_LABEL_VALUES"),
        )?;

        let coordinator = CoordinatorConfig {
            request_timeout: seconds(&var, "SUPERVISOR_REQUEST_TIMEOUT_SECS", 30)?,
            call_timeout: seconds(&var, "SUPERVISOR_CALL_TIMEOUT_SECS", 10)?,
            drain_timeout: seconds(&var, "SUPERVISOR_DRAIN_TIMEOUT_SECS", 60)?,
        };

        let max_attempts = match var("SUPERVISOR_RETRY_ATTEMPTS") {
            Some(raw) => raw
                .parse::<u32>()
                .context("SUPERVISOR_RETRY_ATTEMPTS must be a positive integer")?
                .max(1),
            None => 3,
        };
        let retry = RetryPolicy {
            max_attempts,
            backoff: BackoffPolicy::default(),
        };

        Ok(Self {
            listen_addr,
            log_level,
            dev_mode,
            database,
            kubernetes,
            room,
            region_labels,
            chakra,
            gateway,
            coordinator,
            retry,
        })
    }

    /// Kubernetes client settings, with the token and CA read from disk.
    pub fn kubernetes_config(&self) -> Result<KubernetesConfig> {
        let settings = &self.kubernetes;
        let token = match &settings.token_path {
            Some(path) => Some(
                std::fs::read_to_string(path)
                    .with_context(|| format!("reading kubernetes token {}", path.display()))?
                    .trim()
                    .to_string(),
            ),
            None => None,
        };
        let ca_pem = read_optional(settings.ca_path.as_ref(), "kubernetes CA")?;

        Ok(KubernetesConfig {
            api_url: settings.api_url.clone(),
            token,
            ca_pem,
            namespace: settings.namespace.clone(),
            request_timeout: self.coordinator.call_timeout,
            labels: self.region_labels.clone(),
            template: self.room.clone(),
        })
    }

    pub fn chakra_endpoints(&self) -> Result<GrpcEndpoints> {
        endpoints(&self.chakra, "chakra CA")
    }

    pub fn gateway_endpoints(&self) -> Result<GrpcEndpoints> {
        endpoints(&self.gateway, "gateway CA")
    }
}

fn read_optional(path: Option<&PathBuf>, what: &str) -> Result<Option<Vec<u8>>> {
    match path {
        Some(path) => Ok(Some(
            std::fs::read(path).with_context(|| format!("reading {what} {}", path.display()))?,
        )),
        None => Ok(None),
    }
}

fn endpoints(settings: &ServiceSettings, what: &str) -> Result<GrpcEndpoints> {
    let mut endpoints = GrpcEndpoints::new(settings.urls.clone());
    endpoints.ca_pem = read_optional(settings.ca_path.as_ref(), what)?;
    endpoints.domain = settings.domain.clone();
    Ok(endpoints)
}
