//! Kubernetes capacity provider.
//!
//! Talks to the API server over plain REST:
//! - Room units are pods named `room-{id}` in the room namespace
//! - Capacity is node `allocatable` minus the limits of live room pods
//! - Region affinity is a node selector on the region label

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use roomvisor_model::{Region, RoomId};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, instrument, warn};

use super::{
    available_units, CapacityError, CapacityProvider, Footprint, NodeResources, Quantity,
    QuantityError, RegionLabels,
};

/// Label carried by every room pod.
const KIND_LABEL: &str = "kind=room";

/// Container settings for room pods.
#[derive(Debug, Clone)]
pub struct RoomPodTemplate {
    pub image: String,
    pub cpu_limit: String,
    pub memory_limit: String,
    pub cpu_request: String,
    pub memory_request: String,
    /// Passed to the room as `CHAKRA_ADDR`.
    pub chakra_addr: String,
}

impl RoomPodTemplate {
    /// Per-room footprint, taken from the limits.
    pub fn footprint(&self) -> Result<Footprint, QuantityError> {
        Ok(Footprint {
            cpu: self.cpu_limit.parse()?,
            memory: self.memory_limit.parse()?,
        })
    }
}

/// Kubernetes API access settings.
#[derive(Debug, Clone)]
pub struct KubernetesConfig {
    pub api_url: String,
    pub token: Option<String>,
    /// PEM bundle used to verify the API server.
    pub ca_pem: Option<Vec<u8>>,
    pub namespace: String,
    pub request_timeout: Duration,
    pub labels: RegionLabels,
    pub template: RoomPodTemplate,
}

/// Capacity provider backed by a Kubernetes cluster.
pub struct KubernetesProvider {
    client: reqwest::Client,
    config: KubernetesConfig,
    footprint: Footprint,
}

impl KubernetesProvider {
    pub fn new(config: KubernetesConfig) -> Result<Self, CapacityError> {
        let footprint = config
            .template
            .footprint()
            .map_err(|e| CapacityError::BackendUnavailable(format!("room limits: {e}")))?;

        let mut builder = reqwest::Client::builder().timeout(config.request_timeout);
        if let Some(pem) = &config.ca_pem {
            let cert = reqwest::Certificate::from_pem(pem)
                .map_err(|e| CapacityError::BackendUnavailable(format!("cluster CA: {e}")))?;
            builder = builder.add_root_certificate(cert);
        }
        let client = builder
            .build()
            .map_err(|e| CapacityError::BackendUnavailable(e.to_string()))?;

        Ok(Self {
            client,
            config,
            footprint,
        })
    }

    pub fn footprint(&self) -> &Footprint {
        &self.footprint
    }

    fn pod_name(room_id: RoomId) -> String {
        format!("room-{room_id}")
    }

    fn pods_url(&self) -> String {
        format!(
            "{}/api/v1/namespaces/{}/pods",
            self.config.api_url.trim_end_matches('/'),
            self.config.namespace
        )
    }

    fn request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        let builder = self.client.request(method, url);
        match &self.config.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn list<T: for<'de> Deserialize<'de>>(
        &self,
        url: &str,
        selector: Option<String>,
    ) -> Result<T, CapacityError> {
        let mut request = self.request(reqwest::Method::GET, url);
        if let Some(selector) = selector {
            request = request.query(&[("labelSelector", selector)]);
        }

        let response = request.send().await.map_err(unavailable)?;
        if !response.status().is_success() {
            return Err(status_error(response).await);
        }
        response.json().await.map_err(unavailable)
    }

    /// Pod manifest for a room.
    pub fn pod_manifest(&self, room_id: RoomId, region: Region) -> serde_json::Value {
        let template = &self.config.template;
        let room = room_id.to_string();

        let mut labels = serde_json::Map::new();
        labels.insert("room".into(), json!(room));
        labels.insert("kind".into(), json!("room"));
        let mut node_selector = serde_json::Map::new();
        if let Some(value) = self.config.labels.value(region) {
            labels.insert(self.config.labels.key().into(), json!(value));
            node_selector.insert(self.config.labels.key().into(), json!(value));
        }

        json!({
            "apiVersion": "v1",
            "kind": "Pod",
            "metadata": {
                "name": Self::pod_name(room_id),
                "namespace": self.config.namespace,
                "labels": labels,
            },
            "spec": {
                "volumes": [
                    { "name": "dshm", "emptyDir": { "medium": "Memory" } }
                ],
                "containers": [{
                    "name": "room",
                    "image": template.image,
                    "resources": {
                        "limits": {
                            "cpu": template.cpu_limit,
                            "memory": template.memory_limit,
                        },
                        "requests": {
                            "cpu": template.cpu_request,
                            "memory": template.memory_request,
                        },
                    },
                    "volumeMounts": [
                        { "name": "dshm", "mountPath": "/dev/shm" }
                    ],
                    "env": [
                        { "name": "ROOM_ID", "value": room },
                        { "name": "CHAKRA_ADDR", "value": template.chakra_addr },
                    ],
                }],
                "nodeSelector": node_selector,
            },
        })
    }

    /// Resources claimed by a pod: container limits, falling back to requests.
    fn pod_usage(&self, pod: &Pod) -> NodeResources {
        let mut usage = NodeResources::default();
        for container in &pod.spec.containers {
            let res = &container.resources;
            usage.cpu += claimed(&res.limits, &res.requests, "cpu").unwrap_or(self.footprint.cpu);
            usage.memory +=
                claimed(&res.limits, &res.requests, "memory").unwrap_or(self.footprint.memory);
        }
        usage
    }
}

fn claimed(
    limits: &HashMap<String, String>,
    requests: &HashMap<String, String>,
    resource: &str,
) -> Option<Quantity> {
    limits
        .get(resource)
        .or_else(|| requests.get(resource))
        .and_then(|raw| raw.parse().ok())
}

fn unavailable(err: reqwest::Error) -> CapacityError {
    CapacityError::BackendUnavailable(err.to_string())
}

async fn status_error(response: reqwest::Response) -> CapacityError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    CapacityError::BackendUnavailable(format!("kubernetes API returned {status}: {body}"))
}

#[async_trait]
impl CapacityProvider for KubernetesProvider {
    #[instrument(skip_all, fields(region = %region))]
    async fn available_rooms(&self, region: Region) -> Result<u64, CapacityError> {
        let nodes_url = format!("{}/api/v1/nodes", self.config.api_url.trim_end_matches('/'));
        let nodes: List<Node> = self
            .list(&nodes_url, self.config.labels.selector(region))
            .await?;
        let pods: List<Pod> = self
            .list(&self.pods_url(), Some(KIND_LABEL.to_string()))
            .await?;

        let mut used: HashMap<&str, NodeResources> = HashMap::new();
        let mut unbound = 0u64;
        for pod in pods.items.iter().filter(|p| p.is_live()) {
            match pod.spec.node_name.as_deref() {
                Some(node) => {
                    let usage = self.pod_usage(pod);
                    let entry = used.entry(node).or_default();
                    entry.cpu += usage.cpu;
                    entry.memory += usage.memory;
                }
                None if self.config.labels.matches(region, &pod.metadata.labels) => unbound += 1,
                None => {}
            }
        }

        let mut free = Vec::with_capacity(nodes.items.len());
        for node in &nodes.items {
            if node.spec.unschedulable {
                continue;
            }
            let allocatable = match node.allocatable() {
                Ok(resources) => resources,
                Err(e) => {
                    warn!(node = %node.metadata.name, error = %e, "Skipping node with unreadable allocatable");
                    continue;
                }
            };
            let claimed = used
                .get(node.metadata.name.as_str())
                .copied()
                .unwrap_or_default();
            free.push(allocatable.remaining(&claimed));
        }

        let rooms = available_units(&free, &self.footprint).saturating_sub(unbound);
        debug!(nodes = free.len(), unbound, rooms, "Computed available rooms");
        Ok(rooms)
    }

    #[instrument(skip_all, fields(room_id = %room_id, region = %region))]
    async fn deploy(&self, room_id: RoomId, region: Region) -> Result<(), CapacityError> {
        let response = self
            .request(reqwest::Method::POST, &self.pods_url())
            .json(&self.pod_manifest(room_id, region))
            .send()
            .await
            .map_err(unavailable)?;

        match response.status() {
            s if s.is_success() => {
                debug!("Room pod created");
                Ok(())
            }
            StatusCode::CONFLICT => Err(CapacityError::AlreadyExists(room_id)),
            _ => Err(status_error(response).await),
        }
    }

    #[instrument(skip_all, fields(room_id = %room_id))]
    async fn destroy(&self, room_id: RoomId) -> Result<(), CapacityError> {
        let url = format!("{}/{}", self.pods_url(), Self::pod_name(room_id));
        let response = self
            .request(reqwest::Method::DELETE, &url)
            .send()
            .await
            .map_err(unavailable)?;

        match response.status() {
            s if s.is_success() => {
                debug!("Room pod deleted");
                Ok(())
            }
            StatusCode::NOT_FOUND => Err(CapacityError::NotFound(room_id)),
            _ => Err(status_error(response).await),
        }
    }
}

// Minimal views of the core/v1 objects this provider reads.

#[derive(Debug, Deserialize)]
struct List<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct ObjectMeta {
    name: String,
    labels: HashMap<String, String>,
    deletion_timestamp: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Node {
    #[serde(default)]
    metadata: ObjectMeta,
    #[serde(default)]
    spec: NodeSpec,
    #[serde(default)]
    status: NodeStatus,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct NodeSpec {
    unschedulable: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct NodeStatus {
    allocatable: HashMap<String, String>,
}

impl Node {
    fn allocatable(&self) -> Result<NodeResources, QuantityError> {
        let get = |key: &str| -> Result<Quantity, QuantityError> {
            match self.status.allocatable.get(key) {
                Some(raw) => raw.parse(),
                None => Ok(Quantity::ZERO),
            }
        };
        Ok(NodeResources::new(get("cpu")?, get("memory")?))
    }
}

#[derive(Debug, Deserialize)]
struct Pod {
    #[serde(default)]
    metadata: ObjectMeta,
    #[serde(default)]
    spec: PodSpec,
    #[serde(default)]
    status: PodStatus,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct PodSpec {
    node_name: Option<String>,
    containers: Vec<Container>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Container {
    resources: Resources,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Resources {
    limits: HashMap<String, String>,
    requests: HashMap<String, String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PodStatus {
    phase: Option<String>,
}

impl Pod {
    /// Pods still holding (or about to hold) node resources.
    fn is_live(&self) -> bool {
        if self.metadata.deletion_timestamp.is_some() {
            return false;
        }
        !matches!(
            self.status.phase.as_deref(),
            Some("Succeeded") | Some("Failed")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> KubernetesProvider {
        KubernetesProvider::new(KubernetesConfig {
            api_url: "http://127.0.0.1:1".to_string(),
            token: None,
            ca_pem: None,
            namespace: "rooms".to_string(),
            request_timeout: Duration::from_secs(1),
            labels: RegionLabels::default(),
            template: RoomPodTemplate {
                image: "rooms/room:latest".to_string(),
                cpu_limit: "1".to_string(),
                memory_limit: "2Gi".to_string(),
                cpu_request: "500m".to_string(),
                memory_request: "1Gi".to_string(),
                chakra_addr: "chakra:4000".to_string(),
            },
        })
        .unwrap()
    }

    #[test]
    fn test_pod_manifest_for_named_region() {
        let pod = provider().pod_manifest(RoomId::new(42), Region::Euw);

        assert_eq!(pod["metadata"]["name"], "room-42");
        assert_eq!(pod["metadata"]["namespace"], "rooms");
        assert_eq!(pod["metadata"]["labels"]["room"], "42");
        assert_eq!(pod["metadata"]["labels"]["kind"], "room");
        assert_eq!(pod["metadata"]["labels"]["region"], "EUW");
        assert_eq!(pod["spec"]["nodeSelector"]["region"], "EUW");
        assert_eq!(pod["spec"]["volumes"][0]["emptyDir"]["medium"], "Memory");

        let container = &pod["spec"]["containers"][0];
        assert_eq!(container["resources"]["limits"]["memory"], "2Gi");
        assert_eq!(container["resources"]["requests"]["cpu"], "500m");
        assert_eq!(container["volumeMounts"][0]["mountPath"], "/dev/shm");
        assert_eq!(container["env"][0]["value"], "42");
        assert_eq!(container["env"][1]["value"], "chakra:4000");
    }

    #[test]
    fn test_pod_manifest_for_any_has_no_affinity() {
        let pod = provider().pod_manifest(RoomId::new(7), Region::Any);
        assert!(pod["metadata"]["labels"].get("region").is_none());
        assert_eq!(pod["spec"]["nodeSelector"], json!({}));
    }

    #[test]
    fn test_pod_usage_prefers_limits() {
        let pod: Pod = serde_json::from_value(json!({
            "spec": {
                "nodeName": "a",
                "containers": [{
                    "resources": {
                        "limits": { "cpu": "2" },
                        "requests": { "cpu": "1", "memory": "1Gi" }
                    }
                }]
            }
        }))
        .unwrap();

        let usage = provider().pod_usage(&pod);
        assert_eq!(usage.cpu, Quantity::from_units(2));
        assert_eq!(usage.memory, Quantity::parse("1Gi").unwrap());
    }

    #[test]
    fn test_finished_pods_are_not_live() {
        let pod: Pod = serde_json::from_value(json!({ "status": { "phase": "Succeeded" } })).unwrap();
        assert!(!pod.is_live());
        let pod: Pod = serde_json::from_value(json!({ "status": { "phase": "Pending" } })).unwrap();
        assert!(pod.is_live());
    }
}
