//! gRPC adapters for the chakra stream service and the gateway.

use std::time::Duration;

use async_trait::async_trait;
use roomvisor_model::RoomId;
use roomvisor_proto::chakra::v1::{ChakraServiceClient, CreateRequest};
use roomvisor_proto::gateway::v1::{
    current_item, CurrentItem as ProtoCurrentItem, GatewayServiceClient, SetCurrentItemRequest,
};
use tonic::transport::{Certificate, Channel, ClientTlsConfig, Endpoint};
use tracing::{debug, instrument};

use super::{
    AdapterError, CurrentItem, ItemKind, PresenceService, RetryPolicy, StreamHandle,
    StreamService,
};

const CHAKRA: &str = "chakra";
const GATEWAY: &str = "gateway";

/// Where a service lives and how to reach it.
#[derive(Debug, Clone)]
pub struct GrpcEndpoints {
    /// Backend URLs; calls are balanced across all of them.
    pub urls: Vec<String>,
    /// PEM CA used to verify the backends. Plaintext when absent.
    pub ca_pem: Option<Vec<u8>>,
    /// TLS server name override.
    pub domain: Option<String>,
    pub connect_timeout: Duration,
}

impl GrpcEndpoints {
    pub fn new(urls: Vec<String>) -> Self {
        Self {
            urls,
            ca_pem: None,
            domain: None,
            connect_timeout: Duration::from_secs(5),
        }
    }

    /// Builds a lazily connecting channel balanced over every URL.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn channel(&self, service: &'static str) -> Result<Channel, AdapterError> {
        if self.urls.is_empty() {
            return Err(AdapterError::Unavailable {
                service,
                reason: "no endpoints configured".to_string(),
            });
        }

        let tls = self.ca_pem.as_ref().map(|pem| {
            let config = ClientTlsConfig::new().ca_certificate(Certificate::from_pem(pem));
            match &self.domain {
                Some(domain) => config.domain_name(domain.clone()),
                None => config,
            }
        });

        let mut endpoints = Vec::with_capacity(self.urls.len());
        for url in &self.urls {
            let mut endpoint = Endpoint::from_shared(url.clone())
                .map_err(|source| AdapterError::Connect { service, source })?
                .connect_timeout(self.connect_timeout);
            if let Some(tls) = &tls {
                endpoint = endpoint
                    .tls_config(tls.clone())
                    .map_err(|source| AdapterError::Connect { service, source })?;
            }
            endpoints.push(endpoint);
        }

        Ok(Channel::balance_list(endpoints.into_iter()))
    }
}

fn rpc_error(service: &'static str) -> impl Fn(tonic::Status) -> AdapterError {
    move |status| AdapterError::Rpc { service, status }
}

/// [`StreamService`] backed by `chakra.ChakraService`.
#[derive(Clone)]
pub struct ChakraStreamService {
    client: ChakraServiceClient,
    retry: RetryPolicy,
}

impl ChakraStreamService {
    pub fn new(channel: Channel, retry: RetryPolicy) -> Self {
        Self {
            client: ChakraServiceClient::new(channel),
            retry,
        }
    }

    pub fn connect(endpoints: &GrpcEndpoints, retry: RetryPolicy) -> Result<Self, AdapterError> {
        Ok(Self::new(endpoints.channel(CHAKRA)?, retry))
    }
}

#[async_trait]
impl StreamService for ChakraStreamService {
    #[instrument(skip(self))]
    async fn create_stream(&self, name: &str) -> Result<StreamHandle, AdapterError> {
        let stream = self
            .retry
            .run("create_stream", || {
                let mut client = self.client.clone();
                let request = CreateRequest {
                    name: name.to_string(),
                };
                async move {
                    client
                        .create_stream(request)
                        .await
                        .map(tonic::Response::into_inner)
                        .map_err(rpc_error(CHAKRA))
                }
            })
            .await?;

        if stream.node_id.is_empty() {
            return Err(AdapterError::InvalidResponse {
                service: CHAKRA,
                reason: "stream has no node id".to_string(),
            });
        }

        debug!(stream_id = %stream.id, node_id = %stream.node_id, "Stream created");
        Ok(StreamHandle {
            node_id: stream.node_id,
        })
    }
}

/// [`PresenceService`] backed by `gateway.GatewayService`.
#[derive(Clone)]
pub struct GatewayPresenceService {
    client: GatewayServiceClient,
    retry: RetryPolicy,
}

impl GatewayPresenceService {
    pub fn new(channel: Channel, retry: RetryPolicy) -> Self {
        Self {
            client: GatewayServiceClient::new(channel),
            retry,
        }
    }

    pub fn connect(endpoints: &GrpcEndpoints, retry: RetryPolicy) -> Result<Self, AdapterError> {
        Ok(Self::new(endpoints.channel(GATEWAY)?, retry))
    }
}

fn to_proto(item: &CurrentItem) -> ProtoCurrentItem {
    let kind = match item.kind {
        ItemKind::Relay => current_item::Type::Chakra,
    };
    ProtoCurrentItem {
        r#type: kind as i32,
        url: item.url.clone(),
    }
}

#[async_trait]
impl PresenceService for GatewayPresenceService {
    #[instrument(skip(self, item), fields(room_id = %room_id, url = %item.url))]
    async fn set_current_item(
        &self,
        room_id: RoomId,
        item: CurrentItem,
    ) -> Result<(), AdapterError> {
        let item = to_proto(&item);
        self.retry
            .run("set_current_item", || {
                let mut client = self.client.clone();
                let request = SetCurrentItemRequest {
                    room_id: room_id.value(),
                    item: Some(item.clone()),
                };
                async move {
                    client
                        .set_current_item(request)
                        .await
                        .map(|_| ())
                        .map_err(rpc_error(GATEWAY))
                }
            })
            .await
    }
}
