#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CurrentItem {
    #[prost(enumeration = "current_item::Type", tag = "1")]
    pub r#type: i32,
    #[prost(string, tag = "2")]
    pub url: ::prost::alloc::string::String,
}

pub mod current_item {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
    #[repr(i32)]
    pub enum Type {
        Unspecified = 0,
        Chakra = 1,
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SetCurrentItemRequest {
    #[prost(int64, tag = "1")]
    pub room_id: i64,
    #[prost(message, optional, tag = "2")]
    pub item: ::core::option::Option<CurrentItem>,
}

#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct SetCurrentItemResponse {}

pub mod gateway_service_client {
    use tonic::codegen::http::uri::PathAndQuery;
    use tonic::transport::Channel;

    /// Client for `gateway.GatewayService`.
    #[derive(Debug, Clone)]
    pub struct GatewayServiceClient {
        inner: tonic::client::Grpc<Channel>,
    }

    impl GatewayServiceClient {
        pub fn new(channel: Channel) -> Self {
            Self {
                inner: tonic::client::Grpc::new(channel),
            }
        }

        /// Points the room's clients at a new current item.
        pub async fn set_current_item(
            &mut self,
            request: impl tonic::IntoRequest<super::SetCurrentItemRequest>,
        ) -> Result<tonic::Response<super::SetCurrentItemResponse>, tonic::Status> {
            self.inner.ready().await.map_err(|e| {
                tonic::Status::unavailable(format!("service was not ready: {e}"))
            })?;
            let codec = tonic::codec::ProstCodec::default();
            let path = PathAndQuery::from_static("/gateway.GatewayService/SetCurrentItem");
            self.inner.unary(request.into_request(), path, codec).await
        }
    }
}
