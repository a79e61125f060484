#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CreateRequest {
    #[prost(string, tag = "1")]
    pub name: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Stream {
    #[prost(string, tag = "1")]
    pub id: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub node_id: ::prost::alloc::string::String,
}

pub mod chakra_service_client {
    use tonic::codegen::http::uri::PathAndQuery;
    use tonic::transport::Channel;

    /// Client for `chakra.ChakraService`.
    #[derive(Debug, Clone)]
    pub struct ChakraServiceClient {
        inner: tonic::client::Grpc<Channel>,
    }

    impl ChakraServiceClient {
        pub fn new(channel: Channel) -> Self {
            Self {
                inner: tonic::client::Grpc::new(channel),
            }
        }

        /// Allocates a relay stream named after the room.
        pub async fn create_stream(
            &mut self,
            request: impl tonic::IntoRequest<super::CreateRequest>,
        ) -> Result<tonic::Response<super::Stream>, tonic::Status> {
            self.inner.ready().await.map_err(|e| {
                tonic::Status::unavailable(format!("service was not ready: {e}"))
            })?;
            let codec = tonic::codec::ProstCodec::default();
            let path = PathAndQuery::from_static("/chakra.ChakraService/CreateStream");
            self.inner.unary(request.into_request(), path, codec).await
        }
    }
}

#[cfg(test)]
mod tests {
    use prost::Message;

    use super::*;

    #[test]
    fn test_create_request_wire_bytes() {
        let req = CreateRequest {
            name: "42".to_string(),
        };
        assert_eq!(req.encode_to_vec(), vec![0x0a, 0x02, b'4', b'2']);
    }

    #[test]
    fn test_stream_decodes_node_id() {
        // field 2, length-delimited, "n1"
        let bytes = [0x12, 0x02, b'n', b'1'];
        let stream = Stream::decode(&bytes[..]).unwrap();
        assert_eq!(stream.node_id, "n1");
        assert!(stream.id.is_empty());
    }
}
