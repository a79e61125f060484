//! gRPC contracts consumed by the supervisor.
//!
//! The message types mirror `proto/chakra.proto` and `proto/gateway.proto`
//! and are declared with `prost` derives directly, so building the workspace
//! does not need `protoc`. Field tags must stay in sync with the `.proto`
//! files.

pub mod chakra {
    pub mod v1 {
        include!("chakra.rs");

        pub use chakra_service_client::ChakraServiceClient;
    }
}

pub mod gateway {
    pub mod v1 {
        include!("gateway.rs");

        pub use gateway_service_client::GatewayServiceClient;
    }
}
