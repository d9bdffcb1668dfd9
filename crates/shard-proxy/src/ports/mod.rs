//! # Ports Layer (Hexagonal Architecture)
//!
//! - `inbound`: what the proxy core offers (`ProxyApi`)
//! - `outbound`: what it needs (`BackendClient`, `TopologySource`)

pub mod inbound;
pub mod outbound;

pub use inbound::ProxyApi;
pub use outbound::{
    BackendClient, BackendRequest, BackendResponse, MockBackend, MockCall, MockReply,
    StaticTopologySource, TopologyError, TopologySource, TransportError,
};
