//! Pass-through plumbing: per-service upstream bindings and the gateway that
//! forwards requests to them.

pub mod correlation;
pub mod gateway;
pub mod upstream;

pub use gateway::{HttpGateway, ProxyGateway};
pub use upstream::Upstream;
