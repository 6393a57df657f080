//! moxy: reverse proxy with built-in API mocking.
//!
//! Services and their APIs are registered at runtime; every other request is
//! matched by fingerprint against the registry and either answered with the
//! stored mock or forwarded to the service's upstream.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod fingerprint;
pub mod mode;
pub mod proxy;
pub mod registry;
pub mod server;
pub mod stats;
pub mod verb;

pub use dispatch::{Dispatched, Dispatcher, InboundRequest};
pub use error::MoxyError;
pub use mode::{ApiMode, ServiceMode};
pub use registry::{Api, ApiRegistration, ApiWithLatency, Registry, Service};
pub use verb::Verb;
