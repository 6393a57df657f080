//! Registered services and APIs.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use serde::{Serialize, Serializer};
use serde_json::Value;

use crate::mode::{ApiMode, ServiceMode};
use crate::proxy::Upstream;
use crate::verb::Verb;

/// Composite service identity, `name.version`.
pub fn service_id(name: &str, version: &str) -> String {
    format!("{name}.{version}")
}

/// The canned response returned for a mocked API.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MockedResponse {
    pub response_code: u16,
    pub response_payload: Value,
}

/// One registered endpoint. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Api {
    /// Fingerprint of (verb, path, payload).
    pub id: String,
    pub path: String,
    pub verb: Verb,
    pub payload: Option<Value>,
    /// Owning service, resolved through the registry when needed.
    pub service_id: String,
    pub response: MockedResponse,
    /// Path clients call: `/{service_id}{path}`.
    pub self_url: String,
    pub invocation_mode: ApiMode,
}

/// An [`Api`] plus simulated latency applied when its mock is served.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApiWithLatency {
    #[serde(flatten)]
    api: Api,
    #[serde(rename = "latency_ms", serialize_with = "serialize_millis")]
    latency: Duration,
}

impl ApiWithLatency {
    pub fn new(api: Api, latency: Duration) -> Self {
        Self { api, latency }
    }

    pub fn api(&self) -> &Api {
        &self.api
    }

    pub fn latency(&self) -> Duration {
        self.latency
    }

    pub fn into_api(self) -> Api {
        self.api
    }
}

fn serialize_millis<S: Serializer>(latency: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(latency.as_millis() as u64)
}

/// What a service stores under each fingerprint.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Endpoint {
    Plain(Api),
    Delayed(ApiWithLatency),
}

impl Endpoint {
    pub fn api(&self) -> &Api {
        match self {
            Endpoint::Plain(api) => api,
            Endpoint::Delayed(delayed) => delayed.api(),
        }
    }

    pub fn latency(&self) -> Option<Duration> {
        match self {
            Endpoint::Plain(_) => None,
            Endpoint::Delayed(delayed) => Some(delayed.latency()),
        }
    }
}

/// A registered namespace of APIs.
///
/// Identity fields are fixed at registration. The API map and the upstream
/// binding live behind the service's own lock; the registry takes it only
/// while already holding the service-map lock.
#[derive(Debug, Serialize)]
pub struct Service {
    pub id: String,
    pub name: String,
    pub version: String,
    pub base_address: Option<String>,
    pub invocation_mode: ServiceMode,
    #[serde(skip)]
    state: RwLock<ServiceState>,
}

#[derive(Debug, Default)]
pub(crate) struct ServiceState {
    pub(crate) apis: HashMap<String, Arc<Endpoint>>,
    pub(crate) upstream: Option<Arc<Upstream>>,
}

impl Service {
    pub(crate) fn new(
        name: &str,
        version: &str,
        base_address: Option<String>,
        invocation_mode: ServiceMode,
        upstream: Option<Upstream>,
    ) -> Self {
        Self {
            id: service_id(name, version),
            name: name.to_string(),
            version: version.to_string(),
            base_address,
            invocation_mode,
            state: RwLock::new(ServiceState {
                apis: HashMap::new(),
                upstream: upstream.map(Arc::new),
            }),
        }
    }

    pub fn allows_passthrough(&self) -> bool {
        self.invocation_mode.allows_passthrough()
    }

    /// The outbound binding, once a pass-through mode has created it.
    pub fn upstream(&self) -> Option<Arc<Upstream>> {
        self.read_state().upstream.clone()
    }

    pub(crate) fn read_state(&self) -> RwLockReadGuard<'_, ServiceState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn write_state(&self) -> RwLockWriteGuard<'_, ServiceState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}
