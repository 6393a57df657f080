//! In-memory registry of services and their mocked APIs.
//!
//! Lock order is always the service map first, then a service's own state.
//! Every existence check happens under the same write lock as the insert it
//! guards, so two racing registrations of one identity never both succeed.

mod model;

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use serde_json::Value;

use crate::config::UpstreamConfig;
use crate::error::{MoxyError, Result};
use crate::fingerprint::{self, effective_payload};
use crate::mode::{self, ApiMode, ServiceMode};
use crate::proxy::upstream::{validate_base_address, Upstream};
use crate::verb::Verb;

pub use model::{service_id, Api, ApiWithLatency, Endpoint, MockedResponse, Service};

/// Everything needed to register one API under a service.
#[derive(Debug, Clone)]
pub struct ApiRegistration {
    pub path: String,
    pub verb: Verb,
    pub payload: Option<Value>,
    pub response: MockedResponse,
    pub mode: Option<String>,
}

pub struct Registry {
    services: RwLock<HashMap<String, Arc<Service>>>,
    upstream_config: UpstreamConfig,
}

impl Registry {
    pub fn new(upstream_config: UpstreamConfig) -> Self {
        Self {
            services: RwLock::new(HashMap::new()),
            upstream_config,
        }
    }

    fn read_services(&self) -> RwLockReadGuard<'_, HashMap<String, Arc<Service>>> {
        self.services.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_services(&self) -> RwLockWriteGuard<'_, HashMap<String, Arc<Service>>> {
        self.services.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register `name.version`. A `service-passthrough` service gets its
    /// upstream client here.
    pub fn register_service(
        &self,
        name: &str,
        version: &str,
        base_address: Option<&str>,
        mode: Option<&str>,
    ) -> Result<Arc<Service>> {
        if name.is_empty() || version.is_empty() {
            return Err(MoxyError::InvalidConfiguration(
                "service name and version are required".to_string(),
            ));
        }
        // The id is the first path segment of every dispatched request.
        if name.contains('/') || version.contains('/') {
            return Err(MoxyError::InvalidConfiguration(format!(
                "service name and version must not contain '/': {name:?} {version:?}"
            )));
        }
        let base_address = base_address.map(str::trim).filter(|b| !b.is_empty());
        let id = service_id(name, version);

        let mut services = self.write_services();
        if services.contains_key(&id) {
            return Err(MoxyError::AlreadyRegistered(format!("service {id}")));
        }
        if let Some(base) = base_address {
            validate_base_address(base)?;
        }
        let mode: ServiceMode = mode::resolve(mode, base_address)?;
        let upstream = match (mode.allows_passthrough(), base_address) {
            (true, Some(base)) => Some(Upstream::connect(&id, base, &self.upstream_config)?),
            _ => None,
        };

        let service = Arc::new(Service::new(
            name,
            version,
            base_address.map(str::to_string),
            mode,
            upstream,
        ));
        services.insert(id, Arc::clone(&service));

        tracing::info!(
            service_id = %service.id,
            mode = %service.invocation_mode,
            base_address = ?service.base_address,
            "Service registered"
        );
        Ok(service)
    }

    /// Remove `name.version` and all of its APIs. Unknown tuples are a no-op.
    pub fn unregister_service(&self, name: &str, version: &str) {
        self.unregister_service_by_id(&service_id(name, version));
    }

    /// Remove a service by its `name.version` id. Unknown ids are a no-op.
    pub fn unregister_service_by_id(&self, id: &str) {
        if self.write_services().remove(id).is_some() {
            tracing::info!(service_id = %id, "Service unregistered");
        }
    }

    pub fn get_service(&self, name: &str, version: &str) -> Result<Arc<Service>> {
        self.get_service_by_id(&service_id(name, version))
    }

    pub fn get_service_by_id(&self, id: &str) -> Result<Arc<Service>> {
        self.read_services()
            .get(id)
            .cloned()
            .ok_or_else(|| MoxyError::NotFound(format!("service {id}")))
    }

    /// All registered services, ordered by id.
    pub fn services(&self) -> Vec<Arc<Service>> {
        let mut services: Vec<_> = self.read_services().values().cloned().collect();
        services.sort_by(|a, b| a.id.cmp(&b.id));
        services
    }

    pub fn register_api(&self, service: &Service, registration: ApiRegistration) -> Result<Api> {
        let endpoint = self.insert_endpoint(service, registration, None)?;
        Ok(endpoint.api().clone())
    }

    /// Same rules as [`Registry::register_api`]; the latency only affects
    /// how long the boundary waits before writing the mocked response.
    pub fn register_api_with_latency(
        &self,
        service: &Service,
        registration: ApiRegistration,
        latency: Duration,
    ) -> Result<ApiWithLatency> {
        let endpoint = self.insert_endpoint(service, registration, Some(latency))?;
        Ok(ApiWithLatency::new(endpoint.api().clone(), latency))
    }

    fn insert_endpoint(
        &self,
        service: &Service,
        registration: ApiRegistration,
        latency: Option<Duration>,
    ) -> Result<Arc<Endpoint>> {
        let ApiRegistration {
            path,
            verb,
            payload,
            response,
            mode,
        } = registration;

        let path = if path.starts_with('/') { path } else { format!("/{path}") };
        http::StatusCode::from_u16(response.response_code)
            .map_err(|_| MoxyError::InvalidStatusCode(response.response_code))?;
        let payload = effective_payload(payload.as_ref()).cloned();
        let fp = fingerprint::fingerprint(verb, &path, payload.as_ref())?;

        // Holding the map read lock keeps the service from being
        // unregistered while its APIs change.
        let services = self.read_services();
        match services.get(&service.id) {
            Some(current) if std::ptr::eq(Arc::as_ptr(current), service) => {}
            _ => return Err(MoxyError::NotFound(format!("service {}", service.id))),
        }

        let mut state = service.write_state();
        if state.apis.contains_key(&fp.digest) {
            return Err(MoxyError::AlreadyRegistered(format!(
                "API {verb} {path} ({}) in service {}",
                fp.digest, service.id
            )));
        }
        let mode: ApiMode = mode::resolve(mode.as_deref(), service.base_address.as_deref())?;
        if mode.is_passthrough() && state.upstream.is_none() {
            if let Some(base) = service.base_address.as_deref() {
                let upstream = Upstream::connect(&service.id, base, &self.upstream_config)?;
                state.upstream = Some(Arc::new(upstream));
            }
        }

        let api = Api {
            id: fp.digest.clone(),
            self_url: format!("/{}{path}", service.id),
            path,
            verb,
            payload,
            service_id: service.id.clone(),
            response,
            invocation_mode: mode,
        };
        let endpoint = Arc::new(match latency {
            Some(latency) => Endpoint::Delayed(ApiWithLatency::new(api, latency)),
            None => Endpoint::Plain(api),
        });
        state.apis.insert(fp.digest, Arc::clone(&endpoint));

        tracing::info!(
            service_id = %service.id,
            api_id = %endpoint.api().id,
            verb = %endpoint.api().verb,
            self_url = %endpoint.api().self_url,
            mode = %endpoint.api().invocation_mode,
            "API registered"
        );
        Ok(endpoint)
    }

    pub fn get_api_by_id(&self, service: &Service, api_id: &str) -> Result<Arc<Endpoint>> {
        service
            .read_state()
            .apis
            .get(api_id)
            .cloned()
            .ok_or_else(|| MoxyError::NotFound(format!("API {api_id} in service {}", service.id)))
    }

    pub fn get_api(
        &self,
        service: &Service,
        path: &str,
        verb: Verb,
        payload: Option<&Value>,
    ) -> Result<Arc<Endpoint>> {
        let fp = fingerprint::fingerprint(verb, path, payload)?;
        self.get_api_by_id(service, &fp.digest)
    }

    /// Number of APIs registered under `service`.
    pub fn routes_registered(&self, service: &Service) -> usize {
        service.read_state().apis.len()
    }

    /// All APIs of `service`, ordered by external path then verb.
    pub fn apis(&self, service: &Service) -> Vec<Arc<Endpoint>> {
        let mut apis: Vec<_> = service.read_state().apis.values().cloned().collect();
        apis.sort_by(|a, b| {
            (&a.api().self_url, a.api().verb.as_str(), &a.api().id)
                .cmp(&(&b.api().self_url, b.api().verb.as_str(), &b.api().id))
        });
        apis
    }
}
