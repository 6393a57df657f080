//! Invocation modes and how requested modes are resolved.
//!
//! A service picks a default (`mock` or `service-passthrough`); each API can
//! override it (`mock`, `api-passthrough` or `validate`). Both levels share
//! one rule: the default is always accepted, anything else needs the
//! owning service to have an upstream base address.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{MoxyError, Result};

/// Closed set of modes resolvable by [`resolve`].
pub trait InvocationMode:
    Copy + Default + PartialEq + fmt::Display + FromStr<Err = MoxyError>
{
}

/// Service-level invocation mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ServiceMode {
    /// Unmatched requests are answered with NotFound.
    #[default]
    Mock,
    /// Unmatched requests are forwarded to the service's base address.
    ServicePassthrough,
}

/// API-level invocation mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ApiMode {
    /// Serve the stored response.
    #[default]
    Mock,
    /// Forward the matched request to the service's base address.
    ApiPassthrough,
    /// Accepted for compatibility; has no dispatch behavior of its own and is
    /// served like `Mock`.
    Validate,
}

impl ServiceMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceMode::Mock => "mock",
            ServiceMode::ServicePassthrough => "service-passthrough",
        }
    }

    pub fn allows_passthrough(&self) -> bool {
        matches!(self, ServiceMode::ServicePassthrough)
    }
}

impl ApiMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApiMode::Mock => "mock",
            ApiMode::ApiPassthrough => "api-passthrough",
            ApiMode::Validate => "validate",
        }
    }

    pub fn is_passthrough(&self) -> bool {
        matches!(self, ApiMode::ApiPassthrough)
    }
}

impl FromStr for ServiceMode {
    type Err = MoxyError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "mock" => Ok(ServiceMode::Mock),
            "service-passthrough" => Ok(ServiceMode::ServicePassthrough),
            other => Err(MoxyError::UnsupportedMode(other.to_string())),
        }
    }
}

impl FromStr for ApiMode {
    type Err = MoxyError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "mock" => Ok(ApiMode::Mock),
            "api-passthrough" => Ok(ApiMode::ApiPassthrough),
            "validate" => Ok(ApiMode::Validate),
            other => Err(MoxyError::UnsupportedMode(other.to_string())),
        }
    }
}

impl fmt::Display for ServiceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for ApiMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl InvocationMode for ServiceMode {}
impl InvocationMode for ApiMode {}

/// Resolve a requested mode against the owning service's base address.
///
/// `None` means the default. A value outside the enumeration fails with
/// `UnsupportedMode`; a non-default value without a base address fails with
/// `InvalidConfiguration`.
pub fn resolve<M: InvocationMode>(requested: Option<&str>, base_address: Option<&str>) -> Result<M> {
    let mode = match requested {
        Some(s) => s.parse::<M>()?,
        None => M::default(),
    };
    if mode != M::default() && base_address.is_none() {
        return Err(MoxyError::InvalidConfiguration(format!(
            "invocation mode {mode} requires a base address"
        )));
    }
    Ok(mode)
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: Option<&str> = Some("http://localhost:9000");

    #[test]
    fn test_default_accepted_without_base_address() {
        assert_eq!(resolve::<ServiceMode>(None, None).unwrap(), ServiceMode::Mock);
        assert_eq!(resolve::<ServiceMode>(Some("mock"), None).unwrap(), ServiceMode::Mock);
        assert_eq!(resolve::<ApiMode>(None, None).unwrap(), ApiMode::Mock);
        assert_eq!(resolve::<ApiMode>(Some("mock"), BASE).unwrap(), ApiMode::Mock);
    }

    #[test]
    fn test_non_default_requires_base_address() {
        assert!(matches!(
            resolve::<ServiceMode>(Some("service-passthrough"), None),
            Err(MoxyError::InvalidConfiguration(_))
        ));
        assert!(matches!(
            resolve::<ApiMode>(Some("api-passthrough"), None),
            Err(MoxyError::InvalidConfiguration(_))
        ));
        assert!(matches!(
            resolve::<ApiMode>(Some("validate"), None),
            Err(MoxyError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_non_default_with_base_address() {
        let mode = resolve::<ServiceMode>(Some("service-passthrough"), BASE).unwrap();
        assert!(mode.allows_passthrough());

        let mode = resolve::<ApiMode>(Some("api-passthrough"), BASE).unwrap();
        assert!(mode.is_passthrough());

        let mode = resolve::<ApiMode>(Some("validate"), BASE).unwrap();
        assert_eq!(mode, ApiMode::Validate);
        assert!(!mode.is_passthrough());
    }

    #[test]
    fn test_unknown_modes_rejected() {
        // Levels do not share their non-default values.
        assert!(matches!(
            resolve::<ServiceMode>(Some("api-passthrough"), BASE),
            Err(MoxyError::UnsupportedMode(m)) if m == "api-passthrough"
        ));
        assert!(matches!(
            resolve::<ApiMode>(Some("service-passthrough"), BASE),
            Err(MoxyError::UnsupportedMode(_))
        ));
        assert!(matches!(
            resolve::<ApiMode>(Some("MOCK"), None),
            Err(MoxyError::UnsupportedMode(_))
        ));
    }

    #[test]
    fn test_serde_names_match_wire_strings() {
        assert_eq!(
            serde_json::to_value(ServiceMode::ServicePassthrough).unwrap(),
            "service-passthrough"
        );
        assert_eq!(serde_json::to_value(ApiMode::ApiPassthrough).unwrap(), "api-passthrough");
    }
}
