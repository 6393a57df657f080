//! HTTP verbs a mock can be registered for.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::MoxyError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verb {
    Get,
    Post,
    Delete,
    Put,
}

impl Verb {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verb::Get => "GET",
            Verb::Post => "POST",
            Verb::Delete => "DELETE",
            Verb::Put => "PUT",
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Exact, case-sensitive match.
impl FromStr for Verb {
    type Err = MoxyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "GET" => Ok(Verb::Get),
            "POST" => Ok(Verb::Post),
            "DELETE" => Ok(Verb::Delete),
            "PUT" => Ok(Verb::Put),
            other => Err(MoxyError::UnsupportedVerb(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_supported_verbs() {
        for verb in [Verb::Get, Verb::Post, Verb::Delete, Verb::Put] {
            assert_eq!(verb.as_str().parse::<Verb>().unwrap(), verb);
        }
    }

    #[test]
    fn test_rejects_lowercase_and_unknown() {
        assert!(matches!(
            "get".parse::<Verb>(),
            Err(MoxyError::UnsupportedVerb(v)) if v == "get"
        ));
        assert!(matches!(
            "PATCH".parse::<Verb>(),
            Err(MoxyError::UnsupportedVerb(_))
        ));
    }
}
