//! Store URIs: `scheme://path?param=value&...`.
//!
//! A store URI names a backend (the scheme), a location (the path), and a
//! set of ordered parameters. The gateway layer uses three well-known
//! parameters:
//!
//! - `name`: the caller's logical database name
//! - `store`: the [`StoreRole`] partition (`data`, `meta`, `wal`)
//! - `key`: the per-entry key, added by [`Gateway::build_url`]
//!
//! Input without a `://` separator is treated as a filesystem path.
//!
//! [`Gateway::build_url`]: crate::Gateway::build_url

use std::fmt;
use std::str::FromStr;

use crate::error::{GatewayError, GatewayResult};
use crate::role::StoreRole;

/// Well-known URI parameter names.
pub mod param {
    pub const NAME: &str = "name";
    pub const STORE: &str = "store";
    pub const KEY: &str = "key";
    pub const VERSION: &str = "version";
}

/// Characters a parameter key or value may not contain.
const RESERVED: &[char] = &['?', '&', '=', '#'];

/// A parsed store URI.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct StoreUri {
    scheme: String,
    path: String,
    params: Vec<(String, String)>,
}

impl StoreUri {
    /// Parse a URI string. Plain paths become `file://` URIs.
    pub fn parse(input: &str) -> GatewayResult<Self> {
        let invalid = |reason: &str| GatewayError::InvalidUri {
            uri: input.to_string(),
            reason: reason.to_string(),
        };

        if input.is_empty() {
            return Err(invalid("empty uri"));
        }

        let (scheme, rest) = match input.split_once("://") {
            Some((scheme, rest)) => (scheme.to_ascii_lowercase(), rest),
            None => ("file".to_string(), input),
        };
        if scheme.is_empty() || !scheme.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(invalid("scheme must be non-empty and alphanumeric"));
        }

        let (path, query) = match rest.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (rest, None),
        };

        let mut uri = Self {
            scheme,
            path: path.to_string(),
            params: Vec::new(),
        };
        if let Some(query) = query {
            for pair in query.split('&').filter(|p| !p.is_empty()) {
                let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
                if k.is_empty() {
                    return Err(invalid("empty parameter name"));
                }
                uri.set_param(k, v);
            }
        }
        Ok(uri)
    }

    /// Construct directly from parts.
    pub fn new(scheme: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            scheme: scheme.into().to_ascii_lowercase(),
            path: path.into(),
            params: Vec::new(),
        }
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn params(&self) -> &[(String, String)] {
        &self.params
    }

    /// Value of a parameter, if present.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Value of a parameter, or a `MissingParam` configuration error.
    pub fn require_param(&self, key: &'static str) -> GatewayResult<&str> {
        match self.param(key) {
            Some(v) if !v.is_empty() => Ok(v),
            _ => Err(GatewayError::MissingParam {
                param: key,
                uri: self.to_string(),
            }),
        }
    }

    /// Set (replace or append) a parameter in place.
    pub fn set_param(&mut self, key: &str, value: &str) {
        let key: String = key.chars().filter(|c| !RESERVED.contains(c)).collect();
        let value: String = value.chars().filter(|c| !RESERVED.contains(c)).collect();
        match self.params.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.params.push((key, value)),
        }
    }

    /// Copy of this URI with a parameter set.
    pub fn with_param(&self, key: &str, value: &str) -> Self {
        let mut uri = self.clone();
        uri.set_param(key, value);
        uri
    }

    /// Copy of this URI with a parameter set only if absent.
    pub fn with_default_param(&self, key: &str, value: &str) -> Self {
        if self.param(key).is_some() {
            self.clone()
        } else {
            self.with_param(key, value)
        }
    }

    /// The per-entry key carried by a URI produced by `build_url`.
    pub fn key(&self) -> GatewayResult<&str> {
        self.require_param(param::KEY)
    }

    /// The store partition this URI addresses.
    pub fn store_role(&self) -> GatewayResult<StoreRole> {
        let raw = self.require_param(param::STORE)?;
        raw.parse().map_err(|reason| GatewayError::InvalidUri {
            uri: self.to_string(),
            reason,
        })
    }

    /// Copy of this URI without the `key` parameter.
    pub fn base(&self) -> Self {
        let mut uri = self.clone();
        uri.params.retain(|(k, _)| k != param::KEY);
        uri
    }
}

impl fmt::Display for StoreUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.scheme, self.path)?;
        for (i, (k, v)) in self.params.iter().enumerate() {
            let sep = if i == 0 { '?' } else { '&' };
            write!(f, "{sep}{k}={v}")?;
        }
        Ok(())
    }
}

impl FromStr for StoreUri {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_full_uri() {
        let uri = StoreUri::parse("sqlite://./db?name=todos&store=data").unwrap();
        assert_eq!(uri.scheme(), "sqlite");
        assert_eq!(uri.path(), "./db");
        assert_eq!(uri.param("name"), Some("todos"));
        assert_eq!(uri.store_role().unwrap(), StoreRole::Data);
    }

    #[test]
    fn plain_path_is_file() {
        let uri = StoreUri::parse("/var/lib/kiln").unwrap();
        assert_eq!(uri.scheme(), "file");
        assert_eq!(uri.path(), "/var/lib/kiln");
        assert!(uri.params().is_empty());
    }

    #[test]
    fn display_roundtrip() {
        let text = "memory://scratch?name=a&store=meta";
        let uri = StoreUri::parse(text).unwrap();
        assert_eq!(uri.to_string(), text);
        assert_eq!(StoreUri::parse(&uri.to_string()).unwrap(), uri);
    }

    #[test]
    fn with_param_replaces_in_place() {
        let uri = StoreUri::parse("file://x?name=a&store=data").unwrap();
        let uri = uri.with_param("name", "b");
        assert_eq!(uri.to_string(), "file://x?name=b&store=data");
    }

    #[test]
    fn with_default_param_keeps_existing() {
        let uri = StoreUri::parse("file://x?version=v0").unwrap();
        assert_eq!(uri.with_default_param("version", "v1").param("version"), Some("v0"));
        let bare = StoreUri::parse("file://x").unwrap();
        assert_eq!(bare.with_default_param("version", "v1").param("version"), Some("v1"));
    }

    #[test]
    fn missing_param_is_config_error() {
        let uri = StoreUri::parse("file://x").unwrap();
        let err = uri.require_param(param::NAME).unwrap_err();
        assert!(err.is_config());
        assert!(err.to_string().contains("name"));
    }

    #[test]
    fn unknown_role_is_rejected() {
        let uri = StoreUri::parse("file://x?store=index").unwrap();
        assert!(uri.store_role().unwrap_err().is_config());
    }

    #[test]
    fn base_strips_key() {
        let uri = StoreUri::parse("file://x?name=a&key=k1").unwrap();
        assert_eq!(uri.key().unwrap(), "k1");
        assert_eq!(uri.base().to_string(), "file://x?name=a");
    }

    #[test]
    fn rejects_bad_input() {
        assert!(StoreUri::parse("").is_err());
        assert!(StoreUri::parse("fi le://x").is_err());
        assert!(StoreUri::parse("file://x?=v").is_err());
    }

    #[test]
    fn reserved_characters_are_dropped_from_values() {
        let uri = StoreUri::new("memory", "m").with_param("name", "a&b=c");
        assert_eq!(uri.param("name"), Some("abc"));
    }
}
