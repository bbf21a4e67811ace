//! Database configuration.

use serde::{Deserialize, Serialize};

use kiln_gateway::{param, StoreRole, StoreUri};

use crate::error::{CrdtError, CrdtResult};

/// Where and under what name a database stores its data.
///
/// Each role resolves to, in order: its own URI (`data`, `meta`, `wal`),
/// the shared `store` URI, or `memory://<name>`. The database name is
/// added as the `name` parameter unless the URI already carries one.
///
/// ```toml
/// name = "todos"
/// store = "sqlite:///var/lib/kiln"
/// meta = "file:///var/lib/kiln/meta"
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrdtConfig {
    pub name: String,
    pub store: Option<String>,
    pub data: Option<String>,
    pub meta: Option<String>,
    pub wal: Option<String>,
}

impl Default for CrdtConfig {
    fn default() -> Self {
        Self::new("kiln")
    }
}

impl CrdtConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            store: None,
            data: None,
            meta: None,
            wal: None,
        }
    }

    /// Use `uri` for every role without its own override.
    pub fn with_store(mut self, uri: impl Into<String>) -> Self {
        self.store = Some(uri.into());
        self
    }

    /// Override the URI of a single role.
    pub fn with_role(mut self, role: StoreRole, uri: impl Into<String>) -> Self {
        let slot = match role {
            StoreRole::Data => &mut self.data,
            StoreRole::Meta => &mut self.meta,
            StoreRole::Wal => &mut self.wal,
        };
        *slot = Some(uri.into());
        self
    }

    /// Parse a TOML document.
    pub fn from_toml_str(input: &str) -> CrdtResult<Self> {
        let config: Self = toml::from_str(input).map_err(|e| CrdtError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> CrdtResult<()> {
        if self.name.trim().is_empty() {
            return Err(CrdtError::Config("database name must not be empty".into()));
        }
        for role in StoreRole::ALL {
            self.store_uri(role)?;
        }
        Ok(())
    }

    /// The store URI for `role`, with the database name filled in.
    pub fn store_uri(&self, role: StoreRole) -> CrdtResult<StoreUri> {
        let own = match role {
            StoreRole::Data => self.data.as_deref(),
            StoreRole::Meta => self.meta.as_deref(),
            StoreRole::Wal => self.wal.as_deref(),
        };
        let uri = match own.or(self.store.as_deref()) {
            Some(raw) => StoreUri::parse(raw)?,
            None => StoreUri::new("memory", self.name.as_str()),
        };
        Ok(uri.with_default_param(param::NAME, &self.name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_in_memory() {
        let c = CrdtConfig::new("todos");
        let uri = c.store_uri(StoreRole::Data).unwrap();
        assert_eq!(uri.scheme(), "memory");
        assert_eq!(uri.param("name"), Some("todos"));
        assert!(c.validate().is_ok());
    }

    #[test]
    fn role_override_beats_shared_store() {
        let c = CrdtConfig::new("db")
            .with_store("sqlite:///srv/kiln")
            .with_role(StoreRole::Meta, "file:///srv/meta?name=pointers");

        let data = c.store_uri(StoreRole::Data).unwrap();
        assert_eq!(data.scheme(), "sqlite");
        assert_eq!(data.param("name"), Some("db"));

        let meta = c.store_uri(StoreRole::Meta).unwrap();
        assert_eq!(meta.scheme(), "file");
        assert_eq!(meta.param("name"), Some("pointers"));
    }

    #[test]
    fn parses_toml() {
        let c = CrdtConfig::from_toml_str(
            r#"
            name = "todos"
            store = "indexdb:///tmp/kiln"
            wal = "memory://wal"
            "#,
        )
        .unwrap();
        assert_eq!(c.name, "todos");
        assert_eq!(c.store_uri(StoreRole::Data).unwrap().scheme(), "indexdb");
        assert_eq!(c.store_uri(StoreRole::Wal).unwrap().scheme(), "memory");
    }

    #[test]
    fn missing_fields_take_defaults() {
        let c = CrdtConfig::from_toml_str("").unwrap();
        assert_eq!(c, CrdtConfig::default());
    }

    #[test]
    fn rejects_empty_name() {
        let err = CrdtConfig::from_toml_str(r#"name = " ""#).unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn rejects_bad_toml_and_bad_uri() {
        assert!(CrdtConfig::from_toml_str("name = [").unwrap_err().is_config());
        let err = CrdtConfig::new("db").with_store("bad scheme://x").validate().unwrap_err();
        assert!(err.is_config());
    }
}
