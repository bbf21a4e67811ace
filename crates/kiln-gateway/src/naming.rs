//! Store naming shared by every backend.
//!
//! A backend identifies a logical store by joining a segment derived from
//! the URI path with the caller-supplied `name` parameter. Each segment is
//! sanitized:
//!
//! - leading non-alphanumeric characters are stripped
//! - every run of characters outside `[A-Za-z0-9-]` collapses to one `_`
//! - segments left empty are dropped
//!
//! and the remaining segments are joined with `.`.

use crate::error::GatewayResult;
use crate::role::StoreRole;
use crate::uri::{param, StoreUri};

/// Sanitize and join name segments.
///
/// # Examples
///
/// ```
/// use kiln_gateway::naming::join_store_name;
///
/// assert_eq!(join_store_name(&["/tmp/my dbs", "todo list!"]), "tmp_my_dbs.todo_list_");
/// assert_eq!(join_store_name(&["", "--x"]), "x");
/// ```
pub fn join_store_name(parts: &[&str]) -> String {
    parts
        .iter()
        .map(|part| sanitize_segment(part))
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(".")
}

fn sanitize_segment(part: &str) -> String {
    let trimmed = part.trim_start_matches(|c: char| !c.is_ascii_alphanumeric());
    let mut out = String::with_capacity(trimmed.len());
    let mut in_run = false;
    for ch in trimmed.chars() {
        if ch.is_ascii_alphanumeric() || ch == '-' {
            out.push(ch);
            in_run = false;
        } else if !in_run {
            out.push('_');
            in_run = true;
        }
    }
    out
}

/// The sanitized form of a logical name, unique per raw name.
///
/// Names that survive sanitizing unchanged are returned as is. Otherwise a
/// short digest of the raw name is appended, so `a b` and `a_b` never share
/// storage.
///
/// ```
/// use kiln_gateway::unique_store_name;
///
/// assert_eq!(unique_store_name("todos"), "todos");
/// assert_ne!(unique_store_name("a b"), unique_store_name("a_b"));
/// assert!(unique_store_name("a b").starts_with("a_b-"));
/// ```
pub fn unique_store_name(raw: &str) -> String {
    let clean = join_store_name(&[raw]);
    if clean == raw {
        return clean;
    }
    let digest = blake3::hash(raw.as_bytes());
    format!("{clean}-{}", &digest.to_hex()[..8])
}

/// The resolved identity of a logical store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoreName {
    /// Path segment and logical name joined (`var_lib.todos`).
    pub full: String,
    /// Logical name alone, as produced by [`unique_store_name`] (`todos`).
    pub name: String,
    /// The partition addressed.
    pub role: StoreRole,
}

impl StoreName {
    /// Derive the store name from a URI carrying `name` and `store`.
    pub fn from_uri(uri: &StoreUri) -> GatewayResult<Self> {
        let name = uri.require_param(param::NAME)?;
        let role = uri.store_role()?;
        let path = uri.path().trim_start_matches('/');
        let name = unique_store_name(name);
        Ok(Self {
            full: join_store_name(&[path, &name]),
            name,
            role,
        })
    }

    /// Key identifying one partition of one store (`full:role`).
    pub fn connection_key(&self) -> String {
        format!("{}:{}", self.full, self.role)
    }
}
