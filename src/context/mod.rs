//! Self-description of the catalog for an export
//!
//! This module describes how a transform reaches the search backend and which
//! access rules apply while it runs:
//! - [`IndexContext`] and [`AccessContext`]: the collaborators the values come from
//! - [`SelfDescription`]: the immutable snapshot handed to a transform
//! - [`SelfInfoProvider`]: builds a snapshot, degrading field by field on failure
//! - [`configured`]: collaborators backed by the configuration file

use std::collections::BTreeSet;
use std::fmt;

use serde_json::{Map, Value, json};

use crate::error::Result;

pub mod configured;
pub mod provider;

pub use configured::{ConfiguredAccessContext, ConfiguredIndexContext};
pub use provider::SelfInfoProvider;

/// Connection details of the search index backend
pub trait IndexContext: Send + Sync {
    /// Next node to query, `None` when no node is reachable
    fn next_node(&self) -> Result<Option<String>>;

    /// HTTP port of the nodes
    fn http_port(&self) -> Result<u16>;

    /// Whether nodes are reached over https
    fn use_https(&self) -> Result<bool>;

    /// Credentials for the index, if any
    fn credentials(&self) -> Result<Option<Credentials>>;

    /// Name of the metadata index
    fn index_name(&self) -> Result<String>;

    /// Document type of catalog items
    fn item_doc_type(&self) -> Result<String>;
}

/// Access-control rules of the deployment
pub trait AccessContext: Send + Sync {
    fn supports_approval_status(&self) -> Result<bool>;

    fn supports_group_based_access(&self) -> Result<bool>;

    /// Caller the export runs on behalf of, if authenticated
    fn current_user(&self) -> Result<Option<AppUser>>;
}

/// Authenticated user as reported by the access context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppUser {
    pub username: String,
    pub is_admin: bool,
    pub groups: Vec<String>,
}

/// Index credentials; only exist when both parts are non-empty
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    username: String,
    password: String,
}

impl Credentials {
    /// Pair a username with a password
    ///
    /// # Returns
    /// * `Option<Credentials>` - `None` if either part is empty
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Option<Self> {
        let username = username.into();
        let password = password.into();
        if username.is_empty() || password.is_empty() {
            return None;
        }
        Some(Self { username, password })
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// Access capability flags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessCapabilities {
    pub supports_approval_status: bool,
    pub supports_group_based_access: bool,
}

/// Caller identity included in a snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub username: String,
    pub is_admin: bool,
    /// Only present when group-based access is enabled
    pub groups: Option<BTreeSet<String>>,
}

/// Snapshot of how to reach the search backend for one export
///
/// A snapshot only exists once an index node was resolved, so `search_url`
/// is always usable. The optional parts are omitted when their lookup failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelfDescription {
    search_url: String,
    credentials: Option<Credentials>,
    access: Option<AccessCapabilities>,
    caller: Option<Caller>,
}

impl SelfDescription {
    /// Create a snapshot for a resolved search endpoint
    pub fn new(search_url: impl Into<String>) -> Self {
        Self {
            search_url: search_url.into(),
            credentials: None,
            access: None,
            caller: None,
        }
    }

    pub fn with_credentials(mut self, credentials: Option<Credentials>) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn with_access(mut self, access: Option<AccessCapabilities>) -> Self {
        self.access = access;
        self
    }

    pub fn with_caller(mut self, caller: Option<Caller>) -> Self {
        self.caller = caller;
        self
    }

    /// Absolute URL of the search endpoint
    pub fn search_url(&self) -> &str {
        &self.search_url
    }

    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    pub fn access(&self) -> Option<&AccessCapabilities> {
        self.access.as_ref()
    }

    pub fn caller(&self) -> Option<&Caller> {
        self.caller.as_ref()
    }

    /// JSON view handed to transforms
    ///
    /// Shape: `{ "elastic": { "searchUrl", "username"?, "password"?, "access"? } }`
    pub fn to_json(&self) -> Value {
        self.render(true)
    }

    /// Same as [`to_json`](Self::to_json) with the password masked
    pub fn to_redacted_json(&self) -> Value {
        self.render(false)
    }

    fn render(&self, reveal_password: bool) -> Value {
        let mut elastic = Map::new();
        elastic.insert("searchUrl".to_string(), json!(self.search_url));

        if let Some(credentials) = &self.credentials {
            elastic.insert("username".to_string(), json!(credentials.username));
            let password = if reveal_password {
                credentials.password.as_str()
            } else {
                "***"
            };
            elastic.insert("password".to_string(), json!(password));
        }

        let mut access = Map::new();
        if let Some(caps) = &self.access {
            access.insert(
                "supportsApprovalStatus".to_string(),
                json!(caps.supports_approval_status),
            );
            access.insert(
                "supportsGroupBasedAccess".to_string(),
                json!(caps.supports_group_based_access),
            );
        }
        if let Some(caller) = &self.caller {
            access.insert("username".to_string(), json!(caller.username));
            access.insert("isAdmin".to_string(), json!(caller.is_admin));
            if let Some(groups) = &caller.groups {
                access.insert("groups".to_string(), json!(groups));
            }
        }
        if !access.is_empty() {
            elastic.insert("access".to_string(), Value::Object(access));
        }

        json!({ "elastic": elastic })
    }
}
