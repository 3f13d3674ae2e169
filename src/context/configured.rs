//! Index and access contexts backed by the configuration file

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::config::{AccessConfig, IndexConfig};
use crate::error::Result;

use super::{AccessContext, AppUser, Credentials, IndexContext};

/// Index context that hands out the configured nodes round-robin
#[derive(Debug)]
pub struct ConfiguredIndexContext {
    config: IndexConfig,
    cursor: AtomicUsize,
}

impl ConfiguredIndexContext {
    pub fn new(config: IndexConfig) -> Self {
        Self {
            config,
            cursor: AtomicUsize::new(0),
        }
    }
}

impl IndexContext for ConfiguredIndexContext {
    fn next_node(&self) -> Result<Option<String>> {
        let nodes: Vec<&String> = self
            .config
            .nodes
            .iter()
            .filter(|n| !n.trim().is_empty())
            .collect();
        if nodes.is_empty() {
            return Ok(None);
        }
        let position = self.cursor.fetch_add(1, Ordering::Relaxed) % nodes.len();
        Ok(Some(nodes[position].trim().to_string()))
    }

    fn http_port(&self) -> Result<u16> {
        Ok(self.config.http_port)
    }

    fn use_https(&self) -> Result<bool> {
        Ok(self.config.use_https)
    }

    fn credentials(&self) -> Result<Option<Credentials>> {
        Ok(match (&self.config.username, &self.config.password) {
            (Some(username), Some(password)) => Credentials::new(username, password),
            _ => None,
        })
    }

    fn index_name(&self) -> Result<String> {
        Ok(self.config.index_name.clone())
    }

    fn item_doc_type(&self) -> Result<String> {
        Ok(self.config.item_doc_type.clone())
    }
}

/// Access context with fixed capabilities and an optional fixed caller
#[derive(Debug, Clone)]
pub struct ConfiguredAccessContext {
    config: AccessConfig,
}

impl ConfiguredAccessContext {
    pub fn new(config: AccessConfig) -> Self {
        Self { config }
    }
}

impl AccessContext for ConfiguredAccessContext {
    fn supports_approval_status(&self) -> Result<bool> {
        Ok(self.config.supports_approval_status)
    }

    fn supports_group_based_access(&self) -> Result<bool> {
        Ok(self.config.supports_group_based_access)
    }

    fn current_user(&self) -> Result<Option<AppUser>> {
        Ok(self
            .config
            .user
            .as_ref()
            .filter(|u| !u.username.is_empty())
            .map(|u| AppUser {
                username: u.username.clone(),
                is_admin: u.is_admin,
                groups: u.groups.clone(),
            }))
    }
}
