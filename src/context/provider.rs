//! Builds [`SelfDescription`] snapshots from the index and access contexts

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{debug, warn};

use super::{AccessCapabilities, AccessContext, Caller, IndexContext, SelfDescription};

const DEFAULT_HTTP_PORT: u16 = 9200;

/// Resolves the self-description of the catalog for each export
///
/// Only a missing index node makes the snapshot unavailable. Every other
/// lookup failure is logged and leaves the matching field out.
#[derive(Clone)]
pub struct SelfInfoProvider {
    index: Arc<dyn IndexContext>,
    access: Arc<dyn AccessContext>,
}

impl SelfInfoProvider {
    pub fn new(index: Arc<dyn IndexContext>, access: Arc<dyn AccessContext>) -> Self {
        Self { index, access }
    }

    /// Build a fresh snapshot
    ///
    /// # Returns
    /// * `Option<SelfDescription>` - `None` when no index node is reachable
    pub fn self_info(&self) -> Option<SelfDescription> {
        let node = match self.index.next_node() {
            Ok(Some(node)) if !node.is_empty() => node,
            Ok(_) => {
                debug!("No index node available");
                return None;
            }
            Err(e) => {
                warn!("Failed to resolve index node: {}", e);
                return None;
            }
        };

        let search_url = self.search_url(&node)?;

        let credentials = self.index.credentials().unwrap_or_else(|e| {
            warn!("Failed to resolve index credentials: {}", e);
            None
        });

        let access = self.capabilities();
        let caller = self.caller(access.as_ref());

        Some(
            SelfDescription::new(search_url)
                .with_credentials(credentials)
                .with_access(access)
                .with_caller(caller),
        )
    }

    fn search_url(&self, node: &str) -> Option<String> {
        let port = self.index.http_port().unwrap_or_else(|e| {
            warn!("Failed to resolve index port, using {}: {}", DEFAULT_HTTP_PORT, e);
            DEFAULT_HTTP_PORT
        });
        let scheme = match self.index.use_https() {
            Ok(true) => "https",
            Ok(false) => "http",
            Err(e) => {
                warn!("Failed to resolve index scheme, using http: {}", e);
                "http"
            }
        };

        let names = self
            .index
            .index_name()
            .and_then(|index| Ok((index, self.index.item_doc_type()?)));
        match names {
            Ok((index, doc_type)) => Some(format!(
                "{scheme}://{node}:{port}/{index}/{doc_type}/_search"
            )),
            Err(e) => {
                warn!("Failed to resolve index names: {}", e);
                None
            }
        }
    }

    fn capabilities(&self) -> Option<AccessCapabilities> {
        let resolved = self.access.supports_approval_status().and_then(|approval| {
            Ok(AccessCapabilities {
                supports_approval_status: approval,
                supports_group_based_access: self.access.supports_group_based_access()?,
            })
        });
        match resolved {
            Ok(caps) => Some(caps),
            Err(e) => {
                warn!("Failed to resolve access capabilities: {}", e);
                None
            }
        }
    }

    fn caller(&self, access: Option<&AccessCapabilities>) -> Option<Caller> {
        let user = match self.access.current_user() {
            Ok(user) => user?,
            Err(e) => {
                warn!("Failed to resolve caller: {}", e);
                return None;
            }
        };

        let groups = access
            .filter(|caps| caps.supports_group_based_access)
            .map(|_| user.groups.iter().cloned().collect::<BTreeSet<_>>());

        Some(Caller {
            username: user.username,
            is_admin: user.is_admin,
            groups,
        })
    }
}
