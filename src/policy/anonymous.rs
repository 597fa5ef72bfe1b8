//! Anonymous-IP blocking (VPNs, proxies, hosting ranges).

use std::collections::BTreeSet;

use serde::Deserialize;

use crate::locate::cidr::{Cidr, CidrError, CidrTable};
use crate::policy::{AnonymousIpPolicy, PolicyDecision, PolicyError, ANONYMOUS_BLOCK_CODE};
use crate::routing::request::HttpRequest;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct AnonymousIpDoc {
    blocked_networks: Vec<String>,
    ip_white_list: Vec<String>,
    redirect_url: Option<String>,
    /// Services exempt from blocking even when they enable it.
    exempt_delivery_services: Vec<String>,
}

/// Network block list with an allowlist and optional redirect target.
#[derive(Debug, Default)]
pub struct AnonymousIpList {
    blocked: CidrTable<()>,
    allowed: CidrTable<()>,
    redirect_url: Option<String>,
    exempt: BTreeSet<String>,
}

fn parse_networks(owner: &str, networks: &[String]) -> Result<CidrTable<()>, PolicyError> {
    let mut table = CidrTable::new();
    for network in networks {
        let cidr: Cidr = network.parse().map_err(|e: CidrError| PolicyError::InvalidRule {
            ds: owner.to_string(),
            reason: e.to_string(),
        })?;
        table.insert(cidr, ());
    }
    Ok(table)
}

impl AnonymousIpList {
    pub fn from_json(json: &str) -> Result<Self, PolicyError> {
        let doc: AnonymousIpDoc = serde_json::from_str(json)?;
        Ok(Self {
            blocked: parse_networks("anonymous ip", &doc.blocked_networks)?,
            allowed: parse_networks("anonymous ip", &doc.ip_white_list)?,
            redirect_url: doc.redirect_url.filter(|u| !u.is_empty()),
            exempt: doc.exempt_delivery_services.into_iter().collect(),
        })
    }
}

impl AnonymousIpPolicy for AnonymousIpList {
    fn enforce(&self, ds_id: &str, request: &HttpRequest) -> PolicyDecision {
        if self.exempt.contains(ds_id)
            || self.allowed.lookup(request.client_ip).is_some()
            || self.blocked.lookup(request.client_ip).is_none()
        {
            return PolicyDecision::Allow;
        }
        tracing::debug!(ds = %ds_id, client = %request.client_ip, "Anonymous IP blocked");
        match &self.redirect_url {
            Some(url) => PolicyDecision::Redirect { url: url.clone() },
            None => PolicyDecision::Block {
                status: ANONYMOUS_BLOCK_CODE,
            },
        }
    }
}
