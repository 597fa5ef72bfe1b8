//! Routing requests as seen by the decision core.
//!
//! Transport servers parse the wire protocol; the router only needs the
//! fields below.

use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr};

use serde::{Deserialize, Serialize};

use crate::topology::IpVersion;

/// Header a client may send to pick a steering target explicitly.
pub const STEERING_OPTION_HEADER: &str = "x-tc-steering-option";

/// An HTTP request to be redirected to an edge cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub client_ip: IpAddr,
    /// Lowercased host without port.
    pub host: String,
    pub path: String,
    pub query: Option<String>,
    pub secure: bool,
    headers: BTreeMap<String, String>,
}

impl HttpRequest {
    pub fn new(client_ip: IpAddr, host: impl Into<String>, path: impl Into<String>) -> Self {
        let host = host.into();
        let host = host.split(':').next().unwrap_or_default().to_lowercase();
        Self {
            client_ip,
            host,
            path: path.into(),
            query: None,
            secure: false,
            headers: BTreeMap::new(),
        }
    }

    /// A host-less request carrying only a path, used by hash inspection.
    pub fn for_path(path: impl Into<String>) -> Self {
        Self::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), "", path)
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        let query = query.into();
        self.query = if query.is_empty() { None } else { Some(query) };
        self
    }

    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_lowercase(), value.into());
        self
    }

    /// Header lookup, case-insensitive on the name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_lowercase()).map(String::as_str)
    }

    pub fn ip_version(&self) -> IpVersion {
        match self.client_ip {
            IpAddr::V4(_) => IpVersion::V4,
            IpAddr::V6(_) => IpVersion::V6,
        }
    }

    /// The full URL the client asked for.
    pub fn requested_url(&self) -> String {
        let scheme = if self.secure { "https" } else { "http" };
        match &self.query {
            Some(q) => format!("{scheme}://{}{}?{q}", self.host, self.path),
            None => format!("{scheme}://{}{}", self.host, self.path),
        }
    }
}

/// DNS record type asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum QueryType {
    #[default]
    A,
    Aaaa,
}

/// A DNS query for a delivery service name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsRequest {
    pub client_ip: IpAddr,
    /// Lowercased, without the trailing dot.
    pub hostname: String,
    pub query_type: QueryType,
}

impl DnsRequest {
    pub fn new(client_ip: IpAddr, hostname: impl Into<String>, query_type: QueryType) -> Self {
        let hostname = hostname.into();
        Self {
            client_ip,
            hostname: hostname.trim_end_matches('.').to_lowercase(),
            query_type,
        }
    }

    pub fn ip_version(&self) -> IpVersion {
        match self.query_type {
            QueryType::A => IpVersion::V4,
            QueryType::Aaaa => IpVersion::V6,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_normalized() {
        let req = HttpRequest::new("10.0.0.1".parse().unwrap(), "TR.DS-A.CDN.test:8080", "/a");
        assert_eq!(req.host, "tr.ds-a.cdn.test");
    }

    #[test]
    fn test_headers_case_insensitive() {
        let req = HttpRequest::for_path("/").with_header("X-TC-Steering-Option", "ds-b");
        assert_eq!(req.header(STEERING_OPTION_HEADER), Some("ds-b"));
    }

    #[test]
    fn test_requested_url() {
        let req = HttpRequest::new("10.0.0.1".parse().unwrap(), "tr.ds-a.cdn.test", "/a/b.m3u8")
            .with_query("k=v")
            .with_secure(true);
        assert_eq!(req.requested_url(), "https://tr.ds-a.cdn.test/a/b.m3u8?k=v");
    }

    #[test]
    fn test_empty_query_is_none() {
        let req = HttpRequest::for_path("/a").with_query("");
        assert_eq!(req.query, None);
    }

    #[test]
    fn test_dns_request_ip_version() {
        let req = DnsRequest::new("10.0.0.1".parse().unwrap(), "Edge.DS-A.cdn.test.", QueryType::Aaaa);
        assert_eq!(req.hostname, "edge.ds-a.cdn.test");
        assert_eq!(req.ip_version(), IpVersion::V6);
    }
}
