//! Route results handed back to the DNS and HTTP transports.

use std::net::IpAddr;

use serde::Serialize;
use url::Url;

/// DNS record type of an answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RecordKind {
    A,
    Aaaa,
    Cname,
    Ns,
}

/// What an answer points at.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(untagged)]
pub enum RecordTarget {
    Address(IpAddr),
    Alias(String),
}

/// One DNS answer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct InetRecord {
    pub target: RecordTarget,
    pub ttl: u32,
    pub kind: RecordKind,
}

impl InetRecord {
    /// An A or AAAA record depending on the address family.
    pub fn address(ip: IpAddr, ttl: u32) -> Self {
        let kind = match ip {
            IpAddr::V4(_) => RecordKind::A,
            IpAddr::V6(_) => RecordKind::Aaaa,
        };
        Self {
            target: RecordTarget::Address(ip),
            ttl,
            kind,
        }
    }

    pub fn alias(name: impl Into<String>, ttl: u32) -> Self {
        Self {
            target: RecordTarget::Alias(name.into()),
            ttl,
            kind: RecordKind::Cname,
        }
    }

    pub fn ip(&self) -> Option<IpAddr> {
        match self.target {
            RecordTarget::Address(ip) => Some(ip),
            RecordTarget::Alias(_) => None,
        }
    }
}

/// Answer set for a DNS route.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DnsRouteResult {
    pub delivery_service: Option<String>,
    pub addresses: Vec<InetRecord>,
}

/// Redirect target(s) for an HTTP route.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HttpRouteResult {
    /// More than one URL may be returned (client steering).
    pub multi_route: bool,
    pub urls: Vec<Url>,
    pub delivery_services: Vec<String>,
    /// Overrides the transport's default redirect status when set.
    pub response_code: Option<u16>,
}

impl HttpRouteResult {
    pub fn new(multi_route: bool) -> Self {
        Self {
            multi_route,
            ..Self::default()
        }
    }

    pub fn url(&self) -> Option<&Url> {
        self.urls.first()
    }

    /// Replace every URL with a single one.
    pub fn set_url(&mut self, url: Url) {
        self.urls.clear();
        self.urls.push(url);
    }

    pub fn add_url(&mut self, url: Url) {
        self.urls.push(url);
    }

    pub fn add_delivery_service(&mut self, ds_id: impl Into<String>) {
        let ds_id = ds_id.into();
        if !self.delivery_services.contains(&ds_id) {
            self.delivery_services.push(ds_id);
        }
    }
}

/// Either kind of route result.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RouteResult {
    Dns(DnsRouteResult),
    Http(HttpRouteResult),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_record_kind() {
        assert_eq!(InetRecord::address("10.0.0.1".parse().unwrap(), 30).kind, RecordKind::A);
        assert_eq!(InetRecord::address("2001:db8::1".parse().unwrap(), 30).kind, RecordKind::Aaaa);
        assert_eq!(InetRecord::alias("cdn.test", 30).ip(), None);
    }

    #[test]
    fn test_set_url_replaces() {
        let mut result = HttpRouteResult::new(false);
        result.add_url(Url::parse("http://a.test/").unwrap());
        result.add_url(Url::parse("http://b.test/").unwrap());
        result.set_url(Url::parse("http://c.test/").unwrap());
        assert_eq!(result.urls.len(), 1);
        assert_eq!(result.url().unwrap().host_str(), Some("c.test"));
    }

    #[test]
    fn test_delivery_services_deduplicated() {
        let mut result = HttpRouteResult::new(true);
        result.add_delivery_service("ds-a");
        result.add_delivery_service("ds-a");
        assert_eq!(result.delivery_services, vec!["ds-a".to_string()]);
    }
}
