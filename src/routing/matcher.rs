//! Delivery service request matching.
//!
//! # Responsibilities
//! - Match host (case-insensitive), path and header regexes
//! - Combine conditions of one match set with AND semantics
//! - Order match sets so the most specific host pattern is tried first
//!
//! # Design Decisions
//! - Every regex is anchored at both ends: a pattern must describe the whole target
//! - A leading `.*\.` on a service's first host pattern also matches the bare name
//! - Empty condition list = never matches (a service must opt in)

use std::cmp::Ordering;

use regex::{Regex, RegexBuilder};

use crate::routing::request::HttpRequest;

/// Trait for matching requests against conditions.
pub trait Matcher: Send + Sync + std::fmt::Debug {
    /// Returns true if the request matches this condition.
    fn matches(&self, req: &HttpRequest) -> bool;

    /// Length of the source pattern, used to rank specificity.
    fn specificity(&self) -> usize;
}

fn anchored(pattern: &str, case_insensitive: bool) -> Result<Regex, regex::Error> {
    RegexBuilder::new(&format!("^(?:{pattern})$"))
        .case_insensitive(case_insensitive)
        .build()
}

/// Matches the request host (or DNS query name).
#[derive(Debug, Clone)]
pub struct HostMatcher {
    pattern: String,
    regex: Regex,
}

impl HostMatcher {
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            pattern: pattern.to_string(),
            regex: anchored(pattern, true)?,
        })
    }

    /// Host matcher whose leading `.*\.` also accepts the bare domain.
    pub fn with_bare_domain(pattern: &str) -> Result<Self, regex::Error> {
        match pattern.strip_prefix(r".*\.") {
            Some(rest) => {
                let mut matcher = Self::new(&format!(r"(.*\.|^){rest}"))?;
                matcher.pattern = pattern.to_string();
                Ok(matcher)
            }
            None => Self::new(pattern),
        }
    }
}

impl Matcher for HostMatcher {
    fn matches(&self, req: &HttpRequest) -> bool {
        self.regex.is_match(&req.host)
    }

    fn specificity(&self) -> usize {
        self.pattern.len()
    }
}

/// Matches the request path.
#[derive(Debug, Clone)]
pub struct PathMatcher {
    pattern: String,
    regex: Regex,
}

impl PathMatcher {
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            pattern: pattern.to_string(),
            regex: anchored(pattern, false)?,
        })
    }
}

impl Matcher for PathMatcher {
    fn matches(&self, req: &HttpRequest) -> bool {
        self.regex.is_match(&req.path)
    }

    fn specificity(&self) -> usize {
        self.pattern.len()
    }
}

/// Matches the value of a named header. A missing header never matches.
#[derive(Debug, Clone)]
pub struct HeaderMatcher {
    name: String,
    pattern: String,
    regex: Regex,
}

impl HeaderMatcher {
    pub fn new(name: &str, pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            name: name.to_string(),
            pattern: pattern.to_string(),
            regex: anchored(pattern, false)?,
        })
    }
}

impl Matcher for HeaderMatcher {
    fn matches(&self, req: &HttpRequest) -> bool {
        req.header(&self.name).is_some_and(|v| self.regex.is_match(v))
    }

    fn specificity(&self) -> usize {
        self.pattern.len()
    }
}

/// Combines multiple matchers with AND semantics.
#[derive(Debug)]
pub struct AndMatcher {
    matchers: Vec<Box<dyn Matcher>>,
}

impl AndMatcher {
    pub fn new(matchers: Vec<Box<dyn Matcher>>) -> Self {
        Self { matchers }
    }

    pub fn is_empty(&self) -> bool {
        self.matchers.is_empty()
    }
}

impl Matcher for AndMatcher {
    fn matches(&self, req: &HttpRequest) -> bool {
        !self.matchers.is_empty() && self.matchers.iter().all(|m| m.matches(req))
    }

    fn specificity(&self) -> usize {
        self.matchers.first().map_or(0, |m| m.specificity())
    }
}

/// One match set bound to the delivery service it selects.
#[derive(Debug)]
pub struct ServiceMatcher {
    pub delivery_service: String,
    conditions: AndMatcher,
}

impl ServiceMatcher {
    pub fn new(delivery_service: impl Into<String>, conditions: AndMatcher) -> Self {
        Self {
            delivery_service: delivery_service.into(),
            conditions,
        }
    }

    pub fn matches(&self, req: &HttpRequest) -> bool {
        self.conditions.matches(req)
    }
}

/// Most specific first, then by service id for a stable order.
pub fn sort_matchers(matchers: &mut [ServiceMatcher]) {
    matchers.sort_by(|a, b| {
        match b.conditions.specificity().cmp(&a.conditions.specificity()) {
            Ordering::Equal => a.delivery_service.cmp(&b.delivery_service),
            other => other,
        }
    });
}
