//! Hash key construction for pattern-based consistent hashing.
//!
//! A key is the significant part of the request path (the concatenated
//! capture groups of a per-service regex) followed by the service's
//! significant query parameters, sorted and URL-decoded.

use std::collections::BTreeSet;

use regex::Regex;

/// Concatenate every capture group of `regex` found in `path`.
///
/// Falls back to `path` when nothing matches or the regex has no groups.
/// Groups that did not participate contribute nothing.
pub fn pattern_based_hash_string(regex: &Regex, path: &str) -> String {
    match regex.captures(path) {
        Some(caps) if caps.len() > 1 => caps
            .iter()
            .skip(1)
            .map(|m| m.map_or("", |m| m.as_str()))
            .collect(),
        _ => path.to_string(),
    }
}

/// Like [`pattern_based_hash_string`] for a regex supplied as text.
///
/// An empty or invalid expression yields `path` unchanged.
pub fn pattern_based_hash_string_str(regex: &str, path: &str) -> String {
    if regex.is_empty() {
        return path.to_string();
    }
    match Regex::new(regex) {
        Ok(compiled) => pattern_based_hash_string(&compiled, path),
        Err(e) => {
            tracing::warn!(regex = %regex, path = %path, error = %e, "Invalid hash regex, hashing on the full path");
            path.to_string()
        }
    }
}

/// The query parameters named in `significant`, decoded, sorted and
/// concatenated as `k=v` (or `k` for an empty value).
pub fn significant_query_params(query: Option<&str>, significant: &BTreeSet<String>) -> String {
    let Some(query) = query.filter(|q| !q.is_empty()) else {
        return String::new();
    };
    if significant.is_empty() {
        return String::new();
    }

    let picked: BTreeSet<String> = url::form_urlencoded::parse(query.as_bytes())
        .filter(|(k, _)| significant.contains(k.as_ref()))
        .map(|(k, v)| if v.is_empty() { k.into_owned() } else { format!("{k}={v}") })
        .collect();

    picked.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directory_capture() {
        let regex = Regex::new(r"(/[^/]+)/[^/]+\.m3u8").unwrap();
        assert_eq!(pattern_based_hash_string(&regex, "/a/x.m3u8"), "/a");
        assert_eq!(pattern_based_hash_string(&regex, "/a/y.m3u8"), "/a");
        assert_eq!(pattern_based_hash_string(&regex, "/b/x.m3u8"), "/b");
    }

    #[test]
    fn test_multiple_groups_concatenate() {
        let regex = Regex::new(r"/(\w+)/\d+/(\w+)\.ts").unwrap();
        assert_eq!(pattern_based_hash_string(&regex, "/live/42/seg.ts"), "liveseg");
    }

    #[test]
    fn test_no_match_or_no_groups_falls_back() {
        let regex = Regex::new(r"/only/(\w+)").unwrap();
        assert_eq!(pattern_based_hash_string(&regex, "/other/path"), "/other/path");

        let no_groups = Regex::new(r"/only/\w+").unwrap();
        assert_eq!(pattern_based_hash_string(&no_groups, "/only/path"), "/only/path");
    }

    #[test]
    fn test_invalid_regex_falls_back() {
        assert_eq!(pattern_based_hash_string_str("(unclosed", "/a/b"), "/a/b");
        assert_eq!(pattern_based_hash_string_str("", "/a/b"), "/a/b");
    }

    #[test]
    fn test_significant_query_params_sorted_and_decoded() {
        let significant: BTreeSet<String> = ["b", "a"].iter().map(|s| s.to_string()).collect();
        let key = significant_query_params(Some("z=9&b=two%20words&a=1&c=3"), &significant);
        assert_eq!(key, "a=1b=two words");
    }

    #[test]
    fn test_significant_query_params_empty_inputs() {
        let significant: BTreeSet<String> = ["a".to_string()].into_iter().collect();
        assert_eq!(significant_query_params(None, &significant), "");
        assert_eq!(significant_query_params(Some(""), &significant), "");
        assert_eq!(significant_query_params(Some("a=1"), &BTreeSet::new()), "");
        assert_eq!(significant_query_params(Some("a"), &significant), "a");
    }
}
