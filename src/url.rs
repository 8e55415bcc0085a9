//! Small utilities: URL query-parameter filtering for the
//! engine's own `x-`-prefixed customizations, and a safe non-negative
//! integer conversion used when turning CLI arguments into `Version`s.

use std::collections::HashMap;

/// Split `url` into its base (everything up to `?`) and a map of its
/// `x-`-prefixed query parameters, with the `x-` stripped from each key.
/// The base has all query parameters removed; a driver that needs the
/// non-`x-` parameters re-parses the original URL itself.
pub fn filter_custom_query_params(url: &str) -> (String, HashMap<String, String>) {
    let mut custom = HashMap::new();
    let Some((base, query)) = url.split_once('?') else {
        return (url.to_string(), custom);
    };
    for pair in query.split('&') {
        if pair.is_empty() {
            continue;
        }
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        if let Some(name) = key.strip_prefix("x-") {
            custom.insert(name.to_string(), value.to_string());
        }
    }
    (base.to_string(), custom)
}

/// Safely convert an unsigned step/limit count (as parsed from a CLI flag)
/// into the signed integer the planner's `limit` parameters use, returning
/// `None` instead of silently wrapping on overflow.
pub fn to_nonneg_i64(raw: u64) -> Option<i64> {
    i64::try_from(raw).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_only_x_prefixed_params() {
        let (base, custom) =
            filter_custom_query_params("postgres://u:p@h/db?x-migrations-table=foo&sslmode=disable");
        assert_eq!(base, "postgres://u:p@h/db");
        assert_eq!(custom.get("migrations-table"), Some(&"foo".to_string()));
        assert!(!custom.contains_key("sslmode"));
    }

    #[test]
    fn passthrough_when_no_query() {
        let (base, custom) = filter_custom_query_params("file:///tmp/migrations");
        assert_eq!(base, "file:///tmp/migrations");
        assert!(custom.is_empty());
    }

    #[test]
    fn converts_within_range() {
        assert_eq!(to_nonneg_i64(0), Some(0));
        assert_eq!(to_nonneg_i64(10), Some(10));
    }

    #[test]
    fn rejects_overflow() {
        assert_eq!(to_nonneg_i64(u64::MAX), None);
    }
}
