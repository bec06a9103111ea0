//! gRPC instrumentation helpers: method-name cleaning and the host
//! denylist check.

use apm_core::Config;

/// Normalizes a raw gRPC method name by stripping a single leading `/`.
/// Already-clean names pass through unchanged.
pub fn cleaned_method(raw: impl AsRef<str>) -> String {
    let raw = raw.as_ref();
    raw.strip_prefix('/').unwrap_or(raw).to_string()
}

/// True iff `host` matches at least one configured denylist pattern. An
/// empty or missing denylist means no host is denylisted.
pub fn host_denylisted(config: &Config, host: &str) -> bool {
    config
        .grpc_host_denylist
        .iter()
        .any(|pattern| pattern.is_match(host))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cleans_method_names() {
        assert_eq!(
            cleaned_method("/method/with/leading/slash"),
            "method/with/leading/slash"
        );
    }

    #[test]
    fn test_does_not_clean_methods_that_do_not_need_cleaning() {
        assert_eq!(
            cleaned_method("method/without/leading/slash"),
            "method/without/leading/slash"
        );
    }

    #[test]
    fn test_strips_only_one_separator() {
        assert_eq!(cleaned_method("//double"), "/double");
    }

    #[test]
    fn test_owned_and_borrowed_inputs_match() {
        let borrowed = cleaned_method("/method");
        let owned = cleaned_method(String::from("/method"));
        assert_eq!(borrowed, owned);
    }

    #[test]
    fn test_host_denylist() {
        let config = Config::default().with_grpc_host_denylist(&["unwanted"]);
        assert!(host_denylisted(&config, "unwanted_host"));
        assert!(!host_denylisted(&config, "wanted_host"));
    }

    #[test]
    fn test_empty_denylist_matches_nothing() {
        let config = Config::default();
        assert!(!host_denylisted(&config, "any_host"));
    }
}
