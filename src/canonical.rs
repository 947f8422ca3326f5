/// URL canonicalization used for stash identity
use url::Url;

use crate::settings::NormalizationPolicy;

/// Query parameters removed by name when tracking stripping is on
const TRACKING_PARAMS: &[&str] = &[
    "fbclid", "gclid", "dclid", "msclkid", "ga_source", "ga_medium", "ga_campaign", "yclid",
    "vero_conv", "igshid", "spm", "sc_channel", "sc_campaign", "sc_content", "sc_medium",
    "sc_source", "mc_cid", "mc_eid", "ref", "ref_src", "ref_url", "referrer",
];

/// Query parameters removed by prefix when tracking stripping is on
const TRACKING_PREFIXES: &[&str] = &[
    "utm_", "hsa_", "pk_", "icn", "mkt_", "aff_", "sr_", "xtor", "oly_",
];

/// Schemes that can never be stashed, even though some of them parse as URLs
const UNSTASHABLE_PREFIXES: &[&str] = &[
    "view-source:",
    "chrome://",
    "chrome-extension://",
    "edge://",
    "about:",
    "devtools://",
    "file://",
    "data:",
    "blob:",
];

/// Build the canonical form of a URL
///
/// Algorithm (http and https only, anything else is returned untouched):
/// 1. Drop the fragment
/// 2. Lower-case the host and drop the scheme's default port
/// 3. Drop the whole query, or drop tracking parameters and sort the rest
///    by key (then value) so parameter order never matters
/// 4. Strip trailing slashes from the path unless it is just `/`
///
/// Parse failures return the input unchanged.
///
/// Examples:
/// - https://Example.COM:443/a/?utm_source=x#top → https://example.com/a
/// - https://a.com/?b=2&a=1 → https://a.com/?a=1&b=2
pub fn canonicalize(raw_url: &str, policy: &NormalizationPolicy) -> String {
    let mut url = match Url::parse(raw_url) {
        Ok(url) => url,
        Err(_) => return raw_url.to_string(),
    };

    if url.scheme() != "http" && url.scheme() != "https" {
        return raw_url.to_string();
    }

    url.set_fragment(None);

    // The parser already lower-cases domains and elides default ports for
    // special schemes; this covers hosts it leaves alone
    if let Some(host) = url.host_str().map(str::to_ascii_lowercase) {
        if url.set_host(Some(&host)).is_err() {
            return raw_url.to_string();
        }
    }
    let default_port = if url.scheme() == "http" { 80 } else { 443 };
    if url.port() == Some(default_port) && url.set_port(None).is_err() {
        return raw_url.to_string();
    }

    if policy.strip_all_params {
        url.set_query(None);
    } else if url.query().is_some() {
        let mut pairs: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(key, _)| !(policy.strip_tracking_params && is_tracking_param(key)))
            .map(|(key, value)| (key.into_owned(), value.into_owned()))
            .collect();
        pairs.sort();

        if pairs.is_empty() {
            url.set_query(None);
        } else {
            url.query_pairs_mut().clear().extend_pairs(pairs.iter());
        }
    }

    let path = url.path();
    if path.len() > 1 && path.ends_with('/') {
        let trimmed = path.trim_end_matches('/').to_string();
        url.set_path(&trimmed);
    }

    url.into()
}

fn is_tracking_param(key: &str) -> bool {
    TRACKING_PARAMS.contains(&key) || TRACKING_PREFIXES.iter().any(|prefix| key.starts_with(prefix))
}

/// True for URLs with an http or https scheme
pub fn is_http_url(url: &str) -> bool {
    let lower = url.trim_start().to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// True for URLs the stash is willing to hold
pub fn is_stashable_url(url: &str) -> bool {
    if url.is_empty() {
        return false;
    }
    let lower = url.to_ascii_lowercase();
    if UNSTASHABLE_PREFIXES.iter().any(|prefix| lower.starts_with(prefix)) {
        return false;
    }
    is_http_url(&lower)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracking() -> NormalizationPolicy {
        NormalizationPolicy {
            strip_all_params: false,
            strip_tracking_params: true,
        }
    }

    fn keep_all() -> NormalizationPolicy {
        NormalizationPolicy {
            strip_all_params: false,
            strip_tracking_params: false,
        }
    }

    fn strip_all() -> NormalizationPolicy {
        NormalizationPolicy {
            strip_all_params: true,
            strip_tracking_params: true,
        }
    }

    #[test]
    fn test_drops_fragment_and_default_port() {
        assert_eq!(
            canonicalize("https://example.com:443/page#section", &tracking()),
            "https://example.com/page"
        );
        assert_eq!(
            canonicalize("http://example.com:80/", &tracking()),
            "http://example.com/"
        );
    }

    #[test]
    fn test_keeps_non_default_port() {
        assert_eq!(
            canonicalize("http://localhost:3000/app/", &tracking()),
            "http://localhost:3000/app"
        );
    }

    #[test]
    fn test_lowercases_host_only() {
        assert_eq!(
            canonicalize("https://WWW.Example.COM/CaseSensitive", &tracking()),
            "https://www.example.com/CaseSensitive"
        );
    }

    #[test]
    fn test_strips_tracking_params() {
        assert_eq!(
            canonicalize(
                "https://a.com/post?utm_source=x&id=7&fbclid=abc&hsa_cam=1&ref=tw",
                &tracking()
            ),
            "https://a.com/post?id=7"
        );
        assert_eq!(canonicalize("https://a.com/?utm_source=x", &tracking()), "https://a.com/");
    }

    #[test]
    fn test_tracking_disabled_keeps_params_sorted() {
        assert_eq!(
            canonicalize("https://a.com/?utm_source=x&b=2", &keep_all()),
            "https://a.com/?b=2&utm_source=x"
        );
    }

    #[test]
    fn test_strip_all_wins() {
        assert_eq!(
            canonicalize("https://a.com/search?q=rust&page=2", &strip_all()),
            "https://a.com/search"
        );
    }

    #[test]
    fn test_param_order_independent() {
        let a = canonicalize("https://a.com/x?b=2&a=1&c=3", &tracking());
        let b = canonicalize("https://a.com/x?c=3&a=1&b=2", &tracking());
        assert_eq!(a, b);
        assert_eq!(a, "https://a.com/x?a=1&b=2&c=3");
    }

    #[test]
    fn test_repeated_keys_order_independent() {
        let a = canonicalize("https://a.com/?tag=b&tag=a", &tracking());
        let b = canonicalize("https://a.com/?tag=a&tag=b", &tracking());
        assert_eq!(a, b);
    }

    #[test]
    fn test_trailing_slash() {
        assert_eq!(canonicalize("https://a.com/docs/", &tracking()), "https://a.com/docs");
        assert_eq!(canonicalize("https://a.com/docs//", &tracking()), "https://a.com/docs");
        assert_eq!(canonicalize("https://a.com/", &tracking()), "https://a.com/");
        assert_eq!(canonicalize("https://a.com", &tracking()), "https://a.com/");
    }

    #[test]
    fn test_idempotent() {
        let urls = [
            "https://Example.com:443/a/b/?utm_medium=x&z=1&a=%20space#frag",
            "http://a.com/?q",
            "https://a.com/path//?x=1&x=0",
            "https://a.com/?",
            "http://127.0.0.1:8080/",
        ];
        for policy in [tracking(), keep_all(), strip_all()] {
            for url in urls {
                let once = canonicalize(url, &policy);
                assert_eq!(canonicalize(&once, &policy), once, "not idempotent for {url}");
            }
        }
    }

    #[test]
    fn test_non_http_unchanged() {
        let policy = tracking();
        assert_eq!(canonicalize("chrome://settings/#x", &policy), "chrome://settings/#x");
        assert_eq!(canonicalize("ftp://a.com/file/", &policy), "ftp://a.com/file/");
        assert_eq!(canonicalize("mailto:a@b.com", &policy), "mailto:a@b.com");
    }

    #[test]
    fn test_malformed_unchanged() {
        let policy = tracking();
        assert_eq!(canonicalize("not a url", &policy), "not a url");
        assert_eq!(canonicalize("", &policy), "");
        assert_eq!(canonicalize("https://", &policy), "https://");
        assert_eq!(canonicalize("http://exa mple.com", &policy), "http://exa mple.com");
    }

    #[test]
    fn test_is_http_url() {
        assert!(is_http_url("https://a.com"));
        assert!(is_http_url("HTTP://a.com"));
        assert!(!is_http_url("ftp://a.com"));
        assert!(!is_http_url("chrome://newtab"));
    }

    #[test]
    fn test_is_stashable_url() {
        assert!(is_stashable_url("https://a.com/x"));
        assert!(!is_stashable_url(""));
        assert!(!is_stashable_url("chrome-extension://abc/index.html"));
        assert!(!is_stashable_url("view-source:https://a.com"));
        assert!(!is_stashable_url("about:blank"));
        assert!(!is_stashable_url("file:///tmp/x.html"));
    }
}
