//! URL arithmetic for navigation targets and asset references.
//!
//! All URL handling goes through [`url::Url`] so it behaves identically in
//! the browser and under test. The only Vorma-specific pieces are the three
//! reserved query parameters: `vorma_json` (build id, on every navigation
//! fetch), `dpl` (deployment id, on revalidations), and `vorma_reload`
//! (carried by forced full-document redirects and stripped on boot).

use url::Url;

/// Query parameter carrying the build id on JSON navigation fetches.
pub const QUERY_JSON: &str = "vorma_json";
/// Query parameter carrying the deployment id on revalidations.
pub const QUERY_DEPLOYMENT: &str = "dpl";
/// Query parameter marking a forced full-document reload.
pub const QUERY_RELOAD: &str = "vorma_reload";

/// Resolves `href` against `base` (the current location), producing an
/// absolute URL. `href` may already be absolute.
pub fn absolutize(href: &str, base: &Url) -> Result<Url, url::ParseError> {
    match Url::parse(href) {
        Ok(url) => Ok(url),
        Err(url::ParseError::RelativeUrlWithoutBase) => base.join(href),
        Err(e) => Err(e),
    }
}

/// Whether two URLs are the same page, ignoring the fragment.
pub fn equal_ignoring_fragment(a: &Url, b: &Url) -> bool {
    let mut a = a.clone();
    let mut b = b.clone();
    a.set_fragment(None);
    b.set_fragment(None);
    a == b
}

/// Whether two URLs differ *only* in their fragment.
pub fn fragment_only_change(a: &Url, b: &Url) -> bool {
    a != b && equal_ignoring_fragment(a, b)
}

/// Whether the URL uses a scheme the navigation core handles.
pub fn is_http_like(url: &Url) -> bool {
    matches!(url.scheme(), "http" | "https")
}

/// Whether two URLs share an origin.
pub fn same_origin(a: &Url, b: &Url) -> bool {
    a.origin() == b.origin()
}

/// Sets (replacing, not appending) a query parameter.
pub fn set_query_param(url: &mut Url, key: &str, value: &str) {
    let retained: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| k != key)
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    let mut pairs = url.query_pairs_mut();
    pairs.clear();
    for (k, v) in &retained {
        pairs.append_pair(k, v);
    }
    pairs.append_pair(key, value);
}

/// Removes a query parameter, reporting whether it was present.
pub fn remove_query_param(url: &mut Url, key: &str) -> bool {
    let mut present = false;
    let retained: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| {
            let matches = k == key;
            present |= matches;
            !matches
        })
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if present {
        if retained.is_empty() {
            url.set_query(None);
        } else {
            let mut pairs = url.query_pairs_mut();
            pairs.clear();
            for (k, v) in &retained {
                pairs.append_pair(k, v);
            }
        }
    }
    present
}

/// Builds the request URL for a JSON navigation fetch: the target plus
/// `vorma_json=<buildID>`, plus `dpl=<deploymentID>` on revalidations when a
/// deployment id is known.
pub fn to_json_request_url(
    target: &Url,
    build_id: &str,
    deployment_id: Option<&str>,
) -> Url {
    let mut url = target.clone();
    url.set_fragment(None);
    set_query_param(&mut url, QUERY_JSON, build_id);
    if let Some(dpl) = deployment_id {
        set_query_param(&mut url, QUERY_DEPLOYMENT, dpl);
    }
    url
}

/// Builds the full-document reload URL used by forced-internal redirects.
pub fn to_reload_url(target: &Url, build_id: &str) -> Url {
    let mut url = target.clone();
    set_query_param(&mut url, QUERY_RELOAD, build_id);
    url
}

/// Joins an asset path onto a prefix (a public path or a dev-server origin),
/// collapsing the duplicate slashes a naive concatenation would produce.
pub fn join_asset_path(prefix: &str, path: &str) -> String {
    if prefix.is_empty() {
        return path.to_string();
    }
    let trimmed = path.trim_start_matches('/');
    format!("{}/{}", prefix.trim_end_matches('/'), trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://example.com/app/page?tab=1#top").unwrap()
    }

    #[test]
    fn absolutize_resolves_relative_hrefs() {
        let url = absolutize("/users/4?x=1#frag", &base()).unwrap();
        assert_eq!(url.as_str(), "https://example.com/users/4?x=1#frag");
        let url = absolutize("https://other.dev/x", &base()).unwrap();
        assert_eq!(url.origin(), Url::parse("https://other.dev").unwrap().origin());
    }

    #[test]
    fn fragment_insensitive_equality() {
        let a = Url::parse("https://example.com/a?q=1#one").unwrap();
        let b = Url::parse("https://example.com/a?q=1#two").unwrap();
        let c = Url::parse("https://example.com/a?q=2#one").unwrap();
        assert!(equal_ignoring_fragment(&a, &b));
        assert!(fragment_only_change(&a, &b));
        assert!(!equal_ignoring_fragment(&a, &c));
        assert!(!fragment_only_change(&a, &a));
    }

    #[test]
    fn json_request_url_carries_build_and_deployment_ids() {
        let target = Url::parse("https://example.com/users?tab=2#bio").unwrap();
        let url = to_json_request_url(&target, "b123", Some("dep9"));
        assert_eq!(url.fragment(), None);
        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert!(pairs.contains(&("tab".into(), "2".into())));
        assert!(pairs.contains(&(QUERY_JSON.into(), "b123".into())));
        assert!(pairs.contains(&(QUERY_DEPLOYMENT.into(), "dep9".into())));
    }

    #[test]
    fn json_request_url_replaces_stale_params() {
        let target = Url::parse("https://example.com/u?vorma_json=old").unwrap();
        let url = to_json_request_url(&target, "new", None);
        assert_eq!(url.query(), Some("vorma_json=new"));
    }

    #[test]
    fn reload_param_round_trip() {
        let target = Url::parse("https://example.com/login").unwrap();
        let mut url = to_reload_url(&target, "b42");
        assert_eq!(url.query(), Some("vorma_reload=b42"));
        assert!(remove_query_param(&mut url, QUERY_RELOAD));
        assert_eq!(url.query(), None);
        assert!(!remove_query_param(&mut url, QUERY_RELOAD));
    }

    #[test]
    fn asset_paths_collapse_duplicate_slashes() {
        assert_eq!(
            join_asset_path("https://localhost:5173/", "/chunks/a.js"),
            "https://localhost:5173/chunks/a.js"
        );
        assert_eq!(join_asset_path("/static/", "/x.css"), "/static/x.css");
        assert_eq!(join_asset_path("", "/x.css"), "/x.css");
    }
}
