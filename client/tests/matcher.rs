// Test cases drawn from Solid Router
// see https://github.com/solidjs/solid-router/blob/main/test/utils.spec.ts

use vorma_client::matcher::{Matcher, PathMatch};
use vorma_client::params_map;

#[test]
fn create_matcher_should_return_no_params_when_location_matches_exactly() {
    let matcher = Matcher::new("/foo/bar");
    let matched = matcher.test("/foo/bar");
    assert_eq!(
        matched,
        Some(PathMatch {
            path: "/foo/bar".into(),
            params: params_map!(),
            splat: None,
        })
    );
}

#[test]
fn create_matcher_should_return_none_when_location_doesnt_match() {
    let matcher = Matcher::new("/foo/bar");
    assert_eq!(matcher.test("/foo/baz"), None);
}

#[test]
fn create_matcher_should_build_params_collection() {
    let matcher = Matcher::new("/foo/:id");
    let matched = matcher.test("/foo/abc-123");
    assert_eq!(
        matched,
        Some(PathMatch {
            path: "/foo/abc-123".into(),
            params: params_map!("id" => "abc-123"),
            splat: None,
        })
    );
}

#[test]
fn create_matcher_should_match_past_end_when_ending_in_asterisk() {
    let matcher = Matcher::new("/foo/bar/*");
    let matched = matcher.test("/foo/bar/baz");
    assert_eq!(
        matched,
        Some(PathMatch {
            path: "/foo/bar".into(),
            params: params_map!(),
            splat: Some("baz".into()),
        })
    );
}

#[test]
fn create_matcher_should_not_match_past_end_when_not_ending_in_asterisk() {
    let matcher = Matcher::new("/foo/bar");
    assert_eq!(matcher.test("/foo/bar/baz"), None);
}

#[test]
fn create_matcher_should_capture_remaining_location_when_ending_in_asterisk() {
    let matcher = Matcher::new("/foo/bar/*rest");
    let matched = matcher.test("/foo/bar/baz/qux");
    assert_eq!(
        matched,
        Some(PathMatch {
            path: "/foo/bar".into(),
            params: params_map!(),
            splat: Some("baz/qux".into()),
        })
    );
}

#[test]
fn create_matcher_should_capture_empty_splat_on_perfect_match() {
    let matcher = Matcher::new("/foo/bar/*rest");
    let matched = matcher.test("/foo/bar");
    assert_eq!(
        matched,
        Some(PathMatch {
            path: "/foo/bar".into(),
            params: params_map!(),
            splat: Some(String::new()),
        })
    );
}

#[test]
fn partial_matchers_allow_trailing_segments() {
    let matcher = Matcher::new_with_partial("/users", true);
    assert!(matcher.test("/users/4/settings").is_some());
    assert!(Matcher::new("/users").test("/users/4/settings").is_none());
}

#[test]
fn shorter_patterns_never_underflow() {
    let matcher = Matcher::new("/a/b/c");
    assert_eq!(matcher.test("/a"), None);
    assert_eq!(matcher.test("/"), None);
}

mod registry {
    use vorma_client::matcher::match_registered_patterns;
    use vorma_client::params_map;

    fn patterns(list: &[&str]) -> Vec<String> {
        list.iter().map(|p| p.to_string()).collect()
    }

    #[test]
    fn builds_the_chain_outermost_first() {
        let registered = patterns(&["/users", "/users/:id", "/users/:id/posts"]);
        let matched = match_registered_patterns(&registered, "/users/7/posts").unwrap();
        assert_eq!(
            matched.chain,
            ["/users", "/users/:id", "/users/:id/posts"]
        );
        assert_eq!(matched.params, params_map!("id" => "7"));
        assert!(matched.splat_values.is_empty());
    }

    #[test]
    fn prefers_static_over_dynamic_leaves() {
        let registered = patterns(&["/users/:id", "/users/new"]);
        let matched = match_registered_patterns(&registered, "/users/new").unwrap();
        assert_eq!(matched.chain.last().map(String::as_str), Some("/users/new"));
        assert!(matched.params.is_empty());
    }

    #[test]
    fn splat_leaves_capture_their_tail() {
        let registered = patterns(&["/docs", "/docs/*"]);
        let matched = match_registered_patterns(&registered, "/docs/a/b/c").unwrap();
        assert_eq!(matched.chain, ["/docs", "/docs/*"]);
        assert_eq!(matched.splat_values, ["a", "b", "c"]);
    }

    #[test]
    fn unmatched_paths_return_none() {
        let registered = patterns(&["/users/:id"]);
        assert!(match_registered_patterns(&registered, "/teams/4").is_none());
    }
}
