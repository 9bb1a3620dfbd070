// Matching logic based on Solid Router
// see https://github.com/solidjs/solid-router/blob/main/src/utils.ts

//! Path-pattern matching against the in-memory pattern registry.
//!
//! Patterns are absolute paths whose segments are either static (`users`),
//! dynamic (`:id`), or a trailing catch-all (`/*` or `/*rest`). The registry
//! accumulates every pattern the server has ever reported for this session,
//! which is what makes client-side re-matching (and therefore the
//! client-only navigation skip and client-loader dispatch) possible.

use crate::params::ParamsMap;

/// A successful test of one pattern against one location path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathMatch {
    /// The static portion of the location consumed by the pattern.
    pub path: String,
    /// Values captured by `:param` segments.
    pub params: ParamsMap,
    /// The remainder consumed by a trailing catch-all, if the pattern has one.
    pub splat: Option<String>,
}

/// A compiled path pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Matcher {
    splat: Option<String>,
    segments: Vec<String>,
    partial: bool,
}

impl Matcher {
    /// Compiles a pattern that must consume the entire location.
    pub fn new(path: &str) -> Self {
        Self::new_with_partial(path, false)
    }

    /// Compiles a pattern; `partial` allows the location to continue past the
    /// pattern's last segment.
    pub fn new_with_partial(path: &str, partial: bool) -> Self {
        let (pattern, splat) = match path.split_once("/*") {
            Some((p, s)) => (p, Some(s.to_string())),
            None => (path, None),
        };
        let segments = pattern
            .split('/')
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .collect::<Vec<_>>();

        Self {
            splat,
            segments,
            partial,
        }
    }

    /// Tests a location path, returning captures on a match.
    pub fn test(&self, location: &str) -> Option<PathMatch> {
        let loc_segments = location
            .split('/')
            .filter(|n| !n.is_empty())
            .collect::<Vec<_>>();
        let loc_len = loc_segments.len();
        let len = self.segments.len();

        // not a match if
        // 1) the pattern has segments the location is missing
        // 2) the location has extra segments, and there's no splat and partial
        //    matches are not allowed
        if loc_len < len {
            return None;
        }
        let len_diff = loc_len - len;
        if len_diff > 0 && self.splat.is_none() && !self.partial {
            return None;
        }

        let mut path = String::new();
        let mut params = ParamsMap::new();
        for (segment, loc_segment) in self.segments.iter().zip(loc_segments.iter()) {
            if let Some(param_name) = segment.strip_prefix(':') {
                params.insert(param_name.to_string(), (*loc_segment).to_string());
            } else if segment != loc_segment {
                return None;
            }

            path.push('/');
            path.push_str(loc_segment);
        }

        let splat = self.splat.as_ref().map(|_| {
            if len_diff > 0 {
                loc_segments[len..].join("/")
            } else {
                String::new()
            }
        });

        Some(PathMatch {
            path,
            params,
            splat,
        })
    }

    fn has_splat(&self) -> bool {
        self.splat.is_some()
    }
}

/// Scores a pattern for specificity: static segments beat dynamic ones, and
/// catch-alls lose a point for the tail they swallow.
pub(crate) fn score_pattern(pattern: &str) -> usize {
    let (pattern, splat) = match pattern.split_once("/*") {
        Some((p, s)) => (p, Some(s)),
        None => (pattern, None),
    };
    let segments = pattern
        .split('/')
        .filter(|n| !n.is_empty())
        .collect::<Vec<_>>();
    segments.iter().fold(
        segments.len() - usize::from(splat.is_some()),
        |score, segment| score + if segment.starts_with(':') { 2 } else { 3 },
    )
}

/// The full result of matching a location path against the registry: the
/// matched pattern chain (outermost first) plus the captures of the leaf.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteMatchSet {
    /// Matched patterns, outermost first; the last entry consumed the whole
    /// path.
    pub chain: Vec<String>,
    /// Dynamic params captured by the leaf pattern.
    pub params: ParamsMap,
    /// Catch-all values captured by the leaf pattern.
    pub splat_values: Vec<String>,
}

/// Matches `path` against every registered pattern.
///
/// The leaf is the highest-scoring pattern that consumes the entire path; its
/// chain is the leaf plus every registered pattern that is a segment-prefix of
/// it (which therefore partially matches the same location), ordered outermost
/// first. Returns `None` when no registered pattern fully matches.
pub fn match_registered_patterns(patterns: &[String], path: &str) -> Option<RouteMatchSet> {
    let mut best: Option<(usize, &String, PathMatch)> = None;
    for pattern in patterns {
        let matcher = Matcher::new(pattern);
        if let Some(m) = matcher.test(path) {
            let score = score_pattern(pattern);
            // splat-less candidates win ties against catch-alls
            let better = match &best {
                None => true,
                Some((best_score, best_pattern, _)) => {
                    score > *best_score
                        || (score == *best_score
                            && Matcher::new(best_pattern).has_splat()
                            && !matcher.has_splat())
                }
            };
            if better {
                best = Some((score, pattern, m));
            }
        }
    }

    let (_, leaf, leaf_match) = best?;

    let mut chain: Vec<&String> = patterns
        .iter()
        .filter(|candidate| *candidate != leaf && is_pattern_prefix(candidate, leaf))
        .collect();
    chain.sort_by_key(|p| p.split('/').filter(|s| !s.is_empty()).count());
    chain.push(leaf);

    let splat_values = leaf_match
        .splat
        .as_deref()
        .map(|splat| {
            splat
                .split('/')
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    Some(RouteMatchSet {
        chain: chain.into_iter().cloned().collect(),
        params: leaf_match.params,
        splat_values,
    })
}

/// Whether `candidate`'s segments are a proper prefix of `pattern`'s.
/// Catch-all candidates are never prefixes; they terminate a chain.
fn is_pattern_prefix(candidate: &str, pattern: &str) -> bool {
    if candidate.contains("/*") {
        return false;
    }
    let candidate_segments: Vec<_> = candidate.split('/').filter(|s| !s.is_empty()).collect();
    let pattern_segments: Vec<_> = pattern.split('/').filter(|s| !s.is_empty()).collect();
    candidate_segments.len() < pattern_segments.len()
        && candidate_segments
            .iter()
            .zip(pattern_segments.iter())
            .all(|(c, p)| c == p)
}
