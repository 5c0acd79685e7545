//! Path pattern parsing and matching (component C1).
//!
//! A pattern is a `/`-separated sequence of segments, each either a literal,
//! a named parameter (`{name}`), or a trailing wildcard (`#name`, only valid
//! as the final segment, introduced by its own `/`). Matching compares a
//! request path against every registered pattern and resolves ties by
//! specificity -- see [`Specificity`] -- rather than by trie insertion
//! order, which is why this crate does not reuse a trie-router crate: a trie
//! naturally returns the first structural match, not the most specific one.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Segment {
    Literal(String),
    Param(String),
    Wildcard(String),
}

/// A parsed route pattern, e.g. `/users/{id}/posts/#rest`.
#[derive(Debug, Clone)]
pub struct Pattern {
    raw: String,
    segments: Vec<Segment>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid route pattern {0:?}: {1}")]
pub struct PatternError(String, &'static str);

fn valid_name(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl Pattern {
    /// Parses `raw` (e.g. `""`, `/`, `/users/{id}`, `/assets/#path`) per the
    /// grammar: `pattern = *( "/" segment ) [ "/" "#" name ]`. Trailing
    /// slashes are significant -- `/a` and `/a/` parse to distinct patterns.
    pub fn parse(raw: &str) -> Result<Self, PatternError> {
        if !raw.is_empty() && !raw.starts_with('/') {
            return Err(PatternError(raw.to_string(), "pattern must be empty or start with '/'"));
        }
        let mut segments = Vec::new();
        let mut names: std::collections::HashSet<String> = std::collections::HashSet::new();
        // Split on '/', keeping every segment including trailing empty ones
        // (so `/a/` yields segments ["a", ""], distinguishing it from `/a`).
        let parts: Vec<&str> = if raw.is_empty() { Vec::new() } else { raw[1..].split('/').collect() };
        let len = parts.len();
        for (i, part) in parts.iter().enumerate() {
            let is_last = i + 1 == len;
            if let Some(name) = part.strip_prefix('#') {
                if !is_last {
                    return Err(PatternError(raw.to_string(), "wildcard must be the last segment"));
                }
                if !valid_name(name) {
                    return Err(PatternError(raw.to_string(), "empty or invalid wildcard name"));
                }
                if !names.insert(name.to_string()) {
                    return Err(PatternError(raw.to_string(), "duplicate parameter name"));
                }
                segments.push(Segment::Wildcard(name.to_string()));
            } else if part.starts_with('{') {
                let Some(name) = part.strip_prefix('{').and_then(|s| s.strip_suffix('}')) else {
                    return Err(PatternError(raw.to_string(), "unbalanced '{' in segment"));
                };
                if !valid_name(name) {
                    return Err(PatternError(raw.to_string(), "empty or invalid parameter name"));
                }
                if !names.insert(name.to_string()) {
                    return Err(PatternError(raw.to_string(), "duplicate parameter name"));
                }
                segments.push(Segment::Param(name.to_string()));
            } else if part.contains('{') || part.contains('}') || part.contains('#') {
                return Err(PatternError(raw.to_string(), "unbalanced '{'/'}' or stray '#' in segment"));
            } else {
                segments.push(Segment::Literal(part.to_string()));
            }
        }
        Ok(Pattern { raw: raw.to_string(), segments })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// A normalized form of this pattern where every `Param`/`Wildcard`
    /// segment is replaced by a placeholder token, so two patterns that
    /// differ only in parameter/wildcard naming (`/users/{id}` vs.
    /// `/users/{name}`) compare equal. Used to detect route conflicts that
    /// would otherwise be structurally identical at request-match time.
    pub(crate) fn structural_key(&self) -> String {
        let mut key = String::new();
        for seg in &self.segments {
            key.push('/');
            match seg {
                Segment::Literal(s) => key.push_str(s),
                Segment::Param(_) => key.push_str("{}"),
                Segment::Wildcard(_) => key.push_str("#"),
            }
        }
        key
    }

    /// Try to match `path` against this pattern, returning the captured
    /// `(name, raw_value)` pairs in left-to-right order. Values are left
    /// percent-encoded; decoding is the extractor's job (see
    /// [`crate::extract::Path`]), done lazily per accessed parameter. The
    /// match is purely structural: no percent-decoding happens before or
    /// during matching, only after a parameter is bound.
    pub(crate) fn matches(&self, path: &str) -> Option<Vec<(String, String)>> {
        if self.segments.is_empty() {
            return if path.is_empty() { Some(Vec::new()) } else { None };
        }
        if !path.starts_with('/') {
            return None;
        }
        let mut captures = Vec::new();
        let mut path_parts = path[1..].split('/');
        let mut pattern_iter = self.segments.iter();

        loop {
            match pattern_iter.next() {
                None => {
                    return if path_parts.next().is_none() { Some(captures) } else { None };
                }
                Some(Segment::Wildcard(name)) => {
                    let rest: Vec<&str> = path_parts.collect();
                    captures.push((name.clone(), rest.join("/")));
                    return Some(captures);
                }
                Some(Segment::Literal(lit)) => match path_parts.next() {
                    Some(seg) if seg == lit => continue,
                    _ => return None,
                },
                Some(Segment::Param(name)) => match path_parts.next() {
                    Some(seg) if !seg.is_empty() => {
                        captures.push((name.clone(), seg.to_string()));
                    }
                    _ => return None,
                },
            }
        }
    }

    pub(crate) fn specificity(&self) -> Specificity {
        let mut literal_segments = 0usize;
        let mut literal_len = 0usize;
        let mut has_wildcard = false;
        for seg in &self.segments {
            match seg {
                Segment::Literal(s) => {
                    literal_segments += 1;
                    literal_len += s.len();
                }
                Segment::Param(_) => {}
                Segment::Wildcard(_) => has_wildcard = true,
            }
        }
        Specificity { has_wildcard, literal_segments, literal_len, total_segments: self.segments.len() }
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Orders candidate routes from most to least specific: more literal
/// segments wins first, then longer literal text, then no wildcard beats a
/// trailing wildcard, then more total segments. Two routes that tie on
/// every field are disambiguated by registration order, which the router
/// preserves by scanning candidates in the order they were pushed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Specificity {
    has_wildcard: bool,
    literal_segments: usize,
    literal_len: usize,
    total_segments: usize,
}

impl Specificity {
    /// Orders `self` against `other`; `Greater` means `self` should be
    /// preferred over `other` when both match the same request path.
    pub(crate) fn cmp_preference(&self, other: &Specificity) -> std::cmp::Ordering {
        use std::cmp::Ordering::*;
        self.literal_segments
            .cmp(&other.literal_segments)
            .then(self.literal_len.cmp(&other.literal_len))
            .then((!self.has_wildcard).cmp(&!other.has_wildcard))
            .then(self.total_segments.cmp(&other.total_segments))
            .then(Equal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_pattern_matches_only_empty_input() {
        let p = Pattern::parse("").unwrap();
        assert_eq!(p.matches(""), Some(vec![]));
        assert_eq!(p.matches("/"), None);
    }

    #[test]
    fn trailing_slash_is_significant() {
        let a = Pattern::parse("/a").unwrap();
        let b = Pattern::parse("/a/").unwrap();
        assert_eq!(a.matches("/a"), Some(vec![]));
        assert_eq!(a.matches("/a/"), None);
        assert_eq!(b.matches("/a/"), Some(vec![]));
        assert_eq!(b.matches("/a"), None);
    }

    #[test]
    fn literal_segment_matches_exactly() {
        let p = Pattern::parse("/users/new").unwrap();
        assert_eq!(p.matches("/users/new"), Some(vec![]));
        assert_eq!(p.matches("/users/42"), None);
    }

    #[test]
    fn param_segment_captures_value() {
        let p = Pattern::parse("/users/{id}").unwrap();
        assert_eq!(p.matches("/users/42"), Some(vec![("id".to_string(), "42".to_string())]));
    }

    #[test]
    fn wildcard_captures_remaining_path() {
        let p = Pattern::parse("/assets/#path").unwrap();
        assert_eq!(
            p.matches("/assets/css/site.css"),
            Some(vec![("path".to_string(), "css/site.css".to_string())])
        );
    }

    #[test]
    fn wildcard_may_be_empty() {
        let p = Pattern::parse("/assets/#path").unwrap();
        assert_eq!(p.matches("/assets/"), Some(vec![("path".to_string(), "".to_string())]));
    }

    #[test]
    fn wildcard_must_be_last_segment() {
        assert!(Pattern::parse("/assets/#rest/more").is_err());
    }

    #[test]
    fn unbalanced_braces_are_rejected() {
        assert!(Pattern::parse("/users/{id").is_err());
        assert!(Pattern::parse("/users/id}").is_err());
    }

    #[test]
    fn empty_param_name_is_rejected() {
        assert!(Pattern::parse("/users/{}").is_err());
    }

    #[test]
    fn duplicate_param_name_is_rejected() {
        assert!(Pattern::parse("/users/{id}/posts/{id}").is_err());
        assert!(Pattern::parse("/users/{id}/posts/#id").is_err());
    }

    #[test]
    fn percent_encoding_is_not_decoded_during_matching() {
        let p = Pattern::parse("/greet/{name}").unwrap();
        // The literal byte sequence "hi%20there" is what gets captured; the
        // matcher never decodes it.
        assert_eq!(
            p.matches("/greet/hi%20there"),
            Some(vec![("name".to_string(), "hi%20there".to_string())])
        );
    }

    #[test]
    fn static_route_outranks_param_route() {
        let static_p = Pattern::parse("/users/new").unwrap();
        let param_p = Pattern::parse("/users/{id}").unwrap();
        assert_eq!(
            static_p.specificity().cmp_preference(&param_p.specificity()),
            std::cmp::Ordering::Greater
        );
    }

    #[test]
    fn more_literal_segments_outrank_fewer() {
        let a = Pattern::parse("/users/{id}/profile").unwrap();
        let b = Pattern::parse("/users/{id}/{section}").unwrap();
        assert_eq!(a.specificity().cmp_preference(&b.specificity()), std::cmp::Ordering::Greater);
    }

    #[test]
    fn wildcard_outranked_by_everything() {
        let wild = Pattern::parse("/#rest").unwrap();
        let param = Pattern::parse("/{id}").unwrap();
        assert_eq!(wild.specificity().cmp_preference(&param.specificity()), std::cmp::Ordering::Less);
    }

    #[test]
    fn static_token_count_beats_absence_of_wildcard() {
        let all_params = Pattern::parse("/{a}/{b}/{c}").unwrap();
        let wildcard_with_statics = Pattern::parse("/a/b/#rest").unwrap();
        assert_eq!(
            wildcard_with_statics.specificity().cmp_preference(&all_params.specificity()),
            std::cmp::Ordering::Greater
        );
    }
}
