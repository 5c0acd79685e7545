//! The router index (component C11): routes partitioned by method (plus an
//! `ANY` bucket), matched in specificity order, immutable once built and
//! freely shared (via `Rc`) across every connection task on a worker
//! without locking.

use std::collections::HashMap;

use http::Method;

use crate::{
    request::PathParams,
    route::{BuildError, FlatRoute, Scope},
};

/// The result of looking up `(method, path)` against the index.
pub enum Lookup<'a> {
    Matched { route: &'a FlatRoute, params: PathParams },
    /// The path matched some route's pattern, but not for this method.
    /// `allow` lists every method (in registration order of first
    /// encounter) that does have a route for this exact path.
    MethodNotAllowed { allow: Vec<Method> },
    NotFound,
}

/// One method's routes, kept sorted by descending specificity
/// (most-specific first) so the first structural match found while
/// iterating is, by construction, the specificity-maximum match.
struct Bucket {
    routes: Vec<FlatRoute>,
}

impl Bucket {
    fn find(&self, path: &str) -> Option<(&FlatRoute, Vec<(String, String)>)> {
        self.routes.iter().find_map(|r| r.pattern().matches(path).map(|params| (r, params)))
    }
}

pub struct RouterIndex {
    by_method: HashMap<Method, Bucket>,
    any: Bucket,
}

impl RouterIndex {
    /// Flattens `root` and builds the index, partitioning by method (`ANY`
    /// routes land in their own bucket) and rejecting a duplicate
    /// `(method, pattern)` pair with [`BuildError::RouteConflict`].
    pub fn build(root: Scope) -> Result<RouterIndex, BuildError> {
        let flat = root.flatten()?;

        let mut seen: std::collections::HashSet<(Option<String>, String)> = std::collections::HashSet::new();
        for route in &flat {
            let key = (route.method().map(|m| m.to_string()), route.pattern().structural_key());
            if !seen.insert(key) {
                return Err(BuildError::RouteConflict {
                    method: route.method().map(|m| m.to_string()).unwrap_or_else(|| "ANY".to_string()),
                    pattern: route.pattern().as_str().to_string(),
                });
            }
        }

        let mut by_method: HashMap<Method, Vec<FlatRoute>> = HashMap::new();
        let mut any = Vec::new();
        for route in flat {
            match route.method().cloned() {
                Some(m) => by_method.entry(m).or_default().push(route),
                None => any.push(route),
            }
        }

        for bucket in by_method.values_mut() {
            sort_by_specificity(bucket);
        }
        sort_by_specificity(&mut any);

        Ok(RouterIndex {
            by_method: by_method.into_iter().map(|(k, v)| (k, Bucket { routes: v })).collect(),
            any: Bucket { routes: any },
        })
    }

    /// Looks up `(method, path)`. Method-specific routes are checked before
    /// the `ANY` bucket: a method-specific route always wins over an `ANY`
    /// route at equal specificity (and since flattening forbids a duplicate
    /// pattern within the *same* bucket, this only matters when two
    /// different patterns in different buckets both structurally match --
    /// the method-specific bucket is simply tried first).
    pub fn lookup(&self, method: &Method, path: &str) -> Lookup<'_> {
        if let Some(bucket) = self.by_method.get(method) {
            if let Some((route, params)) = bucket.find(path) {
                return Lookup::Matched { route, params: PathParams(params) };
            }
        }
        if let Some((route, params)) = self.any.find(path) {
            return Lookup::Matched { route, params: PathParams(params) };
        }

        let mut allow: Vec<Method> = Vec::new();
        for (m, bucket) in &self.by_method {
            if m == method {
                continue;
            }
            if bucket.find(path).is_some() {
                allow.push(m.clone());
            }
        }
        if allow.is_empty() {
            Lookup::NotFound
        } else {
            allow.sort_by(|a, b| a.as_str().cmp(b.as_str()));
            Lookup::MethodNotAllowed { allow }
        }
    }
}

fn sort_by_specificity(routes: &mut [FlatRoute]) {
    // `sort_by` is stable, so routes tying on every specificity field keep
    // their relative registration order (earlier wins).
    routes.sort_by(|a, b| {
        a.pattern().specificity().cmp_preference(&b.pattern().specificity()).reverse()
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::route::route;

    async fn ok() -> &'static str {
        "ok"
    }

    #[test]
    fn method_and_path_match_yields_params() {
        let scope = Scope::new("").serve(route::get("/api/v1/users/{user}", ok));
        let index = RouterIndex::build(scope).unwrap();
        match index.lookup(&Method::GET, "/api/v1/users/david") {
            Lookup::Matched { params, .. } => assert_eq!(params.get("user"), Some("david")),
            _ => panic!("expected a match"),
        }
    }

    #[test]
    fn method_not_allowed_lists_allow_header() {
        let scope = Scope::new("").serve(route::get("/x", ok)).serve(route::post("/x", ok));
        let index = RouterIndex::build(scope).unwrap();
        match index.lookup(&Method::DELETE, "/x") {
            Lookup::MethodNotAllowed { allow } => {
                assert_eq!(allow, vec![Method::GET, Method::POST]);
            }
            _ => panic!("expected 405"),
        }
    }

    #[test]
    fn unknown_path_is_not_found() {
        let scope = Scope::new("").serve(route::get("/x", ok));
        let index = RouterIndex::build(scope).unwrap();
        assert!(matches!(index.lookup(&Method::GET, "/y"), Lookup::NotFound));
    }

    #[test]
    fn method_specific_beats_any_at_equal_pattern() {
        let scope = Scope::new("").serve(route::any("/x", ok)).serve(route::get("/x", ok));
        let index = RouterIndex::build(scope).unwrap();
        // Both buckets contain a route for "/x"; GET must hit the
        // method-specific one, not fall through to ANY (there'd be no
        // observable difference here except that build() didn't reject
        // this as a conflict, since ANY and GET are different buckets).
        assert!(matches!(index.lookup(&Method::GET, "/x"), Lookup::Matched { .. }));
        assert!(matches!(index.lookup(&Method::DELETE, "/x"), Lookup::Matched { .. }));
    }

    #[test]
    fn duplicate_method_and_pattern_is_a_conflict() {
        let scope = Scope::new("").serve(route::get("/x", ok)).serve(route::get("/x", ok));
        assert!(matches!(RouterIndex::build(scope), Err(BuildError::RouteConflict { .. })));
    }

    #[test]
    fn patterns_differing_only_in_param_name_are_a_conflict() {
        let scope =
            Scope::new("").serve(route::get("/users/{id}", ok)).serve(route::get("/users/{name}", ok));
        assert!(matches!(RouterIndex::build(scope), Err(BuildError::RouteConflict { .. })));
    }

    #[test]
    fn more_specific_pattern_wins_regardless_of_registration_order_test() {
        let scope =
            Scope::new("").serve(route::get("/users/{id}", ok)).serve(route::get("/users/new", ok));
        let index = RouterIndex::build(scope).unwrap();
        match index.lookup(&Method::GET, "/users/new") {
            Lookup::Matched { params, .. } => assert!(params.get("id").is_none()),
            _ => panic!("expected the static route to win"),
        }
    }
}
