//! The route & scope builder (component C10): a declarative tree of scopes
//! (prefix + middlewares + state) terminating in routes (method + pattern +
//! state + handler), flattened once at `Server::build()` time into the
//! [`crate::router::RouterIndex`] the connection loop actually dispatches
//! against. A route's own `.state()` and every ancestor scope's `.state()`
//! stack additively, innermost (the route itself) first.
//!
//! Build once, compose once, no per-request allocation for the chain, in
//! the spirit of a `FactoryStack`/`Scope` composition -- but expressed as a
//! plain recursive tree rather than a generic layer stack, since routes
//! here are registered dynamically (arbitrary user handlers and
//! middlewares), not as a fixed compile-time-known pipeline.

use std::rc::Rc;

use http::Method;

use crate::{
    extract::FromRequest,
    handler::{Handler, HandlerService},
    middleware::{DynService, Middleware},
    path::{Pattern, PatternError},
    response::IntoResponse,
};
use weftline_core::state::StateMap;

/// A single, not-yet-flattened route: method + pattern + composed handler
/// service, as registered via [`route::get`] and friends.
pub struct Route {
    method: Option<Method>,
    pattern: String,
    state: StateMap,
    service: DynService,
}

impl Route {
    /// Registers a state value visible via `State<T>` to this route only.
    /// Additive with any ancestor `Scope::state()` of a different type, and
    /// shadows an ancestor scope's state of the same type -- a route is the
    /// innermost layer in the stack built by [`flatten_into`].
    pub fn state<T: Send + Sync + 'static>(mut self, value: T) -> Self {
        self.state.insert(value);
        self
    }
}

/// Build-time errors raised by [`Scope::build`]/[`crate::server::Builder::build`].
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error(transparent)]
    PatternSyntax(#[from] PatternError),
    #[error("duplicate route for {method} {pattern:?}")]
    RouteConflict { method: String, pattern: String },
}

macro_rules! method_ctor {
    ($name:ident, $method:expr) => {
        pub fn $name<H, Args>(pattern: impl Into<String>, handler: H) -> Route
        where
            H: Handler<Args>,
            Args: 'static,
        {
            Route {
                method: Some($method),
                pattern: pattern.into(),
                state: StateMap::new(),
                service: DynService::new(HandlerService::new(handler)),
            }
        }
    };
}

method_ctor!(get, Method::GET);
method_ctor!(post, Method::POST);
method_ctor!(put, Method::PUT);
method_ctor!(delete, Method::DELETE);
method_ctor!(patch, Method::PATCH);
method_ctor!(head, Method::HEAD);
method_ctor!(options, Method::OPTIONS);

/// A route matching any method at `pattern`. A method-specific route on
/// the identical pattern always takes priority over this one.
pub fn any<H, Args>(pattern: impl Into<String>, handler: H) -> Route
where
    H: Handler<Args>,
    Args: 'static,
{
    Route { method: None, pattern: pattern.into(), state: StateMap::new(), service: DynService::new(HandlerService::new(handler)) }
}

/// A node in the declarative tree: either a leaf [`Route`] or a nested
/// [`Scope`].
pub enum Node {
    Route(Route),
    Scope(Scope),
}

impl From<Route> for Node {
    fn from(r: Route) -> Self {
        Node::Route(r)
    }
}

impl From<Scope> for Node {
    fn from(s: Scope) -> Self {
        Node::Scope(s)
    }
}

/// A builder-only tree node contributing a path prefix, an ordered list of
/// middlewares, and type-indexed state values to every route nested beneath
/// it. Scopes exist only at build time -- [`Scope::flatten`] erases them
/// into a flat vector of fully composed routes.
#[derive(Default)]
pub struct Scope {
    prefix: String,
    middlewares: Vec<Rc<dyn Middleware>>,
    state: StateMap,
    children: Vec<Node>,
}

impl Scope {
    pub fn new(prefix: impl Into<String>) -> Self {
        Scope { prefix: prefix.into(), middlewares: Vec::new(), state: StateMap::new(), children: Vec::new() }
    }

    /// Registers a middleware that wraps every route nested under this
    /// scope. Outer scopes' middlewares run outermost: they see the request
    /// first and the response last.
    pub fn wrap(mut self, middleware: impl Middleware) -> Self {
        self.middlewares.push(Rc::new(middleware));
        self
    }

    /// Registers a state value visible via `State<T>` to every route nested
    /// under this scope (and its children, unless shadowed by an inner
    /// `.state()` of the same type).
    pub fn state<T: Send + Sync + 'static>(mut self, value: T) -> Self {
        self.state.insert(value);
        self
    }

    /// Nests a route or sub-scope under this scope.
    pub fn serve(mut self, node: impl Into<Node>) -> Self {
        self.children.push(node.into());
        self
    }

    /// Flattens this scope (and its descendants) into a vector of
    /// `(method, full_pattern, state_layers, service)` tuples, concatenating
    /// ancestor prefixes and middleware lists left-to-right, and stacking
    /// state layers outermost-first.
    pub(crate) fn flatten(self) -> Result<Vec<FlatRoute>, BuildError> {
        let mut out = Vec::new();
        flatten_into(self, String::new(), &mut Vec::new(), &mut Vec::new(), &mut out)?;
        Ok(out)
    }
}

fn flatten_into(
    scope: Scope,
    parent_prefix: String,
    ancestor_mw: &mut Vec<Rc<dyn Middleware>>,
    ancestor_state: &mut Vec<StateMap>,
    out: &mut Vec<FlatRoute>,
) -> Result<(), BuildError> {
    let prefix = format!("{parent_prefix}{}", scope.prefix);
    let pushed_mw = scope.middlewares.len();
    ancestor_mw.extend(scope.middlewares);
    ancestor_state.push(scope.state);

    for child in scope.children {
        match child {
            Node::Route(route) => {
                let full_pattern = format!("{prefix}{}", route.pattern);
                let pattern = Pattern::parse(&full_pattern)?;

                let mut service = route.service;
                for mw in ancestor_mw.iter().rev() {
                    service = mw.wrap(service);
                }

                let mut layers = weftline_core::state::StateLayers::new();
                for layer in ancestor_state.iter() {
                    layers.push_front(layer.clone());
                }
                layers.push_front(route.state);

                out.push(FlatRoute { method: route.method, pattern, state: layers, service });
            }
            Node::Scope(child_scope) => {
                flatten_into(child_scope, prefix.clone(), ancestor_mw, ancestor_state, out)?;
            }
        }
    }

    ancestor_state.pop();
    ancestor_mw.truncate(ancestor_mw.len() - pushed_mw);
    Ok(())
}

/// A fully flattened route, ready to be indexed by
/// [`crate::router::RouterIndex`]: the concatenated pattern, the stacked
/// state layers, and the middleware-wrapped handler service.
pub struct FlatRoute {
    pub(crate) method: Option<Method>,
    pub(crate) pattern: Pattern,
    pub(crate) state: weftline_core::state::StateLayers,
    pub(crate) service: DynService,
}

impl FlatRoute {
    pub fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    pub fn method(&self) -> Option<&Method> {
        self.method.as_ref()
    }
}

/// Convenience entry point: a route builder module, used as `route::get(..)`.
pub mod route {
    pub use super::{any, delete, get, head, options, patch, post, put};
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::Body;

    async fn ok() -> &'static str {
        "ok"
    }

    #[test]
    fn flattening_concatenates_prefixes() {
        let scope = Scope::new("/api").serve(Scope::new("/v1").serve(get("/users/{id}", ok)));
        let flat = scope.flatten().unwrap();
        assert_eq!(flat.len(), 1);
        assert_eq!(flat[0].pattern().as_str(), "/api/v1/users/{id}");
    }

    #[test]
    fn route_state_is_additive_with_and_shadows_ancestor_scope_state() {
        #[derive(Clone, Debug, PartialEq)]
        struct Pool(u32);
        #[derive(Clone, Debug, PartialEq)]
        struct RequestId(&'static str);

        let scope = Scope::new("")
            .state(Pool(1))
            .serve(get("/x", ok).state(Pool(2)).state(RequestId("r")));
        let flat = scope.flatten().unwrap();

        assert_eq!(flat[0].state.try_get::<Pool>().unwrap(), &Pool(2));
        assert_eq!(flat[0].state.try_get::<RequestId>().unwrap(), &RequestId("r"));
    }

    #[test]
    fn duplicate_pattern_same_method_is_a_conflict_at_lookup_build() {
        // Flattening itself does not forbid duplicates -- that's the
        // router index's job at `RouterIndex::build` -- but pattern
        // parsing errors surface here.
        let scope = Scope::new("").serve(get("/users/{id", ok));
        assert!(matches!(scope.flatten(), Err(BuildError::PatternSyntax(_))));
    }

    #[monoio::test]
    async fn middleware_wraps_in_outer_first_order() {
        use std::cell::RefCell;
        use std::rc::Rc;

        let log: Rc<RefCell<Vec<&'static str>>> = Rc::new(RefCell::new(Vec::new()));
        let l1 = log.clone();
        let l2 = log.clone();

        let mw_outer = crate::middleware::from_fn(move |req, next: DynService| {
            l1.borrow_mut().push("outer-before");
            let l1 = l1.clone();
            async move {
                let resp = next.call(req).await;
                l1.borrow_mut().push("outer-after");
                resp
            }
        });
        let mw_inner = crate::middleware::from_fn(move |req, next: DynService| {
            l2.borrow_mut().push("inner-before");
            let l2 = l2.clone();
            async move {
                let resp = next.call(req).await;
                l2.borrow_mut().push("inner-after");
                resp
            }
        });

        let scope = Scope::new("").wrap(mw_outer).wrap(mw_inner).serve(get("/x", ok));
        let flat = scope.flatten().unwrap();
        let req = http::Request::builder().body(Body::Empty).unwrap();
        let _ = flat[0].service.call(req).await;

        assert_eq!(
            &*log.borrow(),
            &["outer-before", "inner-before", "inner-after", "outer-after"]
        );
    }
}
