//! The middleware protocol (component C9) and the type-erased service used
//! to store a heterogeneous chain of middlewares plus a terminal handler as
//! one concrete value per route.
//!
//! Unlike a `FactoryLayer` stack -- which composes a fixed, compile-time-
//! known tower of services chosen once in `main` -- a scope tree built with
//! [`crate::route::Scope`] accepts an arbitrary, statically
//! unknown-in-advance list of middlewares per branch. That needs one
//! existential type threading through the whole tree, so routes erase every
//! middleware and handler to [`DynService`], a boxed trait object, the way
//! a fixed stack of layers gets erased when it isn't expressive enough.

use std::{future::Future, pin::Pin, rc::Rc};

use crate::{request::Request, response::Response};

/// A boxed, dynamically dispatched `Request -> Response` step. Every route's
/// fully composed pipeline -- middlewares wrapped around the adapted
/// handler -- is one `DynService`.
#[derive(Clone)]
pub struct DynService(Rc<dyn BoxedCall>);

trait BoxedCall {
    fn call_boxed<'a>(&'a self, req: Request) -> Pin<Box<dyn Future<Output = Response> + 'a>>;
}

impl<S> BoxedCall for S
where
    S: service_async::Service<Request, Response = Response, Error = std::convert::Infallible>,
{
    fn call_boxed<'a>(&'a self, req: Request) -> Pin<Box<dyn Future<Output = Response> + 'a>> {
        Box::pin(async move {
            match service_async::Service::call(self, req).await {
                Ok(resp) => resp,
                Err(never) => match never {},
            }
        })
    }
}

impl DynService {
    pub fn new<S>(service: S) -> Self
    where
        S: service_async::Service<Request, Response = Response, Error = std::convert::Infallible> + 'static,
    {
        DynService(Rc::new(service))
    }

    pub async fn call(&self, req: Request) -> Response {
        self.0.call_boxed(req).await
    }
}

impl service_async::Service<Request> for DynService {
    type Response = Response;
    type Error = std::convert::Infallible;

    async fn call(&self, req: Request) -> Result<Response, Self::Error> {
        Ok(self.0.call_boxed(req).await)
    }
}

/// A middleware factory: given the "next" service in the chain, produces a
/// new service of the same `Request -> Response` shape. Composition of
/// `M1, M2, .., Mk` around handler `H` yields `M1(M2(..Mk(H)))` -- `M1` sees
/// the request first and the response last.
///
/// Implement this trait directly for stateful middlewares (holding config,
/// a metrics handle, ...). For a stateless middleware expressible as a
/// single closure, use [`from_fn`].
pub trait Middleware: 'static {
    fn wrap(&self, next: DynService) -> DynService;
}

impl Middleware for Rc<dyn Middleware> {
    fn wrap(&self, next: DynService) -> DynService {
        (**self).wrap(next)
    }
}

struct Wrapped<F> {
    f: Rc<F>,
    next: DynService,
}

impl<F> Clone for Wrapped<F> {
    fn clone(&self) -> Self {
        Wrapped { f: self.f.clone(), next: self.next.clone() }
    }
}

impl<F, Fut> service_async::Service<Request> for Wrapped<F>
where
    F: Fn(Request, DynService) -> Fut,
    Fut: Future<Output = Response>,
{
    type Response = Response;
    type Error = std::convert::Infallible;

    async fn call(&self, req: Request) -> Result<Response, Self::Error> {
        Ok((self.f)(req, self.next.clone()).await)
    }
}

/// A middleware built from a closure `Fn(Request, DynService) ->
/// impl Future<Output = Response>`, the common case: observe/modify the
/// request, call `next`, observe/modify the response. A `layer_fn`-style
/// convenience constructor.
pub struct FromFn<F>(Rc<F>);

/// Builds a [`FromFn`] middleware from `f`.
pub fn from_fn<F, Fut>(f: F) -> FromFn<F>
where
    F: Fn(Request, DynService) -> Fut + 'static,
    Fut: Future<Output = Response> + 'static,
{
    FromFn(Rc::new(f))
}

impl<F, Fut> Middleware for FromFn<F>
where
    F: Fn(Request, DynService) -> Fut + 'static,
    Fut: Future<Output = Response> + 'static,
{
    fn wrap(&self, next: DynService) -> DynService {
        DynService::new(Wrapped { f: self.0.clone(), next })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::Body;
    use http::StatusCode;

    fn handler_service() -> DynService {
        async fn handler() -> &'static str {
            "ok"
        }
        DynService::new(crate::handler::HandlerService::new(handler))
    }

    #[monoio::test]
    async fn identity_service_runs_handler() {
        let svc = handler_service();
        let req = http::Request::builder().body(Body::Empty).unwrap();
        let resp = svc.call(req).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[monoio::test]
    async fn from_fn_middleware_observes_before_and_after() {
        use std::cell::RefCell;
        let log: Rc<RefCell<Vec<&'static str>>> = Rc::new(RefCell::new(Vec::new()));

        let before_log = log.clone();
        let after_log = log.clone();
        let mw = from_fn(move |req, next: DynService| {
            before_log.borrow_mut().push("before");
            let after_log = after_log.clone();
            async move {
                let resp = next.call(req).await;
                after_log.borrow_mut().push("after");
                resp
            }
        });

        let svc = mw.wrap(handler_service());
        let req = http::Request::builder().body(Body::Empty).unwrap();
        let resp = svc.call(req).await;

        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(&*log.borrow(), &["before", "after"]);
    }

    #[monoio::test]
    async fn short_circuit_skips_next() {
        use crate::response::IntoResponse;
        let mw = from_fn(|_req, _next: DynService| async { StatusCode::UNAUTHORIZED.into_response() });
        let svc = mw.wrap(handler_service());
        let req = http::Request::builder().body(Body::Empty).unwrap();
        let resp = svc.call(req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }
}
