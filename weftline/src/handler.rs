//! The handler adapter (component C8): turning a plain async function
//! `f(p1, .., pN) -> R` into a `Service<Request>` that runs each argument's
//! extractor in declared order, short-circuits on the first extractor
//! failure, and converts `f`'s return value into a [`Response`] via
//! [`IntoResponse`].
//!
//! Implemented the way macro-generated trait impls usually cover a
//! fixed-arity family in this ecosystem (`certain_map!`, `pin_project!`):
//! one `impl_handler!` invocation per supported arity, up to 12 extractors.

use std::{future::Future, marker::PhantomData};

use crate::{
    extract::{ExtractorFailure, FromRequest},
    request::Request,
    response::{IntoResponse, Response},
};

/// A user function callable as a route's handler: `f(p1, .., pN) -> R`
/// where each `Pi: FromRequest` and `R: IntoResponse`.
///
/// Not implemented directly -- implement nothing and just write an async
/// function; `impl_handler!` below provides the impl for every supported
/// arity.
pub trait Handler<Args>: Clone + 'static {
    fn call(&self, req: Request) -> impl Future<Output = Response>;
}

/// Adapts any [`Handler`] into a `service_async::Service<Request>`,
/// type-erasing the `Args` tuple so routes can store a homogeneous
/// collection of handlers regardless of arity.
pub struct HandlerService<H, Args> {
    handler: H,
    _marker: PhantomData<fn(Args)>,
}

impl<H, Args> HandlerService<H, Args> {
    pub fn new(handler: H) -> Self {
        HandlerService { handler, _marker: PhantomData }
    }
}

impl<H, Args> Clone for HandlerService<H, Args>
where
    H: Clone,
{
    fn clone(&self) -> Self {
        HandlerService { handler: self.handler.clone(), _marker: PhantomData }
    }
}

impl<H, Args> service_async::Service<Request> for HandlerService<H, Args>
where
    H: Handler<Args>,
    Args: 'static,
{
    type Response = Response;
    type Error = std::convert::Infallible;

    async fn call(&self, req: Request) -> Result<Self::Response, Self::Error> {
        Ok(self.handler.call(req).await)
    }
}

macro_rules! impl_handler {
    ( $($ty:ident),* ) => {
        #[allow(non_snake_case, unused_mut, unused_variables)]
        impl<Func, Fut, Res, $($ty,)*> Handler<($($ty,)*)> for Func
        where
            Func: Fn($($ty,)*) -> Fut + Clone + 'static,
            Fut: Future<Output = Res>,
            Res: IntoResponse,
            $($ty: FromRequest,)*
        {
            async fn call(&self, mut req: Request) -> Response {
                $(
                    let $ty = match $ty::from_request(&mut req).await {
                        Ok(value) => value,
                        Err(err) => return extractor_failure_response(err),
                    };
                )*
                (self)($($ty,)*).await.into_response()
            }
        }
    };
}

fn extractor_failure_response(err: ExtractorFailure) -> Response {
    err.into_response()
}

impl_handler!();
impl_handler!(T1);
impl_handler!(T1, T2);
impl_handler!(T1, T2, T3);
impl_handler!(T1, T2, T3, T4);
impl_handler!(T1, T2, T3, T4, T5);
impl_handler!(T1, T2, T3, T4, T5, T6);
impl_handler!(T1, T2, T3, T4, T5, T6, T7);
impl_handler!(T1, T2, T3, T4, T5, T6, T7, T8);
impl_handler!(T1, T2, T3, T4, T5, T6, T7, T8, T9);
impl_handler!(T1, T2, T3, T4, T5, T6, T7, T8, T9, T10);
impl_handler!(T1, T2, T3, T4, T5, T6, T7, T8, T9, T10, T11);
impl_handler!(T1, T2, T3, T4, T5, T6, T7, T8, T9, T10, T11, T12);
