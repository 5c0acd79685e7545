//! The request type (component part of C6) and the per-request metadata
//! routes and middleware stash on it: connection info, matched path
//! parameters, and the state layer stack.

use weftline_core::{listener::AcceptedAddr, state::StateLayers};

use crate::body::Body;

/// A request flowing through the router: a standard [`http::Request`] whose
/// body is this crate's [`Body`] enum.
pub type Request = http::Request<Body>;

/// The connected peer and local addresses, captured once at accept time and
/// attached to every request on that connection via [`http::Extensions`].
#[derive(Debug, Clone)]
pub struct ConnInfo {
    pub peer_addr: AcceptedAddr,
    pub local_addr: AcceptedAddr,
}

impl ConnInfo {
    pub fn new(peer_addr: AcceptedAddr, local_addr: AcceptedAddr) -> Self {
        ConnInfo { peer_addr, local_addr }
    }
}

/// The path parameters a matched route captured, keyed by name in the
/// pattern's left-to-right order. Inserted into the request's extensions by
/// the router before the handler chain runs.
#[derive(Debug, Clone, Default)]
pub struct PathParams(pub(crate) Vec<(String, String)>);

impl PathParams {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.iter().find(|(k, _)| k == name).map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Marker inserted into a request's extensions the first time its body is
/// taken, so a second extractor asking for the body gets a clear
/// [`crate::extract::ExtractorFailure::BodyAlreadyConsumed`] instead of
/// silently observing an empty body.
#[derive(Debug, Clone, Copy)]
pub(crate) struct BodyTaken;

/// Take the body out of `req`, leaving [`Body::Empty`] in its place and
/// marking the request so a later extractor can tell the difference between
/// "this request never had a body" and "something upstream already read it".
pub(crate) fn take_body(req: &mut Request) -> Result<Body, crate::extract::ExtractorFailure> {
    if req.extensions().get::<BodyTaken>().is_some() {
        return Err(crate::extract::ExtractorFailure::BodyAlreadyConsumed);
    }
    req.extensions_mut().insert(BodyTaken);
    Ok(std::mem::replace(req.body_mut(), Body::Empty))
}

/// Attach the per-connection [`ConnInfo`] and the route's resolved
/// [`StateLayers`] to a request's extensions. Called once per request by the
/// connection state machine, before the request reaches the router.
pub(crate) fn prime_extensions(req: &mut Request, conn: ConnInfo, state: StateLayers) {
    req.extensions_mut().insert(conn);
    req.extensions_mut().insert(state);
}
