//! The server (component C13): binds a route tree to a listening address and
//! drives the accept loop, handing each connection to
//! [`crate::connection::serve_connection`].
//!
//! One OS thread per worker, each with its own monoio runtime and its own
//! freshly built route tree -- simplified to plain `std::thread::Builder`
//! spawns with no hot-reload command channel, since routes are immutable
//! once built.

use std::{
    net::{IpAddr, SocketAddr},
    path::Path,
    rc::Rc,
};

use monoio::{io::stream::Stream, net::ListenerOpts};
use tracing::{error, info};

use weftline_core::{
    config::{RuntimeConfig, RuntimeType, ServerConfig},
    listener::{AcceptedAddr, Listener, ListenerBuilder},
};
#[cfg(feature = "tls")]
use weftline_core::tls::TlsContext;

use crate::{
    common::cancel::{Canceller, Waiter},
    connection::{self, ExceptionHandler},
    error::default_exception_handler,
    request::Request,
    response::Response,
    route::{BuildError, Scope},
    router::{Lookup, RouterIndex},
};

/// Configures a [`Server`] before it is built from a route tree.
pub struct Builder {
    config: ServerConfig,
    exception_handler: ExceptionHandler,
}

impl Default for Builder {
    fn default() -> Self {
        Builder { config: ServerConfig::default(), exception_handler: Rc::new(default_exception_handler) }
    }
}

impl Builder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: ServerConfig) -> Self {
        Builder { config, ..Self::default() }
    }

    /// Caps the request head (request line + headers) this server accepts
    /// before answering `431 Request Header Fields Too Large`.
    pub fn set_request_header_limit(mut self, bytes: usize) -> Self {
        self.config.max_header_bytes = bytes;
        self
    }

    /// Caps the request body this server buffers. `None` leaves it
    /// unbounded (streamed).
    pub fn set_body_limit(mut self, bytes: Option<u64>) -> Self {
        self.config.max_body_bytes = bytes;
        self
    }

    /// Overrides how a panic or [`crate::error::FrameworkError::HandlerFailure`]
    /// is turned into a response. The default logs at `error` and answers a
    /// bare `500`.
    pub fn set_exception_handler<F>(mut self, f: F) -> Self
    where
        F: Fn(anyhow::Error) -> Response + 'static,
    {
        self.exception_handler = Rc::new(f);
        self
    }

    /// Flattens `root` into a [`RouterIndex`] and returns a bindable
    /// [`Server`]. Fails if `root` contains a pattern syntax error or two
    /// routes register the same method and pattern.
    pub fn build(self, root: Scope) -> Result<Server, BuildError> {
        let router = RouterIndex::build(root)?;
        Ok(Server {
            router: Rc::new(router),
            config: Rc::new(self.config),
            exception_handler: self.exception_handler,
            listeners: Vec::new(),
        })
    }
}

/// One socket this server has bound and will accept on once [`Server::run`]
/// is called. A single server can hold any mix of plain, TLS-wrapped and
/// (on unix) Unix-domain listeners at once -- `run` drives all of them
/// concurrently.
enum BoundListener {
    Plain(Listener),
    #[cfg(feature = "tls")]
    Rustls(Listener, Rc<monoio_rustls::TlsAcceptor>),
    #[cfg(feature = "tls")]
    Native(Listener, Rc<monoio_native_tls::TlsAcceptor>),
}

#[cfg(feature = "tls")]
fn tls_bound_listener(listener: Listener, ctx: TlsContext) -> anyhow::Result<BoundListener> {
    match ctx {
        TlsContext::Rustls(cfg) => {
            let acceptor = monoio_rustls::TlsAcceptor::from(std::sync::Arc::new(cfg));
            Ok(BoundListener::Rustls(listener, Rc::new(acceptor)))
        }
        TlsContext::Native(identity) => {
            let builder = native_tls::TlsAcceptor::builder(identity).build()?;
            let acceptor = monoio_native_tls::TlsAcceptor::from(builder);
            Ok(BoundListener::Native(listener, Rc::new(acceptor)))
        }
    }
}

/// An immutable router bound to a configuration, ready to accept connections
/// or answer in-process requests directly. Sockets are registered with
/// [`bind`](Server::bind), [`bind_tls`](Server::bind_tls) and
/// [`bind_local`](Server::bind_local) before a single [`run`](Server::run)
/// call drives every one of them until shutdown.
pub struct Server {
    router: Rc<RouterIndex>,
    config: Rc<ServerConfig>,
    exception_handler: ExceptionHandler,
    listeners: Vec<BoundListener>,
}

impl Server {
    pub fn builder() -> Builder {
        Builder::new()
    }

    /// Dispatches `req` through the router without a socket, the way a
    /// client's request would be after the connection layer decoded it.
    /// Used by tests and by embedders driving the framework from a
    /// non-HTTP transport.
    pub async fn serve_request(&self, mut req: Request) -> Response {
        let method = req.method().clone();
        let path = req.uri().path().to_string();
        match self.router.lookup(&method, &path) {
            Lookup::Matched { route, params } => {
                req.extensions_mut().insert(params);
                crate::request::prime_extensions(&mut req, loopback_conn_info(), route.state.clone());
                route.service.call(req).await
            }
            Lookup::MethodNotAllowed { allow } => connection::method_not_allowed(&allow),
            Lookup::NotFound => {
                use crate::response::IntoResponse;
                http::StatusCode::NOT_FOUND.into_response()
            }
        }
    }

    /// Registers a plain TCP listener on `addr:port`. Must be called before
    /// [`run`](Server::run); has no effect on a server already running.
    pub fn bind(&mut self, addr: impl Into<IpAddr>, port: u16) -> anyhow::Result<()> {
        let listener =
            ListenerBuilder::bind_tcp(SocketAddr::new(addr.into(), port), ListenerOpts::default())?.build()?;
        self.listeners.push(BoundListener::Plain(listener));
        Ok(())
    }

    /// Registers a TLS-wrapped TCP listener on `addr:port`. `ctx` selects
    /// the TLS stack (`rustls` or `native-tls`) the same way
    /// [`weftline_core::tls::TlsContext`] was built.
    #[cfg(feature = "tls")]
    pub fn bind_tls(&mut self, addr: impl Into<IpAddr>, port: u16, ctx: TlsContext) -> anyhow::Result<()> {
        let listener =
            ListenerBuilder::bind_tcp(SocketAddr::new(addr.into(), port), ListenerOpts::default())?.build()?;
        self.listeners.push(tls_bound_listener(listener, ctx)?);
        Ok(())
    }

    /// Registers a Unix-domain socket listener at `path`, optionally
    /// TLS-wrapped if `ctx` is `Some`.
    #[cfg(all(unix, feature = "tls"))]
    pub fn bind_local(&mut self, path: impl AsRef<Path>, ctx: Option<TlsContext>) -> anyhow::Result<()> {
        let listener = ListenerBuilder::bind_unix(path)?.build()?;
        self.listeners.push(match ctx {
            Some(ctx) => tls_bound_listener(listener, ctx)?,
            None => BoundListener::Plain(listener),
        });
        Ok(())
    }

    /// Registers a Unix-domain socket listener at `path`.
    #[cfg(all(unix, not(feature = "tls")))]
    pub fn bind_local(&mut self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let listener = ListenerBuilder::bind_unix(path)?.build()?;
        self.listeners.push(BoundListener::Plain(listener));
        Ok(())
    }

    /// Drives every listener registered via `bind`/`bind_tls`/`bind_local`
    /// concurrently on the current thread's monoio runtime until `shutdown`
    /// fires, using a single OS thread regardless of
    /// `ServerConfig::runtime.workers` -- see [`run_multi_worker`] for the
    /// multi-thread case. Fails immediately if nothing was bound.
    pub async fn run_until(&mut self, shutdown: Waiter) -> anyhow::Result<()> {
        let listeners = std::mem::take(&mut self.listeners);
        if listeners.is_empty() {
            anyhow::bail!("Server::run called with no listener bound -- call bind()/bind_tls()/bind_local() first");
        }
        let server = &*self;
        let loops = listeners.into_iter().map(|bound| server.drive(bound, shutdown.clone()));
        futures::future::join_all(loops).await;
        Ok(())
    }

    /// Drives every registered listener until the process is killed; never
    /// returns under normal operation.
    pub async fn run(&mut self) -> anyhow::Result<()> {
        self.run_until(Canceller::new().waiter()).await
    }

    async fn drive(&self, bound: BoundListener, shutdown: Waiter) {
        match bound {
            BoundListener::Plain(listener) => self.accept_loop(listener, shutdown).await,
            #[cfg(feature = "tls")]
            BoundListener::Rustls(listener, acceptor) => {
                self.accept_loop_rustls(listener, acceptor, shutdown).await
            }
            #[cfg(feature = "tls")]
            BoundListener::Native(listener, acceptor) => {
                self.accept_loop_native(listener, acceptor, shutdown).await
            }
        }
    }

    async fn accept_loop(&self, mut listener: Listener, shutdown: Waiter) {
        loop {
            if shutdown.cancelled() {
                info!("no longer accepting new connections, shutting down");
                return;
            }
            match listener.next().await {
                Some(Ok((stream, peer_addr))) => {
                    let router = self.router.clone();
                    let config = self.config.clone();
                    let exception_handler = self.exception_handler.clone();
                    let shutdown = shutdown.clone();
                    monoio::spawn(async move {
                        connection::serve_connection(
                            stream,
                            peer_addr.clone(),
                            peer_addr,
                            router,
                            config,
                            exception_handler,
                            shutdown,
                        )
                        .await;
                    });
                }
                Some(Err(err)) => {
                    error!("accept failed: {err}");
                }
                None => return,
            }
        }
    }

    #[cfg(feature = "tls")]
    async fn accept_loop_rustls(
        &self,
        mut listener: Listener,
        acceptor: Rc<monoio_rustls::TlsAcceptor>,
        shutdown: Waiter,
    ) {
        loop {
            if shutdown.cancelled() {
                info!("no longer accepting new connections, shutting down");
                return;
            }
            match listener.next().await {
                Some(Ok((stream, peer_addr))) => {
                    let acceptor = acceptor.clone();
                    let router = self.router.clone();
                    let config = self.config.clone();
                    let exception_handler = self.exception_handler.clone();
                    let shutdown = shutdown.clone();
                    monoio::spawn(async move {
                        match acceptor.accept(stream).await {
                            Ok(tls_stream) => {
                                connection::serve_connection(
                                    tls_stream,
                                    peer_addr.clone(),
                                    peer_addr,
                                    router,
                                    config,
                                    exception_handler,
                                    shutdown,
                                )
                                .await;
                            }
                            Err(err) => error!("tls handshake with {:?} failed: {err:?}", peer_addr),
                        }
                    });
                }
                Some(Err(err)) => {
                    error!("accept failed: {err}");
                }
                None => return,
            }
        }
    }

    #[cfg(feature = "tls")]
    async fn accept_loop_native(
        &self,
        mut listener: Listener,
        acceptor: Rc<monoio_native_tls::TlsAcceptor>,
        shutdown: Waiter,
    ) {
        loop {
            if shutdown.cancelled() {
                info!("no longer accepting new connections, shutting down");
                return;
            }
            match listener.next().await {
                Some(Ok((stream, peer_addr))) => {
                    let acceptor = acceptor.clone();
                    let router = self.router.clone();
                    let config = self.config.clone();
                    let exception_handler = self.exception_handler.clone();
                    let shutdown = shutdown.clone();
                    monoio::spawn(async move {
                        match acceptor.accept(stream).await {
                            Ok(tls_stream) => {
                                connection::serve_connection(
                                    tls_stream,
                                    peer_addr.clone(),
                                    peer_addr,
                                    router,
                                    config,
                                    exception_handler,
                                    shutdown,
                                )
                                .await;
                            }
                            Err(err) => error!("tls handshake with {:?} failed: {err:?}", peer_addr),
                        }
                    });
                }
                Some(Err(err)) => {
                    error!("accept failed: {err}");
                }
                None => return,
            }
        }
    }
}

fn loopback_conn_info() -> crate::request::ConnInfo {
    let addr: SocketAddr = ([127, 0, 0, 1], 0).into();
    crate::request::ConnInfo::new(AcceptedAddr::from(addr), AcceptedAddr::from(addr))
}

/// Runs `config.runtime.workers` independent single-threaded servers behind
/// the same address, each built fresh from `make_scope` on its own OS
/// thread and its own monoio runtime. `make_scope` must be cheap to call
/// repeatedly and produce an equivalent route tree each time -- it is
/// invoked once per worker, not once per connection.
///
/// A real multi-worker deployment needs every worker's listener bound with
/// `SO_REUSEPORT` so the kernel load-balances accepted connections across
/// them; this assumes `ListenerOpts` exposes that as a builder toggle the
/// way `monoio`'s other socket options are configured.
pub fn run_multi_worker<F>(make_scope: F, config: ServerConfig, addr: SocketAddr) -> anyhow::Result<()>
where
    F: Fn() -> Scope + Clone + Send + 'static,
{
    let workers = config.runtime.workers.max(1);
    let reuseport = workers > 1;

    let mut handles = Vec::with_capacity(workers.saturating_sub(1));
    for worker_id in 1..workers {
        let make_scope = make_scope.clone();
        let config = config.clone();
        handles.push(
            std::thread::Builder::new()
                .name(format!("weftline-worker-{worker_id}"))
                .spawn(move || run_worker_blocking(make_scope, config, addr, reuseport))
                .expect("failed to spawn weftline worker thread"),
        );
    }

    let result = run_worker_blocking(make_scope, config, addr, reuseport);
    for handle in handles {
        let _ = handle.join();
    }
    result
}

fn run_worker_blocking<F>(make_scope: F, config: ServerConfig, addr: SocketAddr, reuseport: bool) -> anyhow::Result<()>
where
    F: Fn() -> Scope,
{
    let mut runtime = build_runtime(&config.runtime);
    runtime.block_on(async move {
        let opts = listener_opts(reuseport);
        let mut server = Builder::with_config(config).build(make_scope())?;
        let listener = ListenerBuilder::bind_tcp(addr, opts)?.build()?;
        server.listeners.push(BoundListener::Plain(listener));
        server.run_until(Canceller::new().waiter()).await
    })
}

fn listener_opts(reuseport: bool) -> ListenerOpts {
    let opts = ListenerOpts::default();
    if reuseport {
        opts.reuse_port(true)
    } else {
        opts
    }
}

enum Runtime {
    #[cfg(target_os = "linux")]
    IoUring(monoio::Runtime<monoio::time::TimeDriver<monoio::IoUringDriver>>),
    Legacy(monoio::Runtime<monoio::time::TimeDriver<monoio::LegacyDriver>>),
}

impl Runtime {
    fn block_on<F: std::future::Future>(&mut self, future: F) -> F::Output {
        match self {
            #[cfg(target_os = "linux")]
            Runtime::IoUring(rt) => rt.block_on(future),
            Runtime::Legacy(rt) => rt.block_on(future),
        }
    }
}

fn build_runtime(config: &RuntimeConfig) -> Runtime {
    #[cfg(target_os = "linux")]
    {
        if config.runtime_type == RuntimeType::IoUring && monoio::utils::detect_uring() {
            let rt = monoio::RuntimeBuilder::<monoio::IoUringDriver>::new()
                .enable_timer()
                .build()
                .expect("failed to build an io_uring runtime for a weftline worker thread");
            return Runtime::IoUring(rt);
        }
    }
    let _ = config;
    let rt = monoio::RuntimeBuilder::<monoio::LegacyDriver>::new()
        .enable_timer()
        .build()
        .expect("failed to build a legacy-driver runtime for a weftline worker thread");
    Runtime::Legacy(rt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{body::Body, route::route};

    async fn hello() -> &'static str {
        "hi"
    }

    #[monoio::test]
    async fn serve_request_dispatches_matched_route() {
        let scope = Scope::new("").serve(route::get("/hello", hello));
        let server = Builder::new().build(scope).unwrap();
        let req = http::Request::builder().uri("/hello").body(Body::Empty).unwrap();
        let resp = server.serve_request(req).await;
        assert_eq!(resp.status(), http::StatusCode::OK);
    }

    #[monoio::test]
    async fn serve_request_404_for_unknown_path() {
        let scope = Scope::new("").serve(route::get("/hello", hello));
        let server = Builder::new().build(scope).unwrap();
        let req = http::Request::builder().uri("/nope").body(Body::Empty).unwrap();
        let resp = server.serve_request(req).await;
        assert_eq!(resp.status(), http::StatusCode::NOT_FOUND);
    }

    #[monoio::test]
    async fn serve_request_405_with_allow_header() {
        let scope = Scope::new("").serve(route::get("/hello", hello)).serve(route::post("/hello", hello));
        let server = Builder::new().build(scope).unwrap();
        let req = http::Request::builder()
            .method(http::Method::DELETE)
            .uri("/hello")
            .body(Body::Empty)
            .unwrap();
        let resp = server.serve_request(req).await;
        assert_eq!(resp.status(), http::StatusCode::METHOD_NOT_ALLOWED);
        assert!(resp.headers().get(http::header::ALLOW).is_some());
    }

    #[monoio::test]
    async fn run_without_a_bound_listener_errors() {
        let scope = Scope::new("").serve(route::get("/hello", hello));
        let mut server = Builder::new().build(scope).unwrap();
        assert!(server.run().await.is_err());
    }

    #[monoio::test]
    async fn bind_registers_a_listener() {
        let scope = Scope::new("").serve(route::get("/hello", hello));
        let mut server = Builder::new().build(scope).unwrap();
        server.bind([127, 0, 0, 1], 0).unwrap();
        assert_eq!(server.listeners.len(), 1);
    }
}
