//! End-to-end scenarios driven through `Server::serve_request`, bypassing a
//! real socket the same way a unit test of a router usually does -- these
//! exercise the full router -> extractor -> handler -> middleware path
//! without needing a live connection.

use weftline::{
    body::Body,
    extract::{Form, Path},
    middleware::from_fn,
    response::IntoResponse,
    route::route,
    server::Server,
};

fn request(method: http::Method, uri: &str) -> http::Request<Body> {
    http::Request::builder().method(method).uri(uri).body(Body::Empty).unwrap()
}

async fn body_text(resp: &mut http::Response<Body>) -> String {
    let bytes = resp.body_mut().collect(None).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[monoio::test]
async fn path_parameter_roundtrip() {
    async fn show_user(Path(user): Path<String>) -> String {
        format!("user: {user}")
    }
    let scope = weftline::Scope::new("").serve(route::get("/api/v1/users/{user}", show_user));
    let server = Server::builder().build(scope).unwrap();

    let mut resp = server.serve_request(request(http::Method::GET, "/api/v1/users/david")).await;

    assert_eq!(resp.status(), http::StatusCode::OK);
    assert_eq!(body_text(&mut resp).await, "user: david");
}

#[monoio::test]
async fn method_not_allowed_lists_allow_header() {
    async fn ok() -> &'static str {
        "ok"
    }
    let scope = weftline::Scope::new("").serve(route::get("/x", ok)).serve(route::post("/x", ok));
    let server = Server::builder().build(scope).unwrap();

    let resp = server.serve_request(request(http::Method::DELETE, "/x")).await;

    assert_eq!(resp.status(), http::StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(resp.headers().get(http::header::ALLOW).unwrap(), "GET, POST");
}

#[monoio::test]
async fn extractor_failure_stops_before_the_handler_runs() {
    use std::{cell::Cell, rc::Rc};

    #[derive(serde::Deserialize)]
    struct Login {
        #[allow(dead_code)]
        name: String,
        #[allow(dead_code)]
        password: String,
    }

    let ran = Rc::new(Cell::new(false));
    let ran_in_handler = ran.clone();

    let login = move |Form(_form): Form<Login>| {
        ran_in_handler.set(true);
        async { "logged in" }
    };

    let scope = weftline::Scope::new("").serve(route::post("/login", login));
    let server = Server::builder().build(scope).unwrap();

    let mut req = request(http::Method::POST, "/login");
    *req.body_mut() = Body::from_bytes("name=alice");
    let resp = server.serve_request(req).await;

    assert_eq!(resp.status(), http::StatusCode::BAD_REQUEST);
    assert!(!ran.get(), "the handler body must not run when the form extractor fails");
}

#[monoio::test]
async fn middleware_short_circuits_before_the_handler_runs() {
    use std::{cell::Cell, rc::Rc};

    async fn secure() -> &'static str {
        "top secret"
    }

    let handler_ran = Rc::new(Cell::new(false));
    let after_seen_status = Rc::new(Cell::new(None));

    let handler_ran_in_auth = handler_ran.clone();
    let auth = from_fn(move |req: http::Request<Body>, next: weftline::DynService| {
        let handler_ran = handler_ran_in_auth.clone();
        async move {
            if req.headers().get(http::header::AUTHORIZATION).is_none() {
                return http::StatusCode::UNAUTHORIZED.into_response();
            }
            handler_ran.set(true);
            next.call(req).await
        }
    });

    let after_seen_status_in_logger = after_seen_status.clone();
    let logger = from_fn(move |req, next: weftline::DynService| {
        let after_seen_status = after_seen_status_in_logger.clone();
        async move {
            let resp = next.call(req).await;
            after_seen_status.set(Some(resp.status()));
            resp
        }
    });

    // `logger` registered first so it wraps outermost: even when `auth`
    // (registered second, so inner) short-circuits, the response still
    // passes back up through `logger`'s after-observation.
    let scope = weftline::Scope::new("").wrap(logger).wrap(auth).serve(route::get("/secure", secure));
    let server = Server::builder().build(scope).unwrap();

    let resp = server.serve_request(request(http::Method::GET, "/secure")).await;

    assert_eq!(resp.status(), http::StatusCode::UNAUTHORIZED);
    assert!(!handler_ran.get(), "the handler must not run when auth rejects the request");
    assert_eq!(after_seen_status.get(), Some(http::StatusCode::UNAUTHORIZED));
}

#[monoio::test]
async fn unknown_path_is_not_found() {
    async fn ok() -> &'static str {
        "ok"
    }
    let scope = weftline::Scope::new("").serve(route::get("/x", ok));
    let server = Server::builder().build(scope).unwrap();

    let resp = server.serve_request(request(http::Method::GET, "/nope")).await;

    assert_eq!(resp.status(), http::StatusCode::NOT_FOUND);
}

#[monoio::test]
async fn state_is_visible_to_nested_routes() {
    use weftline::extract::State;

    #[derive(Clone)]
    struct Greeting(&'static str);

    async fn hello(State(Greeting(word)): State<Greeting>) -> String {
        word.to_string()
    }

    let scope = weftline::Scope::new("/api")
        .state(Greeting("bonjour"))
        .serve(weftline::Scope::new("/v1").serve(route::get("/hello", hello)));
    let server = Server::builder().build(scope).unwrap();

    let mut resp = server.serve_request(request(http::Method::GET, "/api/v1/hello")).await;

    assert_eq!(resp.status(), http::StatusCode::OK);
    assert_eq!(body_text(&mut resp).await, "bonjour");
}
