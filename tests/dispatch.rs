mod common;

use std::sync::{Arc, Mutex};

use http::StatusCode;
use waypost::{Config, Context, Engine, Error, Group, Response, Route};

use common::{body_string, call, request, request_with_body};

async fn world(_ctx: Context) -> &'static str {
    "world"
}

#[tokio::test]
async fn exact_match_ignores_case_and_slashes() {
    let app = Engine::new().get("/hello", world).build().unwrap();

    assert_eq!(call(&app, "GET", "/HELLO").await, (StatusCode::OK, "world".to_owned()));
    assert_eq!(call(&app, "get", "/hello/").await.0, StatusCode::OK);
    assert_eq!(call(&app, "POST", "/hello").await.0, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn encoded_paths_are_decoded_before_matching() {
    let app = Engine::new()
        .get("/hello world", |_ctx: Context| async { "spaced" })
        .get("/café", |_ctx: Context| async { "accented" })
        .build()
        .unwrap();

    assert_eq!(call(&app, "GET", "/hello%20world").await, (StatusCode::OK, "spaced".to_owned()));
    assert_eq!(call(&app, "GET", "/caf%C3%A9").await, (StatusCode::OK, "accented".to_owned()));
}

#[tokio::test]
async fn unknown_path_is_404() {
    let app = Engine::new().get("/hello", world).build().unwrap();
    let (status, body) = call(&app, "GET", "/missing").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, "404 not found");
}

#[tokio::test]
async fn duplicate_route_fails_build() {
    let result = Engine::new().get("/a/b", world).get("/AB", world).build();
    let Err(err) = result else {
        panic!("duplicate route accepted");
    };
    assert!(err.is_configuration());
    assert!(matches!(err, Error::DuplicateRoute { .. }));
}

#[tokio::test]
async fn same_path_different_method_is_fine() {
    let app = Engine::new()
        .get("/item", world)
        .post("/item", |_ctx: Context| async { (StatusCode::CREATED, "made") })
        .build()
        .unwrap();
    assert_eq!(call(&app, "POST", "/item").await, (StatusCode::CREATED, "made".to_owned()));
}

type Log = Arc<Mutex<Vec<String>>>;

fn recorder(
    log: &Log,
    name: &'static str,
) -> impl Fn(Context) -> waypost::BoxFuture<waypost::Result<()>> + Send + Sync + 'static {
    let log = Arc::clone(log);
    move |ctx: Context| {
        let log = Arc::clone(&log);
        Box::pin(async move {
            log.lock().unwrap().push(format!("{name} in"));
            let result = ctx.next().await;
            log.lock().unwrap().push(format!("{name} out"));
            result
        })
    }
}

#[tokio::test]
async fn middlewares_wrap_like_an_onion() {
    let log: Log = Arc::default();
    let handler_log = Arc::clone(&log);

    let app = Engine::new()
        .middleware(recorder(&log, "global"))
        .group(
            Group::new("/api")
                .middleware(recorder(&log, "group"))
                .route(Route::get("/users", move |_ctx: Context| {
                    let log = Arc::clone(&handler_log);
                    async move {
                        log.lock().unwrap().push("handler".to_owned());
                        "users"
                    }
                })
                .middleware(recorder(&log, "route"))),
        )
        .build()
        .unwrap();

    assert_eq!(call(&app, "GET", "/api/users").await, (StatusCode::OK, "users".to_owned()));
    assert_eq!(
        *log.lock().unwrap(),
        [
            "global in", "group in", "route in", "handler", "route out", "group out",
            "global out",
        ]
    );
}

#[tokio::test]
async fn group_middleware_only_applies_to_its_routes() {
    let log: Log = Arc::default();
    let app = Engine::new()
        .get("/plain", world)
        .group(Group::new("/admin").middleware(recorder(&log, "admin")).get("/panel", world))
        .build()
        .unwrap();

    call(&app, "GET", "/plain").await;
    assert!(log.lock().unwrap().is_empty());

    call(&app, "GET", "/admin/panel").await;
    assert_eq!(*log.lock().unwrap(), ["admin in", "admin out"]);
}

#[tokio::test]
async fn short_circuit_skips_the_handler() {
    let reached = Arc::new(Mutex::new(false));
    let flag = Arc::clone(&reached);

    let app = Engine::new()
        .middleware(|ctx: Context| async move {
            if ctx.request().header("authorization").is_none() {
                ctx.respond(Response::builder().status(StatusCode::UNAUTHORIZED).text("no")).await;
                return Ok(());
            }
            ctx.next().await
        })
        .get("/secret", move |_ctx: Context| {
            let flag = Arc::clone(&flag);
            async move {
                *flag.lock().unwrap() = true;
                "secret"
            }
        })
        .build()
        .unwrap();

    assert_eq!(call(&app, "GET", "/secret").await, (StatusCode::UNAUTHORIZED, "no".to_owned()));
    assert!(!*reached.lock().unwrap());
}

#[tokio::test]
async fn chain_error_without_response_is_500_text() {
    let app = Engine::new()
        .middleware(|_ctx: Context| async { Err::<(), _>(Error::msg("db unavailable")) })
        .get("/x", world)
        .build()
        .unwrap();

    assert_eq!(
        call(&app, "GET", "/x").await,
        (StatusCode::INTERNAL_SERVER_ERROR, "db unavailable".to_owned())
    );
}

#[tokio::test]
async fn chain_error_after_response_keeps_the_response() {
    let app = Engine::new()
        .middleware(|ctx: Context| async move {
            ctx.next().await?;
            Err::<(), _>(Error::msg("audit failed"))
        })
        .get("/x", world)
        .build()
        .unwrap();

    assert_eq!(call(&app, "GET", "/x").await, (StatusCode::OK, "world".to_owned()));
}

#[tokio::test]
async fn handler_writing_through_context() {
    let app = Engine::new()
        .get("/direct", |ctx: Context| async move {
            let mut w = ctx.writer().await;
            w.status(StatusCode::ACCEPTED).header("x-direct", "1").text("queued");
            w.text("ignored");
        })
        .build()
        .unwrap();

    let response = app.dispatch(request("GET", "/direct")).await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert_eq!(response.headers()["x-direct"], "1");
    assert_eq!(body_string(response).await, "queued");
}

#[tokio::test]
async fn scratch_values_flow_from_middleware_to_handler() {
    let app = Engine::new()
        .middleware(|ctx: Context| async move {
            let lang = ctx.request().query("lang").unwrap_or_else(|| "en".to_owned());
            ctx.set_value("Language", lang);
            ctx.next().await
        })
        .get("/lang", |ctx: Context| async move { ctx.value::<String>("Language").unwrap_or_default() })
        .build()
        .unwrap();

    assert_eq!(call(&app, "GET", "/lang?lang=fr").await.1, "fr");
    assert_eq!(call(&app, "GET", "/lang").await.1, "en");
}

#[tokio::test]
async fn json_body_round_trip() {
    let app = Engine::new()
        .post("/echo", |ctx: Context| async move {
            match ctx.request().json::<serde_json::Value>() {
                Ok(value) => Response::json(&value),
                Err(_) => Response::status(StatusCode::BAD_REQUEST),
            }
        })
        .build()
        .unwrap();

    let response = app.dispatch(request_with_body("POST", "/echo", r#"{"n":1}"#)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "application/json");
    assert_eq!(body_string(response).await, r#"{"n":1}"#);

    let response = app.dispatch(request_with_body("POST", "/echo", "not json")).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn cross_origin_headers_on_every_response() {
    let app = Engine::with_config(Config::default().with_cross_origin(true))
        .get("/hello", world)
        .build()
        .unwrap();

    for uri in ["/hello", "/missing"] {
        let response = app.dispatch(request("GET", uri)).await;
        assert_eq!(response.headers()["access-control-allow-origin"], "*");
        assert_eq!(
            response.headers()["access-control-allow-methods"],
            "POST, GET, OPTIONS, PUT, DELETE"
        );
    }

    let preflight = app.dispatch(request("OPTIONS", "/hello")).await;
    assert_eq!(preflight.status(), StatusCode::OK);
    assert_eq!(preflight.headers()["access-control-allow-headers"], "*");
}

#[tokio::test]
async fn no_cors_headers_by_default() {
    let app = Engine::new().get("/hello", world).build().unwrap();
    let response = app.dispatch(request("GET", "/hello")).await;
    assert!(response.headers().get("access-control-allow-origin").is_none());
}

#[tokio::test]
async fn favicon_and_unrouted_options_are_empty_200() {
    let log: Log = Arc::default();
    let app = Engine::new().middleware(recorder(&log, "global")).get("/hello", world).build().unwrap();

    assert_eq!(call(&app, "GET", "/favicon.ico").await, (StatusCode::OK, String::new()));
    assert_eq!(call(&app, "OPTIONS", "/anything").await, (StatusCode::OK, String::new()));
    assert!(log.lock().unwrap().is_empty());
}

#[tokio::test]
async fn mount_takes_the_whole_prefix() {
    let log: Log = Arc::default();
    let app = Engine::new()
        .middleware(recorder(&log, "global"))
        .mount("/static/", |ctx: Context| async move { format!("file {}", ctx.request().path()) })
        .get("/hello", world)
        .build()
        .unwrap();

    assert_eq!(
        call(&app, "GET", "/static/app.js").await,
        (StatusCode::OK, "file /static/app.js".to_owned())
    );
    assert!(log.lock().unwrap().is_empty());
    assert_eq!(call(&app, "GET", "/hello").await.1, "world");
}

#[tokio::test]
async fn services_resolve_from_handlers() {
    struct Greeting(&'static str);

    let app = Engine::new()
        .service("greeting", Greeting("hi"))
        .factory("counter", || 7_u32)
        .get("/svc", |ctx: Context| async move {
            let greeting = ctx.service::<Greeting>("greeting").map(|g| g.0).unwrap_or("none");
            let n = ctx.instance::<u32>("counter").unwrap_or_default();
            format!("{greeting} {n}")
        })
        .build()
        .unwrap();

    assert_eq!(call(&app, "GET", "/svc").await.1, "hi 7");
}
