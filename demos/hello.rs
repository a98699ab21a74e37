//! Minimal waypost example: global middlewares, a group with a deadline,
//! JSON in and out.
//!
//! Run with:
//!   RUST_LOG=debug cargo run --example hello
//!
//! Try:
//!   curl http://localhost:3000/hello
//!   curl 'http://localhost:3000/api/lang?lang=fr'
//!   curl -X POST http://localhost:3000/api/echo -d '{"name":"alice"}'
//!   curl http://localhost:3000/api/slow          # 500 "time out" after 1s
//!   curl http://localhost:3000/api/panic         # 500 {"err":"..."}

use std::time::Duration;

use http::StatusCode;
use waypost::middleware::{Recovery, Timeout, Trace};
use waypost::{Config, Context, Engine, Error, Group, Response, Server, logging};

#[tokio::main]
async fn main() -> waypost::Result<()> {
    let config = match std::env::var("WAYPOST_CONFIG") {
        Ok(path) => Config::from_file(path)?,
        Err(_) => Config::default(),
    };
    logging::init(&config.logging);

    let server = Server::from_config(&config);
    let app = Engine::with_config(config)
        .middleware(Recovery::new())
        .middleware(Trace)
        .get("/hello", |_ctx: Context| async { "world" })
        .group(
            Group::new("/api")
                .middleware(language)
                .middleware(Timeout::new(Duration::from_secs(1)))
                .get("/lang", lang)
                .post("/echo", echo)
                .get("/slow", slow)
                .get("/panic", explode),
        );

    server.serve(app).await
}

// Stores the requested language for everything further down the chain.
async fn language(ctx: Context) -> Result<(), Error> {
    let lang = ctx.request().query("lang").unwrap_or_else(|| "en".to_owned());
    ctx.set_value("Language", lang);
    ctx.next().await
}

async fn lang(ctx: Context) -> String {
    ctx.value::<String>("Language").unwrap_or_default()
}

async fn echo(ctx: Context) -> Response {
    match ctx.request().json::<serde_json::Value>() {
        Ok(value) => Response::json(&value),
        Err(e) => Response::builder().status(StatusCode::BAD_REQUEST).text(e.to_string()),
    }
}

async fn slow(ctx: Context) {
    tokio::select! {
        () = tokio::time::sleep(Duration::from_secs(3)) => {
            ctx.respond(Response::text("finally")).await;
        }
        reason = ctx.done() => tracing::info!(%reason, "giving up"),
    }
}

async fn explode(_ctx: Context) -> &'static str {
    let items: Vec<u32> = Vec::new();
    if items.is_empty() {
        panic!("nothing to serve");
    }
    "unreachable"
}
