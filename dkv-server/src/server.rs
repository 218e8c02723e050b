//! # HTTP Server
//!
//! Resolve each request path to an operation, run it against the store, and
//! account its latency.
//!
//! ## Routing
//!
//! | Path (case-insensitive)        | Operation    |
//! |--------------------------------|--------------|
//! | `/query?key=K`                 | point lookup |
//! | `/sample?count=N`              | key sample   |
//! | `/`, `/stat`, `/statistics`    | report       |
//! | anything else                  | empty 200    |
//!
//! Malformed input never produces an error status: a missing key yields an
//! empty body, a bad count falls back to the default, and a bad query string
//! is read as no parameters. A repeated parameter resolves to its first
//! occurrence.

use std::borrow::Cow;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Query, State};
use axum::http::{header, Uri};
use axum::response::IntoResponse;
use axum::Router;
use bytes::{Bytes, BytesMut};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::info;

use dkv_common::DkvResult;
use dkv_engine::{seed_magic, KVEngine, PopulationConfig, PopulationWorker};

use crate::context::ServerContext;
use crate::metrics::Operation;
use crate::scheduler::Scheduler;

/// Sample size used when `count` is absent or malformed.
pub const DEFAULT_SAMPLE_COUNT: i64 = 1;

/// Query pairs in request order.
type Params = Vec<(String, String)>;

/// Builds the router; every path goes through `dispatch`.
pub fn router(ctx: Arc<ServerContext>) -> Router {
    Router::new().fallback(dispatch).with_state(ctx)
}

async fn dispatch(
    State(ctx): State<Arc<ServerContext>>,
    uri: Uri,
    params: Option<Query<Params>>,
) -> impl IntoResponse {
    let params = params.map(|Query(params)| params).unwrap_or_default();
    let body = handle(&ctx, uri.path(), &params);
    ([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], body)
}

/// Runs one request and records its rate and latency.
///
/// Timing covers everything from path resolution to the finished body.
pub fn handle(ctx: &ServerContext, path: &str, params: &Params) -> Bytes {
    let start = Instant::now();
    let op = resolve(path);

    let mut body = BytesMut::new();
    match op {
        Operation::Query => handle_query(ctx, params, &mut body),
        Operation::Sample => handle_sample(ctx, params, &mut body),
        Operation::Statistics => handle_statistics(ctx, &mut body),
        Operation::Other => {}
    }

    ctx.metrics.record(op, start.elapsed());
    body.freeze()
}

/// Percent-decodes and lower-cases the path, then strips the leading slash.
///
/// A path that does not decode to UTF-8 is matched as sent.
fn resolve(path: &str) -> Operation {
    let decoded = urlencoding::decode(path).unwrap_or(Cow::Borrowed(path));
    let path = decoded.strip_prefix('/').unwrap_or(&*decoded).to_lowercase();
    Operation::from_path(&path)
}

/// First value of `name`, if present.
fn param<'a>(params: &'a Params, name: &str) -> Option<&'a str> {
    params
        .iter()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.as_str())
}

fn handle_query(ctx: &ServerContext, params: &Params, body: &mut BytesMut) {
    let key = match param(params, "key") {
        Some(key) if !key.is_empty() => key,
        _ => return,
    };

    match ctx.engine.get(key) {
        Ok(Some(value)) => {
            body.extend_from_slice(&value);
            body.extend_from_slice(b"\n");
        }
        // A backend failure reads as a miss; the page has no error channel.
        Ok(None) | Err(_) => {
            body.extend_from_slice(key.as_bytes());
            body.extend_from_slice(b" is not found\n");
        }
    }
}

fn handle_sample(ctx: &ServerContext, params: &Params, body: &mut BytesMut) {
    let count = parse_count(param(params, "count"));
    ctx.engine.for_each_key(count, &mut |key| {
        body.extend_from_slice(key.as_bytes());
        body.extend_from_slice(b"\n");
        true
    });
}

/// Parses the sample size; absent or malformed input yields the default.
///
/// Zero and negative values are passed through and mean "every key".
pub fn parse_count(raw: Option<&str>) -> i64 {
    match raw.map(str::trim) {
        None | Some("") => DEFAULT_SAMPLE_COUNT,
        Some(raw) => raw.parse().unwrap_or(DEFAULT_SAMPLE_COUNT),
    }
}

fn handle_statistics(ctx: &ServerContext, body: &mut BytesMut) {
    let mut report = String::new();
    report.push_str(&ctx.metrics.statistics.render());
    report.push('\n');
    report.push_str(&ctx.metrics.render());

    let population = &ctx.population;
    report.push_str(&format!(
        "entries = {} ({} MiB in {} shards), populated {}/{}{}\n",
        ctx.engine.len(),
        dkv_common::bytes_to_mib(ctx.engine.used_bytes() as u64),
        ctx.engine.shard_count(),
        population.inserted(),
        population.target(),
        if population.is_done() { "" } else { " (in progress)" },
    ));
    report.push_str(&format!("Alloc = {} MiB\n", ctx.memory.resident_mib()));

    body.extend_from_slice(report.as_bytes());
}

/// Background tasks and the bound address of a started server.
pub struct Running {
    pub local_addr: SocketAddr,
    pub population: PopulationWorker,
    pub scheduler: Scheduler,
    /// Resolves only if the HTTP server fails.
    pub server: JoinHandle<std::io::Result<()>>,
}

/// Seeds the sentinel entry, then starts population, the scheduler, and the
/// HTTP server on `listener`.
///
/// Must be called from inside a tokio runtime. Nothing started here is ever
/// stopped; process exit is the only shutdown path.
pub fn launch(ctx: Arc<ServerContext>, listener: TcpListener) -> DkvResult<Running> {
    let local_addr = listener.local_addr()?;

    seed_magic(ctx.engine.as_ref())?;

    let on_iteration = {
        let ctx = Arc::clone(&ctx);
        move || ctx.metrics.tight_loop.add(1)
    };
    let population = PopulationWorker::spawn(
        Arc::clone(&ctx.engine),
        PopulationConfig {
            count: ctx.config.big_map_size,
            tight_loop: ctx.config.tight_loop,
        },
        Arc::clone(&ctx.population),
        on_iteration,
    )?;

    let scheduler = Scheduler::spawn(Arc::clone(&ctx));

    let app = router(ctx);
    let server = tokio::spawn(async move { axum::serve(listener, app).await });
    info!(%local_addr, "listening");

    Ok(Running {
        local_addr,
        population,
        scheduler,
        server,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;

    fn context() -> Arc<ServerContext> {
        let ctx = ServerContext::new(ServerConfig {
            big_map_size: 0,
            shards: 4,
            ..ServerConfig::default()
        });
        seed_magic(ctx.engine.as_ref()).unwrap();
        ctx
    }

    fn params(pairs: &[(&str, &str)]) -> Params {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn rate_after_rotation(ctx: &ServerContext, op: Operation) -> Vec<u64> {
        ctx.metrics.rotate_all();
        ctx.metrics.operation(op).rate.window_values(1, false)
    }

    #[test]
    fn query_returns_value_or_not_found() {
        let ctx = context();
        let found = handle(&ctx, "/query", &params(&[("key", "magic")]));
        assert_eq!(&found[..], b"key\n");

        let missing = handle(&ctx, "/query", &params(&[("key", "absent")]));
        assert_eq!(&missing[..], b"absent is not found\n");
    }

    #[test]
    fn empty_key_yields_empty_body() {
        let ctx = context();
        assert!(handle(&ctx, "/query", &params(&[])).is_empty());
        assert!(handle(&ctx, "/query", &params(&[("key", "")])).is_empty());
        assert_eq!(rate_after_rotation(&ctx, Operation::Query), vec![2]);
    }

    #[test]
    fn long_keys_are_ordinary() {
        let ctx = context();
        let key = "k".repeat(1024);
        let body = handle(&ctx, "/query", &params(&[("key", &key)]));
        assert!(body.ends_with(b" is not found\n"));

        ctx.engine
            .put(key.clone(), Bytes::from_static(b"long"))
            .unwrap();
        let body = handle(&ctx, "/query", &params(&[("key", &key)]));
        assert_eq!(&body[..], b"long\n");
    }

    #[test]
    fn first_repeated_parameter_wins() {
        let ctx = context();
        let body = handle(&ctx, "/query", &params(&[("key", "magic"), ("key", "other")]));
        assert_eq!(&body[..], b"key\n");

        for i in 0..10 {
            ctx.engine
                .put(format!("k{i}"), Bytes::from_static(b"v"))
                .unwrap();
        }
        let body = handle(&ctx, "/sample", &params(&[("count", "2"), ("count", "7")]));
        assert_eq!(body.split(|b| *b == b'\n').filter(|l| !l.is_empty()).count(), 2);
    }

    #[test]
    fn escaped_paths_are_decoded() {
        let ctx = context();
        let body = handle(&ctx, "/%71uery", &params(&[("key", "magic")]));
        assert_eq!(&body[..], b"key\n");
        assert_eq!(resolve("/%53TAT"), Operation::Statistics);
        assert_eq!(resolve("/%ff"), Operation::Other);
        assert_eq!(rate_after_rotation(&ctx, Operation::Query), vec![1]);
    }

    #[test]
    fn paths_are_case_insensitive() {
        let ctx = context();
        let body = handle(&ctx, "/QUERY", &params(&[("key", "magic")]));
        assert_eq!(&body[..], b"key\n");
    }

    #[test]
    fn sample_honors_count() {
        let ctx = context();
        for i in 0..10 {
            ctx.engine
                .put(format!("k{i}"), Bytes::from_static(b"v"))
                .unwrap();
        }

        let one = handle(&ctx, "/sample", &params(&[]));
        assert_eq!(one.split(|b| *b == b'\n').filter(|l| !l.is_empty()).count(), 1);

        let five = handle(&ctx, "/sample", &params(&[("count", "5")]));
        assert_eq!(five.split(|b| *b == b'\n').filter(|l| !l.is_empty()).count(), 5);

        let all = handle(&ctx, "/sample", &params(&[("count", "0")]));
        assert_eq!(all.split(|b| *b == b'\n').filter(|l| !l.is_empty()).count(), 11);
    }

    #[test]
    fn count_parsing_is_permissive() {
        assert_eq!(parse_count(None), 1);
        assert_eq!(parse_count(Some("")), 1);
        assert_eq!(parse_count(Some("7")), 7);
        assert_eq!(parse_count(Some(" 3 ")), 3);
        assert_eq!(parse_count(Some("-2")), -2);
        assert_eq!(parse_count(Some("many")), 1);
    }

    #[test]
    fn statistics_report_mentions_memory() {
        let ctx = context();
        for path in ["/", "/stat", "/statistics", "/STAT"] {
            let body = handle(&ctx, path, &params(&[]));
            let text = String::from_utf8(body.to_vec()).unwrap();
            assert!(text.contains("MiB"), "{path}: {text}");
            assert!(text.contains("tick_1s"));
            assert!(text.contains("No requests in the last 60 seconds"));
        }
        assert_eq!(rate_after_rotation(&ctx, Operation::Statistics), vec![4]);
    }

    #[test]
    fn unknown_paths_are_empty_but_counted() {
        let ctx = context();
        assert!(handle(&ctx, "/favicon.ico", &params(&[])).is_empty());
        assert_eq!(rate_after_rotation(&ctx, Operation::Other), vec![1]);
    }
}
