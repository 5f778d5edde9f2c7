//! End-to-end pipeline integration tests.
//!
//! These tests exercise the full dispatch path: registry → chain →
//! dispatcher → error trap, with marker middleware observing execution
//! order and short-circuit behavior.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use http::StatusCode;

use strata_core::{StrataError, StrataResult};
use strata_pipeline::stages::{BodyDecoder, Cors};
use strata_pipeline::{
    BoxFuture, Context, Dispatcher, ErrorTrap, Middleware, Next, Registry, Request,
};

type MarkerLog = Arc<Mutex<Vec<String>>>;

fn make_request(method: &str, path: &str) -> Request {
    http::Request::builder()
        .method(method)
        .uri(path)
        .body(Bytes::new())
        .unwrap()
}

async fn body_json(response: strata_pipeline::Response) -> serde_json::Value {
    use http_body_util::BodyExt;
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// Appends "<name>:pre" / "<name>:post" around delegation.
struct Marker {
    name: &'static str,
    log: MarkerLog,
}

impl Middleware for Marker {
    fn name(&self) -> &'static str {
        self.name
    }

    fn handle<'a>(
        &'a self,
        ctx: &'a mut Context,
        mut next: Next<'a>,
    ) -> BoxFuture<'a, StrataResult<()>> {
        Box::pin(async move {
            self.log.lock().unwrap().push(format!("{}:pre", self.name));
            next.run(ctx).await?;
            self.log.lock().unwrap().push(format!("{}:post", self.name));
            Ok(())
        })
    }
}

/// Resolves the response without delegating, recording that it ran.
struct Resolver {
    log: MarkerLog,
}

impl Middleware for Resolver {
    fn name(&self) -> &'static str {
        "resolver"
    }

    fn handle<'a>(
        &'a self,
        ctx: &'a mut Context,
        _next: Next<'a>,
    ) -> BoxFuture<'a, StrataResult<()>> {
        Box::pin(async move {
            self.log.lock().unwrap().push("resolver".to_string());
            ctx.response_mut().set_status(StatusCode::OK);
            ctx.response_mut().set_body("resolved");
            Ok(())
        })
    }
}

/// Invokes `next` twice: a programming defect the trap must absorb.
struct Greedy;

impl Middleware for Greedy {
    fn name(&self) -> &'static str {
        "greedy"
    }

    fn handle<'a>(
        &'a self,
        ctx: &'a mut Context,
        mut next: Next<'a>,
    ) -> BoxFuture<'a, StrataResult<()>> {
        Box::pin(async move {
            next.run(ctx).await?;
            next.run(ctx).await?;
            Ok(())
        })
    }
}

/// Mutates the response, then fails.
struct PartialThenFail;

impl Middleware for PartialThenFail {
    fn name(&self) -> &'static str {
        "partial_then_fail"
    }

    fn handle<'a>(
        &'a self,
        ctx: &'a mut Context,
        _next: Next<'a>,
    ) -> BoxFuture<'a, StrataResult<()>> {
        Box::pin(async move {
            ctx.response_mut().set_status(StatusCode::OK);
            ctx.response_mut().set_body("half-written");
            Err(StrataError::internal("gave up after mutating"))
        })
    }
}

/// Races downstream completion against a deadline.
struct Deadline {
    limit: Duration,
}

impl Middleware for Deadline {
    fn name(&self) -> &'static str {
        "deadline"
    }

    fn handle<'a>(
        &'a self,
        ctx: &'a mut Context,
        mut next: Next<'a>,
    ) -> BoxFuture<'a, StrataResult<()>> {
        Box::pin(async move {
            match tokio::time::timeout(self.limit, next.run(ctx)).await {
                Ok(result) => result,
                Err(_) => Err(StrataError::timeout("downstream deadline expired")),
            }
        })
    }
}

/// Suspends before responding, to exercise the deadline path.
struct Slow {
    delay: Duration,
}

impl Middleware for Slow {
    fn name(&self) -> &'static str {
        "slow"
    }

    fn handle<'a>(
        &'a self,
        ctx: &'a mut Context,
        _next: Next<'a>,
    ) -> BoxFuture<'a, StrataResult<()>> {
        Box::pin(async move {
            tokio::time::sleep(self.delay).await;
            ctx.response_mut().set_status(StatusCode::OK);
            Ok(())
        })
    }
}

fn marker(name: &'static str, log: &MarkerLog) -> Marker {
    Marker {
        name,
        log: Arc::clone(log),
    }
}

#[tokio::test]
async fn test_onion_ordering_through_dispatch() {
    let log: MarkerLog = Arc::new(Mutex::new(Vec::new()));

    let mut registry = Registry::new();
    registry.register(marker("outer", &log)).unwrap();
    registry.register(marker("middle", &log)).unwrap();
    registry.register(marker("inner", &log)).unwrap();

    let dispatcher = Dispatcher::new(&registry, ErrorTrap::new());
    dispatcher.handle(make_request("GET", "/")).await;

    assert_eq!(
        *log.lock().unwrap(),
        vec![
            "outer:pre",
            "middle:pre",
            "inner:pre",
            "inner:post",
            "middle:post",
            "outer:post",
        ]
    );
}

#[tokio::test]
async fn test_short_circuit_prevents_downstream_execution() {
    let log: MarkerLog = Arc::new(Mutex::new(Vec::new()));

    let mut registry = Registry::new();
    registry.register(marker("first", &log)).unwrap();
    registry
        .register(Resolver {
            log: Arc::clone(&log),
        })
        .unwrap();
    registry.register(marker("unreached", &log)).unwrap();

    let dispatcher = Dispatcher::new(&registry, ErrorTrap::new());
    let response = dispatcher.handle(make_request("GET", "/")).await;

    assert_eq!(response.status(), StatusCode::OK);
    let entries = log.lock().unwrap();
    assert_eq!(*entries, vec!["first:pre", "resolver", "first:post"]);
    assert!(!entries.iter().any(|e| e.starts_with("unreached")));
}

#[tokio::test]
async fn test_double_next_becomes_500_response() {
    let log: MarkerLog = Arc::new(Mutex::new(Vec::new()));

    let mut registry = Registry::new();
    registry.register(Greedy).unwrap();
    registry.register(marker("inner", &log)).unwrap();

    let dispatcher = Dispatcher::new(&registry, ErrorTrap::new());
    let response = dispatcher.handle(make_request("GET", "/")).await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "DOUBLE_NEXT");

    // The inner stage ran exactly once despite the double invocation.
    let entries = log.lock().unwrap();
    assert_eq!(
        entries.iter().filter(|e| *e == "inner:pre").count(),
        1
    );
}

#[tokio::test]
async fn test_empty_registry_yields_default_not_found() {
    let dispatcher = Dispatcher::new(&Registry::new(), ErrorTrap::new());
    let response = dispatcher.handle(make_request("GET", "/missing")).await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_partial_mutation_replaced_by_trap_mapping() {
    let mut registry = Registry::new();
    registry.register(PartialThenFail).unwrap();

    let dispatcher = Dispatcher::new(&registry, ErrorTrap::new());
    let response = dispatcher.handle(make_request("GET", "/")).await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "INTERNAL_ERROR");
    assert_eq!(body["error"]["message"], "An internal error occurred");
}

#[tokio::test]
async fn test_failure_unwinds_through_callers_only() {
    let log: MarkerLog = Arc::new(Mutex::new(Vec::new()));

    let mut registry = Registry::new();
    registry.register(marker("outer", &log)).unwrap();
    registry.register(PartialThenFail).unwrap();
    registry.register(marker("unreached", &log)).unwrap();

    let dispatcher = Dispatcher::new(&registry, ErrorTrap::new());
    let response = dispatcher.handle(make_request("GET", "/")).await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    // `outer` delegated into the failing stage, so its post work never
    // ran; `unreached` was downstream of the failure and never started.
    let entries = log.lock().unwrap();
    assert_eq!(*entries, vec!["outer:pre"]);
}

#[tokio::test]
async fn test_deadline_middleware_maps_to_gateway_timeout() {
    let mut registry = Registry::new();
    registry
        .register(Deadline {
            limit: Duration::from_millis(10),
        })
        .unwrap();
    registry
        .register(Slow {
            delay: Duration::from_millis(200),
        })
        .unwrap();

    let dispatcher = Dispatcher::new(&registry, ErrorTrap::new());
    let response = dispatcher.handle(make_request("GET", "/")).await;

    assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "TIMEOUT");
}

#[tokio::test]
async fn test_deadline_middleware_passes_fast_downstream() {
    let mut registry = Registry::new();
    registry
        .register(Deadline {
            limit: Duration::from_millis(500),
        })
        .unwrap();
    registry
        .register(Slow {
            delay: Duration::from_millis(1),
        })
        .unwrap();

    let dispatcher = Dispatcher::new(&registry, ErrorTrap::new());
    let response = dispatcher.handle(make_request("GET", "/")).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_preflight_never_reaches_downstream_stages() {
    let log: MarkerLog = Arc::new(Mutex::new(Vec::new()));

    let mut registry = Registry::new();
    registry
        .register(
            Cors::builder()
                .allow_origin("https://app.example.com")
                .build(),
        )
        .unwrap();
    registry.register(marker("router", &log)).unwrap();

    let dispatcher = Dispatcher::new(&registry, ErrorTrap::new());
    let request = http::Request::builder()
        .method("OPTIONS")
        .uri("/api/data")
        .header("origin", "https://app.example.com")
        .header("access-control-request-method", "POST")
        .body(Bytes::new())
        .unwrap();

    let response = dispatcher.handle(request).await;

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(
        response
            .headers()
            .get("access-control-allow-origin")
            .unwrap(),
        "https://app.example.com"
    );
    assert!(log.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_body_decoder_feeds_downstream_stage() {
    let mut registry = Registry::new();
    registry.register(BodyDecoder::new()).unwrap();

    struct EchoDecoded;

    impl Middleware for EchoDecoded {
        fn name(&self) -> &'static str {
            "echo_decoded"
        }

        fn handle<'a>(
            &'a self,
            ctx: &'a mut Context,
            _next: Next<'a>,
        ) -> BoxFuture<'a, StrataResult<()>> {
            Box::pin(async move {
                use strata_pipeline::stages::DecodedBody;
                let name = match ctx.get_extension::<DecodedBody>() {
                    Some(DecodedBody::Json(value)) => {
                        value["name"].as_str().unwrap_or("?").to_string()
                    }
                    _ => "?".to_string(),
                };
                ctx.response_mut().set_status(StatusCode::OK);
                ctx.response_mut().set_body(name);
                Ok(())
            })
        }
    }

    registry.register(EchoDecoded).unwrap();

    let dispatcher = Dispatcher::new(&registry, ErrorTrap::new());
    let request = http::Request::builder()
        .method("POST")
        .uri("/submit")
        .header("content-type", "application/json")
        .body(Bytes::from_static(br#"{"name":"ada"}"#))
        .unwrap();

    let response = dispatcher.handle(request).await;
    assert_eq!(response.status(), StatusCode::OK);

    use http_body_util::BodyExt;
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(bytes.as_ref(), b"ada");
}

#[tokio::test]
async fn test_oversized_body_maps_to_413_envelope() {
    let mut registry = Registry::new();
    registry.register(BodyDecoder::new().limit(4)).unwrap();

    let dispatcher = Dispatcher::new(&registry, ErrorTrap::new());
    let request = http::Request::builder()
        .method("POST")
        .uri("/submit")
        .header("content-type", "application/json")
        .body(Bytes::from_static(b"0123456789"))
        .unwrap();

    let response = dispatcher.handle(request).await;
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "PAYLOAD_TOO_LARGE");
}
