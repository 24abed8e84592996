// ===============================
// src/server.rs (health + metrics HTTP)
// ===============================
//
//   GET /health           -> 200 {"status":"healthy"} | 503 {"detail":"WebSocket connection is down"}
//   GET /metrics          -> Prometheus text
//   GET /metrics/trading  -> {"total_signals","total_positions","closed_positions","total_pnl"}
//   GET /metrics/system   -> cpu/memory/disk usage gauges (Prometheus text)
//
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Method, Request, Response, Server, StatusCode};
use serde_json::json;
use tracing::{error, info};

use crate::feed::Health;
use crate::metrics::{encode_metrics, encode_system_metrics};
use crate::store::Store;

pub struct AppState {
    pub health: Health,
    pub store: Arc<dyn Store>,
}

fn text_response(body: Vec<u8>) -> Response<Body> {
    let mut rsp = Response::new(Body::from(body));
    rsp.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/plain; version=0.0.4; charset=utf-8"),
    );
    rsp
}

fn json_response(status: StatusCode, body: serde_json::Value) -> Response<Body> {
    let mut rsp = Response::new(Body::from(body.to_string()));
    *rsp.status_mut() = status;
    rsp.headers_mut().insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    rsp
}

pub async fn route(req: Request<Body>, state: Arc<AppState>) -> Result<Response<Body>, Infallible> {
    if req.method() != Method::GET {
        return Ok(json_response(StatusCode::METHOD_NOT_ALLOWED, json!({"detail": "method not allowed"})));
    }

    let rsp = match req.uri().path() {
        "/health" => {
            if state.health.is_healthy() {
                json_response(StatusCode::OK, json!({"status": "healthy"}))
            } else {
                json_response(StatusCode::SERVICE_UNAVAILABLE, json!({"detail": "WebSocket connection is down"}))
            }
        }
        "/metrics" => text_response(encode_metrics()),
        "/metrics/system" => text_response(encode_system_metrics()),
        "/metrics/trading" => match state.store.summary().await {
            Ok(s) => json_response(StatusCode::OK, json!(s)),
            Err(e) => {
                error!(?e, "trading summary failed");
                json_response(StatusCode::INTERNAL_SERVER_ERROR, json!({"detail": e.to_string()}))
            }
        },
        _ => json_response(StatusCode::NOT_FOUND, json!({"detail": "not found"})),
    };
    Ok(rsp)
}

pub async fn serve(port: u16, state: Arc<AppState>) -> Result<(), hyper::Error> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let make_svc = make_service_fn(move |_conn| {
        let state = state.clone();
        async move { Ok::<_, Infallible>(service_fn(move |req| route(req, state.clone()))) }
    });
    let server = Server::try_bind(&addr)?.serve(make_svc);
    info!(%addr, "http listening (/health, /metrics, /metrics/trading, /metrics/system)");
    server.await
}
