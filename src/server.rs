//! Embedded HTTP server exposing `/metrics` and `/healthz`.

use std::convert::Infallible;
use std::net::SocketAddr;

use hyper::service::{make_service_fn, service_fn};
use hyper::{header, Body, Method, Request, Response, Server, StatusCode};
use prometheus::{Encoder, TextEncoder};
use tracing::{error, info};

use crate::metrics;

/// Route one request.
pub async fn route(req: Request<Body>) -> Result<Response<Body>, Infallible> {
    let resp = match (req.method(), req.uri().path()) {
        (&Method::GET, "/metrics") => {
            // Prometheus (v3+) rejects scrapes without the versioned
            // text content type.
            let mime = TextEncoder::new().format_type().to_string();
            let mut resp = Response::new(Body::from(metrics::gather_metrics()));
            if let Ok(value) = header::HeaderValue::from_str(&mime) {
                resp.headers_mut().insert(header::CONTENT_TYPE, value);
            }
            resp
        }
        (&Method::GET, "/healthz") => Response::new(Body::from("OK")),
        _ => {
            let mut not_found = Response::new(Body::empty());
            *not_found.status_mut() = StatusCode::NOT_FOUND;
            not_found
        }
    };
    Ok(resp)
}

/// Serve until the process exits. Bind failures are logged, not fatal:
/// ingestion keeps running without its metrics endpoint.
pub async fn serve(addr: SocketAddr) {
    let make_svc = make_service_fn(|_conn| async { Ok::<_, Infallible>(service_fn(route)) });

    let server = match Server::try_bind(&addr) {
        Ok(builder) => builder.serve(make_svc),
        Err(e) => {
            error!(%addr, error = %e, "Could not bind metrics & health server");
            return;
        }
    };

    info!(%addr, "Starting metrics & health server");
    if let Err(e) = server.await {
        error!(%addr, error = %e, "Metrics server failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_text(resp: Response<Body>) -> String {
        let bytes = hyper::body::to_bytes(resp.into_body()).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn get(path: &str) -> Request<Body> {
        Request::builder()
            .method(Method::GET)
            .uri(path)
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn healthz_answers_ok() {
        let resp = route(get("/healthz")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_text(resp).await, "OK");
    }

    #[tokio::test]
    async fn metrics_use_prometheus_text_format() {
        metrics::RUNS_STARTED.inc_by(0);
        let resp = route(get("/metrics")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let ct = resp.headers()[header::CONTENT_TYPE].to_str().unwrap().to_string();
        assert!(ct.starts_with("text/plain"));
        assert!(body_text(resp).await.contains("runs_started_total"));
    }

    #[tokio::test]
    async fn other_routes_are_not_found() {
        let resp = route(get("/admin")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
