//! Prometheus metrics definitions and HTTP server

use std::net::SocketAddr;

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use prometheus::{
    register_counter, register_counter_vec, register_gauge, register_histogram, Counter,
    CounterVec, Encoder, Gauge, Histogram, TextEncoder, TEXT_FORMAT,
};
use tokio::net::TcpListener;
use tracing::{error, info};

lazy_static::lazy_static! {
    /// Total number of reconciliation passes
    pub static ref RECONCILIATIONS: Counter = register_counter!(
        "auto_import_reconciliations_total",
        "Total number of reconciliation passes"
    ).unwrap();

    /// Failed passes by error kind
    pub static ref RECONCILIATION_ERRORS: CounterVec = register_counter_vec!(
        "auto_import_reconciliation_errors_total",
        "Total number of failed reconciliation passes by error kind",
        &["kind"]
    ).unwrap();

    /// Pass duration histogram
    pub static ref RECONCILE_DURATION: Histogram = register_histogram!(
        "auto_import_reconcile_duration_seconds",
        "Duration of reconciliation passes in seconds",
        vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]
    ).unwrap();

    /// Import attempts by outcome
    pub static ref IMPORT_ATTEMPTS: CounterVec = register_counter_vec!(
        "auto_import_attempts_total",
        "Total number of import attempts by outcome",
        &["outcome"]
    ).unwrap();

    /// Auto-import secrets removed, by why they were removed
    pub static ref CREDENTIALS_DELETED: CounterVec = register_counter_vec!(
        "auto_import_credentials_deleted_total",
        "Total number of auto-import secrets deleted by reason",
        &["reason"]
    ).unwrap();

    /// Operator health (1 = healthy, 0 = unhealthy)
    pub static ref OPERATOR_HEALTH: Gauge = register_gauge!(
        "auto_import_operator_health",
        "Operator health status (1 = healthy, 0 = unhealthy)"
    ).unwrap();
}

/// Start the metrics HTTP server
pub async fn serve(port: u16) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    info!("Metrics server listening on {}", addr);

    OPERATOR_HEALTH.set(1.0);

    loop {
        let (stream, _) = listener.accept().await?;
        let io = TokioIo::new(stream);

        tokio::spawn(async move {
            if let Err(e) = http1::Builder::new()
                .serve_connection(io, service_fn(handle_request))
                .await
            {
                error!("Error serving connection: {}", e);
            }
        });
    }
}

async fn handle_request(
    req: Request<hyper::body::Incoming>,
) -> Result<Response<Full<Bytes>>, hyper::Error> {
    Ok(route(req.uri().path()))
}

fn route(path: &str) -> Response<Full<Bytes>> {
    match path {
        "/metrics" => metrics_response(),
        "/healthz" | "/health" | "/readyz" | "/ready" => {
            text_response(StatusCode::OK, Bytes::from_static(b"ok"))
        }
        _ => text_response(StatusCode::NOT_FOUND, Bytes::from_static(b"Not Found")),
    }
}

fn text_response(status: StatusCode, body: Bytes) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body));
    *response.status_mut() = status;
    response
}

fn metrics_response() -> Response<Full<Bytes>> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        error!("Failed to encode metrics: {}", e);
        return text_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            Bytes::from_static(b"Failed to encode metrics"),
        );
    }

    let mut response = text_response(StatusCode::OK, Bytes::from(buffer));
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(TEXT_FORMAT));
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_endpoints_answer_ok() {
        for path in ["/healthz", "/readyz"] {
            assert_eq!(route(path).status(), StatusCode::OK);
        }
        assert_eq!(route("/nope").status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn metrics_endpoint_exposes_registered_collectors() {
        IMPORT_ATTEMPTS.with_label_values(&["succeeded"]).inc();

        let response = route("/metrics");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[CONTENT_TYPE], TEXT_FORMAT);
    }
}
