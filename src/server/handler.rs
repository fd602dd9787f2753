// src/server/handler.rs
use crate::health::{HealthCheckResponse, HealthChecker};
use hyper::header::{HeaderValue, ALLOW, CONTENT_TYPE};
use hyper::{Body, Method, Request, Response, StatusCode};
use std::convert::Infallible;
use std::sync::Arc;
use tower::Service;
use tracing::{debug, error};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Error serializing check results: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid response status code {0}")]
    InvalidStatusCode(u16),

    #[error("No route for {0}")]
    NotFound(String),

    #[error("Method {0} not allowed")]
    MethodNotAllowed(Method),
}

impl TransportError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            TransportError::Serialization(_) | TransportError::InvalidStatusCode(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            TransportError::NotFound(_) => StatusCode::NOT_FOUND,
            TransportError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
        }
    }
}

impl From<TransportError> for Response<Body> {
    fn from(err: TransportError) -> Self {
        let mut response = Response::new(Body::from(err.to_string()));
        *response.status_mut() = err.status_code();
        if let TransportError::MethodNotAllowed(_) = err {
            response
                .headers_mut()
                .insert(ALLOW, HeaderValue::from_static("GET, HEAD"));
        }
        response
    }
}

/// Serialize a poll result as JSON, with the verdict's code as the
/// response status.
pub fn render(response: &HealthCheckResponse) -> Result<Response<Body>, TransportError> {
    let status = StatusCode::from_u16(response.status_code)
        .map_err(|_| TransportError::InvalidStatusCode(response.status_code))?;
    let body = serde_json::to_vec(response)?;

    let mut rendered = Response::new(Body::from(body));
    *rendered.status_mut() = status;
    rendered
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    Ok(rendered)
}

/// Serves the aggregate verdict of a [`HealthChecker`] on one path.
#[derive(Clone)]
pub struct HealthHandler {
    checker: Arc<HealthChecker>,
    path: Arc<str>,
}

impl HealthHandler {
    pub fn new(checker: Arc<HealthChecker>, path: impl Into<String>) -> Self {
        Self {
            checker,
            path: Arc::from(path.into()),
        }
    }

    pub async fn handle(&self, req: Request<Body>) -> Result<Response<Body>, TransportError> {
        if req.uri().path() != &*self.path {
            return Err(TransportError::NotFound(req.uri().path().to_string()));
        }

        let method = req.method();
        if method != Method::GET && method != Method::HEAD {
            return Err(TransportError::MethodNotAllowed(method.clone()));
        }

        let response = self.checker.perform_checks().await;
        let mut rendered = render(&response)?;
        if method == Method::HEAD {
            *rendered.body_mut() = Body::empty();
        }
        Ok(rendered)
    }
}

impl Service<Request<Body>> for HealthHandler {
    type Response = Response<Body>;
    type Error = Infallible;
    type Future = futures::future::BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(
        &mut self,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let handler = self.clone();
        Box::pin(async move {
            let request_id = Uuid::new_v4();
            let method = req.method().clone();
            let path = req.uri().path().to_string();

            match handler.handle(req).await {
                Ok(response) => {
                    debug!(
                        %request_id,
                        %method,
                        %path,
                        status = response.status().as_u16(),
                        "served health check"
                    );
                    Ok(response)
                }
                Err(e) => {
                    if e.status_code().is_server_error() {
                        error!(%request_id, %e, "health transport error");
                    } else {
                        debug!(%request_id, %method, %path, %e, "rejected request");
                    }
                    Ok(e.into())
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_errors_map_to_responses() {
        let err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let response: Response<Body> = TransportError::from(err).into();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let response: Response<Body> = TransportError::MethodNotAllowed(Method::POST).into();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.headers()[ALLOW], "GET, HEAD");

        let response: Response<Body> = TransportError::InvalidStatusCode(42).into();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_render_rejects_invalid_code() {
        let response = HealthCheckResponse {
            status: crate::health::HealthStatus::Pass,
            status_code: 42,
            components: Vec::new(),
        };
        assert!(matches!(
            render(&response),
            Err(TransportError::InvalidStatusCode(42))
        ));
    }
}
