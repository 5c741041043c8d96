use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header, Request, StatusCode},
    middleware::Next,
    response::Response,
};

use crate::app::Application;

pub async fn admin_auth_middleware(
    State(app): State<Arc<Application>>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok());

    let expected = &app.config().admin.api_key;
    match auth_header.and_then(|v| v.strip_prefix("Bearer ")) {
        Some(token) if !expected.is_empty() && token == expected => Ok(next.run(request).await),
        _ => {
            tracing::warn!(path = %request.uri().path(), "Rejected admin request");
            Err(StatusCode::UNAUTHORIZED)
        }
    }
}
