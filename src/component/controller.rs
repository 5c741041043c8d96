//! Controllers: components that expose HTTP routes.
//!
//! # Design Decisions
//! - A route carries an axum `MethodRouter`; the controller captures its
//!   own `Arc` in handlers or passes it with `with_state`
//! - `path` is relative to the unit mount point and is appended verbatim
//! - Every route is wrapped so `on_request` runs before its handler, inside
//!   the controller's span

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::Request;
use axum::handler::Handler;
use axum::http::request::Parts;
use axum::http::Method;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{self, MethodRouter};
use tracing::Instrument;

use crate::component::{Component, ComponentContext};
use crate::error::BootstrapError;
use crate::http::HttpError;

/// A component that exposes HTTP endpoints.
#[async_trait]
pub trait Controller: Component + Sized {
    /// Construct the instance. Must not block.
    fn build(ctx: &mut ComponentContext<'_>) -> Result<Self, BootstrapError>;

    /// Endpoints of this controller, collected once at registration.
    fn routes(self: Arc<Self>) -> Vec<Route>;

    /// Runs when a request reaches one of this controller's routes, before
    /// the handler. An error is answered in place of the handler.
    async fn on_request(&self, _parts: &Parts) -> Result<(), HttpError> {
        Ok(())
    }
}

/// Routes of `controller`, each guarded by its `on_request` hook.
pub(crate) fn guarded_routes<T: Controller>(
    controller: Arc<T>,
    span: tracing::Span,
) -> Vec<Route> {
    controller
        .clone()
        .routes()
        .into_iter()
        .map(|route| {
            let controller = controller.clone();
            let span = span.clone();
            let guard = middleware::from_fn(move |request: Request, next: Next| {
                before_request(controller.clone(), request, next).instrument(span.clone())
            });
            Route {
                handler: route.handler.layer(guard),
                ..route
            }
        })
        .collect()
}

async fn before_request<T: Controller>(controller: Arc<T>, request: Request, next: Next) -> Response {
    let (parts, body) = request.into_parts();
    if let Err(e) = controller.on_request(&parts).await {
        tracing::debug!(
            method = %parts.method,
            uri = %parts.uri,
            status = %e.status,
            "Request refused by controller"
        );
        return e.into_response();
    }
    next.run(Request::from_parts(parts, body)).await
}

/// One endpoint exposed by a controller.
#[derive(Clone)]
pub struct Route {
    pub path: String,
    pub method: Method,
    pub name: String,
    pub handler: MethodRouter,
}

impl Route {
    /// Route with an explicit method router, e.g. one built with
    /// `get(handler).with_state(self)`.
    pub fn new(
        method: Method,
        path: impl Into<String>,
        name: impl Into<String>,
        handler: MethodRouter,
    ) -> Self {
        Self {
            path: path.into(),
            method,
            name: name.into(),
            handler,
        }
    }

    pub fn get<H, T>(path: impl Into<String>, name: impl Into<String>, handler: H) -> Self
    where
        H: Handler<T, ()>,
        T: 'static,
    {
        Self::new(Method::GET, path, name, routing::get(handler))
    }

    pub fn post<H, T>(path: impl Into<String>, name: impl Into<String>, handler: H) -> Self
    where
        H: Handler<T, ()>,
        T: 'static,
    {
        Self::new(Method::POST, path, name, routing::post(handler))
    }

    pub fn put<H, T>(path: impl Into<String>, name: impl Into<String>, handler: H) -> Self
    where
        H: Handler<T, ()>,
        T: 'static,
    {
        Self::new(Method::PUT, path, name, routing::put(handler))
    }

    pub fn patch<H, T>(path: impl Into<String>, name: impl Into<String>, handler: H) -> Self
    where
        H: Handler<T, ()>,
        T: 'static,
    {
        Self::new(Method::PATCH, path, name, routing::patch(handler))
    }

    pub fn delete<H, T>(path: impl Into<String>, name: impl Into<String>, handler: H) -> Self
    where
        H: Handler<T, ()>,
        T: 'static,
    {
        Self::new(Method::DELETE, path, name, routing::delete(handler))
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("name", &self.name)
            .finish()
    }
}
