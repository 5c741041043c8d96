//! Admin API: read-only view of attached units.
//!
//! Every route requires `Authorization: Bearer <admin.api_key>`.

pub mod auth;
pub mod handlers;

use std::sync::Arc;

use axum::{middleware, routing::get, Router};

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::app::Application;

pub fn setup_admin_router(app: Arc<Application>) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/units", get(get_units))
        .route("/admin/units/{name}", get(get_unit))
        .route("/admin/routes", get(get_routes))
        .route_layer(middleware::from_fn_with_state(
            app.clone(),
            admin_auth_middleware,
        ))
        .with_state(app)
}
