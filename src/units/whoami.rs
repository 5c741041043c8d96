//! `whoami`: tells callers their address and how often they came by.
//!
//! Visit counts live in the unit's state store, so they survive restarts
//! and expire with `state_lifetime_secs`.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use axum::extract::{ConnectInfo, State};
use axum::http::Method;
use axum::routing::get;
use serde::Serialize;

use crate::component::{Component, ComponentContext, Controller, Route, Service};
use crate::config::{FieldSpec, UnitConfigSchema};
use crate::error::{BootstrapError, HookResult};
use crate::http::{HttpError, JsonBody};
use crate::state::StateStore;
use crate::unit::{ExplicitMeta, Unit};

const VISITS_KEY: &str = "visits";

/// Declare the unit.
pub fn unit() -> Result<Unit, BootstrapError> {
    Unit::builder()
        .meta(ExplicitMeta::new(
            "whoami",
            env!("CARGO_PKG_VERSION"),
            "Echoes the caller's address",
        ))
        .config(
            UnitConfigSchema::new()
                .field(FieldSpec::string("greeting").default_value("hello"))
                .field(FieldSpec::integer("state_lifetime_secs").default_value(86_400_i64)),
        )
        .service::<VisitCounter>()
        .controller::<WhoamiController>()
        .build()
}

/// Per-address visit counter.
pub struct VisitCounter {
    state: StateStore,
    // serializes read-modify-write of the counts document
    write: Mutex<()>,
    span: tracing::Span,
}

impl VisitCounter {
    /// Record a visit from `address`, returning the visit count.
    pub fn visit(&self, address: &str) -> u64 {
        let _guard = self.write.lock().unwrap_or_else(PoisonError::into_inner);

        let mut counts: std::collections::BTreeMap<String, u64> =
            self.state.get(VISITS_KEY).unwrap_or_default();
        let count = counts.entry(address.to_string()).or_insert(0);
        *count += 1;
        let count = *count;

        self.state.set(VISITS_KEY, &counts);
        count
    }

    /// Number of distinct addresses currently remembered.
    pub fn visitors(&self) -> usize {
        self.state
            .get::<std::collections::BTreeMap<String, u64>>(VISITS_KEY)
            .map_or(0, |counts| counts.len())
    }
}

#[async_trait]
impl Component for VisitCounter {
    async fn on_startup(&self) -> HookResult {
        self.span.in_scope(|| {
            tracing::info!(
                visitors = self.visitors(),
                age_secs = self.state.age_seconds(),
                "Visit counts loaded"
            )
        });
        Ok(())
    }
}

impl Service for VisitCounter {
    fn build(ctx: &mut ComponentContext<'_>) -> Result<Self, BootstrapError> {
        Ok(Self {
            state: ctx.state().clone(),
            write: Mutex::new(()),
            span: ctx.span().clone(),
        })
    }
}

#[derive(Debug, Serialize)]
struct WhoamiResponse {
    greeting: String,
    address: String,
    visits: u64,
}

pub struct WhoamiController {
    visits: Arc<VisitCounter>,
    greeting: String,
    pretty: bool,
}

#[async_trait]
impl Component for WhoamiController {}

impl Controller for WhoamiController {
    fn build(ctx: &mut ComponentContext<'_>) -> Result<Self, BootstrapError> {
        let greeting = ctx
            .config()
            .get_str("greeting")
            .ok_or_else(|| ctx.error("greeting is not a string"))?
            .to_string();

        Ok(Self {
            visits: ctx.service::<VisitCounter>()?,
            greeting,
            pretty: ctx.app_config().pretty_json,
        })
    }

    fn routes(self: Arc<Self>) -> Vec<Route> {
        vec![Route::new(
            Method::GET,
            "/",
            "whoami",
            get(whoami).with_state(self),
        )]
    }
}

async fn whoami(
    State(controller): State<Arc<WhoamiController>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
) -> Result<JsonBody, HttpError> {
    let address = addr.ip().to_string();
    let visits = controller.visits.visit(&address);

    JsonBody::new(
        &WhoamiResponse {
            greeting: controller.greeting.clone(),
            address,
            visits,
        },
        controller.pretty,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::Application;
    use crate::config::MapEnv;
    use crate::state::{ManualClock, StateRegistry};
    use std::time::Duration;

    #[test]
    fn test_visits_expire_with_state_lifetime() {
        let clock = Arc::new(ManualClock::at_ms(0));
        let states = Arc::new(StateRegistry::in_memory(clock.clone()));
        let raw = toml::from_str("[whoami]\nstate_lifetime_secs = 60").unwrap();

        let mut app = Application::builder()
            .config(raw)
            .env(MapEnv::new())
            .state(states)
            .unit(unit().unwrap())
            .build()
            .unwrap();
        assert!(app.load_units().is_clean());

        let whoami = app.registry().get_import("whoami").unwrap();
        let counter = whoami.service::<VisitCounter>().unwrap();
        assert_eq!(counter.visit("10.0.0.1"), 1);
        assert_eq!(counter.visit("10.0.0.1"), 2);
        assert_eq!(counter.visit("10.0.0.2"), 1);
        assert_eq!(counter.visitors(), 2);

        clock.advance(Duration::from_secs(61));
        assert_eq!(counter.visitors(), 0);
        assert_eq!(counter.visit("10.0.0.1"), 1);
    }
}
