//! Shared units and helpers for integration tests.
//!
//! Hooks append to a thread-local journal. `#[tokio::test]` runs on the
//! current thread, so each test sees only its own events.

#![allow(dead_code)]

use std::cell::RefCell;
use std::sync::Arc;
use std::time::Duration;

use aioli::config::{FieldSpec, MapEnv, UnitConfigSchema};
use aioli::state::ManualClock;
use aioli::{
    Application, BootstrapError, Component, ComponentContext, Controller, ExplicitMeta,
    HookResult, Route, Service, StateRegistry, Unit,
};
use async_trait::async_trait;
use axum::extract::State;
use axum::http::Method;
use axum::routing::get;
use axum::Json;
use serde_json::{json, Value};

thread_local! {
    static JOURNAL: RefCell<Vec<String>> = const { RefCell::new(Vec::new()) };
}

/// Append `event` to this thread's journal.
pub fn record(event: String) {
    JOURNAL.with(|j| j.borrow_mut().push(event));
}

/// Drain this thread's journal.
pub fn take_events() -> Vec<String> {
    JOURNAL.with(|j| std::mem::take(&mut *j.borrow_mut()))
}

/// Application over an isolated environment and an in-memory state db.
pub fn app(raw: &str, units: Vec<Unit>) -> Application {
    app_with_env(raw, MapEnv::new(), units)
}

pub fn app_with_env(raw: &str, env: MapEnv, units: Vec<Unit>) -> Application {
    let raw = toml::from_str(raw).unwrap();
    let states = StateRegistry::in_memory(Arc::new(ManualClock::at_ms(1_700_000_000_000)));
    Application::builder()
        .config(raw)
        .env(env)
        .state(Arc::new(states))
        .units(units)
        .build()
        .unwrap()
}

fn meta(name: &str) -> ExplicitMeta {
    ExplicitMeta::new(name, "1.0.0", format!("{name} test unit"))
}

/// Unit `name` with no components.
pub fn empty_unit(name: &str) -> Unit {
    Unit::builder().meta(meta(name)).build().unwrap()
}

pub fn invoice_schema() -> UnitConfigSchema {
    UnitConfigSchema::new().field(FieldSpec::string("invoice_prefix").default_value("INV"))
}

/// `name` exporting `InvoiceService` behind `InvoiceController`.
pub fn billing_unit(name: &str) -> Unit {
    Unit::builder()
        .meta(meta(name))
        .config(invoice_schema())
        .service::<InvoiceService>()
        .controller::<InvoiceController>()
        .build()
        .unwrap()
}

/// `name` with a `Ledger` integrating `InvoiceService`. Shares the
/// invoice schema so its section may configure the integrated instance.
pub fn accounts_unit(name: &str) -> Unit {
    Unit::builder()
        .meta(meta(name))
        .config(invoice_schema())
        .service::<Ledger>()
        .build()
        .unwrap()
}

/// `name` with an `Auditor` connected to the existing `InvoiceService`.
pub fn audit_unit(name: &str) -> Unit {
    Unit::builder()
        .meta(meta(name))
        .service::<Auditor>()
        .build()
        .unwrap()
}

pub fn faulty_unit(name: &str) -> Unit {
    Unit::builder()
        .meta(meta(name))
        .service::<Faulty>()
        .service::<Watcher>()
        .build()
        .unwrap()
}

pub fn sleepy_unit(name: &str) -> Unit {
    Unit::builder()
        .meta(meta(name))
        .service::<Sleepy>()
        .build()
        .unwrap()
}

pub fn cyclic_unit(name: &str) -> Unit {
    Unit::builder()
        .meta(meta(name))
        .service::<Ping>()
        .build()
        .unwrap()
}

/// Records `<unit>:<component>:start|stop`.
macro_rules! journaled {
    ($ty:ident) => {
        #[async_trait]
        impl Component for $ty {
            async fn on_startup(&self) -> HookResult {
                record(format!("{}:{}:start", self.unit, stringify!($ty)));
                Ok(())
            }

            async fn on_shutdown(&self) -> HookResult {
                record(format!("{}:{}:stop", self.unit, stringify!($ty)));
                Ok(())
            }
        }
    };
}

pub struct InvoiceService {
    pub unit: String,
    pub prefix: String,
}

journaled!(InvoiceService);

impl Service for InvoiceService {
    fn build(ctx: &mut ComponentContext<'_>) -> Result<Self, BootstrapError> {
        let prefix = ctx
            .config()
            .get_str("invoice_prefix")
            .ok_or_else(|| ctx.error("invoice_prefix missing"))?
            .to_string();
        Ok(Self {
            unit: ctx.unit_name().to_string(),
            prefix,
        })
    }
}

impl InvoiceService {
    pub fn invoice_id(&self, number: u32) -> String {
        format!("{}-{:04}", self.prefix, number)
    }
}

pub struct InvoiceController {
    pub unit: String,
    pub invoices: Arc<InvoiceService>,
}

journaled!(InvoiceController);

impl Controller for InvoiceController {
    fn build(ctx: &mut ComponentContext<'_>) -> Result<Self, BootstrapError> {
        Ok(Self {
            unit: ctx.unit_name().to_string(),
            invoices: ctx.service::<InvoiceService>()?,
        })
    }

    fn routes(self: Arc<Self>) -> Vec<Route> {
        vec![
            Route::new(Method::GET, "/", "list_invoices", get(list_invoices).with_state(self.clone())),
            Route::post("/invoices", "create_invoice", || async { Json(json!({ "created": true })) }),
        ]
    }
}

async fn list_invoices(State(controller): State<Arc<InvoiceController>>) -> Json<Value> {
    Json(json!({
        "unit": controller.unit,
        "first": controller.invoices.invoice_id(1),
    }))
}

pub struct Ledger {
    pub unit: String,
    pub invoices: Arc<InvoiceService>,
}

journaled!(Ledger);

impl Service for Ledger {
    fn build(ctx: &mut ComponentContext<'_>) -> Result<Self, BootstrapError> {
        Ok(Self {
            unit: ctx.unit_name().to_string(),
            invoices: ctx.integrate::<InvoiceService>()?,
        })
    }
}

pub struct Auditor {
    pub unit: String,
    pub invoices: Arc<InvoiceService>,
}

journaled!(Auditor);

impl Service for Auditor {
    fn build(ctx: &mut ComponentContext<'_>) -> Result<Self, BootstrapError> {
        Ok(Self {
            unit: ctx.unit_name().to_string(),
            invoices: ctx.connect::<InvoiceService>()?,
        })
    }
}

/// Fails its startup hook.
pub struct Faulty {
    pub unit: String,
}

#[async_trait]
impl Component for Faulty {
    async fn on_startup(&self) -> HookResult {
        record(format!("{}:Faulty:start", self.unit));
        Err("upstream refused connection".into())
    }
}

impl Service for Faulty {
    fn build(ctx: &mut ComponentContext<'_>) -> Result<Self, BootstrapError> {
        Ok(Self {
            unit: ctx.unit_name().to_string(),
        })
    }
}

/// Depends on `Faulty`, so it never starts.
pub struct Watcher {
    pub unit: String,
    pub faulty: Arc<Faulty>,
}

journaled!(Watcher);

impl Service for Watcher {
    fn build(ctx: &mut ComponentContext<'_>) -> Result<Self, BootstrapError> {
        Ok(Self {
            unit: ctx.unit_name().to_string(),
            faulty: ctx.service::<Faulty>()?,
        })
    }
}

/// Never finishes starting.
pub struct Sleepy;

#[async_trait]
impl Component for Sleepy {
    async fn on_startup(&self) -> HookResult {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(())
    }
}

impl Service for Sleepy {
    fn build(_ctx: &mut ComponentContext<'_>) -> Result<Self, BootstrapError> {
        Ok(Sleepy)
    }
}

pub struct Ping {
    pub pong: Arc<Pong>,
}

#[async_trait]
impl Component for Ping {}

impl Service for Ping {
    fn build(ctx: &mut ComponentContext<'_>) -> Result<Self, BootstrapError> {
        Ok(Self {
            pong: ctx.service::<Pong>()?,
        })
    }
}

pub struct Pong {
    pub ping: Arc<Ping>,
}

#[async_trait]
impl Component for Pong {}

impl Service for Pong {
    fn build(ctx: &mut ComponentContext<'_>) -> Result<Self, BootstrapError> {
        Ok(Self {
            ping: ctx.service::<Ping>()?,
        })
    }
}
