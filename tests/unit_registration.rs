//! Unit registration: metadata, configuration, singletons, integration
//! and rollback of units that fail to attach.

use std::sync::Arc;

use aioli::config::MapEnv;
use aioli::{
    BootstrapError, Component, ComponentContext, Controller, ExplicitMeta, ManifestMeta, Route,
    Service, Unit, UnitPhase,
};
use async_trait::async_trait;

mod common;
use common::*;

#[test]
fn test_billing_unit_attaches() {
    let billing = billing_unit("billing");
    let mut app = app("", vec![billing.clone()]);

    let summary = app.load_units();
    assert!(summary.is_clean());
    assert_eq!(summary.attached, vec!["billing"]);

    let registry = app.registry();
    assert!(registry.get_import("billing").unwrap().ptr_eq(&billing));
    assert_eq!(registry.get_config("billing").unwrap().path(), "/billing");
    assert_eq!(billing.phase(), UnitPhase::Attached);

    let paths: Vec<(String, String)> = billing
        .routes()
        .iter()
        .map(|r| (r.method.clone(), r.path.clone()))
        .collect();
    assert_eq!(
        paths,
        vec![
            ("GET".to_string(), "/api/billing/".to_string()),
            ("POST".to_string(), "/api/billing/invoices".to_string()),
        ]
    );
    assert_eq!(app.routes().len(), 2);
}

#[test]
fn test_service_is_singleton_per_unit() {
    let billing = billing_unit("billing");
    let mut app = app("", vec![billing.clone()]);
    app.load_units();

    let service = billing.service::<InvoiceService>().unwrap();
    let controller = billing.controller::<InvoiceController>().unwrap();
    assert!(Arc::ptr_eq(&service, &controller.invoices));
    assert_eq!(app.registry().services(Some("billing")).len(), 1);
}

#[test]
fn test_api_base_root() {
    let billing = billing_unit("billing");
    let mut app = app("[aioli]\napi_base = \"/\"", vec![billing.clone()]);
    app.load_units();

    assert_eq!(billing.routes()[0].path, "/billing/");
}

#[test]
fn test_reserved_name_rejected() {
    let reserved = billing_unit("aioli");
    let mut app = app("", vec![reserved.clone()]);

    let summary = app.load_units();
    assert!(summary.attached.is_empty());
    let (_, err) = &summary.failed[0];
    assert!(matches!(err, BootstrapError::UnitMeta { unit, .. } if unit == "aioli"));
    assert!(err.field_errors().unwrap().contains("name"));

    assert!(app.registry().get_import("aioli").is_none());
    assert!(app.routes().is_empty());
    assert_eq!(reserved.phase(), UnitPhase::Failed);
}

#[test]
fn test_invalid_version_rejected() {
    let unit = Unit::builder()
        .meta(ExplicitMeta::new("billing", "1.0", ""))
        .build()
        .unwrap();
    let mut app = app("", vec![unit]);

    let summary = app.load_units();
    let errors = summary.failed[0].1.field_errors().unwrap();
    assert!(errors.contains("version"));
    assert!(!errors.contains("name"));
}

#[test]
fn test_metadata_must_be_exclusive() {
    let err = Unit::builder().build().unwrap_err();
    assert!(matches!(err, BootstrapError::MissingMetadata));

    let err = Unit::builder()
        .meta(ExplicitMeta::new("billing", "1.0.0", ""))
        .auto_meta(ManifestMeta::new("Cargo.toml"))
        .build()
        .unwrap_err();
    assert!(matches!(err, BootstrapError::ConflictingMetadata));
}

#[test]
fn test_auto_meta_from_manifest() {
    let dir = tempfile::tempdir().unwrap();
    let manifest = dir.path().join("Cargo.toml");
    std::fs::write(
        &manifest,
        "[package]\nname = \"reports\"\nversion = \"0.3.1\"\ndescription = \"Monthly reports\"\n",
    )
    .unwrap();

    let reports = Unit::builder()
        .auto_meta(ManifestMeta::new(&manifest))
        .build()
        .unwrap();
    let mut app = app("", vec![reports.clone()]);
    app.load_units();

    let meta = reports.meta().unwrap();
    assert_eq!(meta.name, "reports");
    assert_eq!(meta.version, "0.3.1");
    assert_eq!(meta.description, "Monthly reports");
}

#[test]
fn test_missing_manifest_fails_unit() {
    let dir = tempfile::tempdir().unwrap();
    let unit = Unit::builder()
        .auto_meta(ManifestMeta::new(dir.path().join("absent.toml")))
        .build()
        .unwrap();
    let mut app = app("", vec![unit]);

    let summary = app.load_units();
    assert!(matches!(
        summary.failed[0].1,
        BootstrapError::MetadataUnavailable { .. }
    ));
}

#[test]
fn test_duplicate_unit_name() {
    let first = billing_unit("billing");
    let second = billing_unit("billing");
    let mut app = app("", vec![first.clone(), second.clone()]);

    let summary = app.load_units();
    assert_eq!(summary.attached, vec!["billing"]);
    assert!(matches!(&summary.failed[0].1, BootstrapError::DuplicateUnit(name) if name == "billing"));
    assert!(app.registry().get_import("billing").unwrap().ptr_eq(&first));
    assert_eq!(second.phase(), UnitPhase::Failed);
}

#[test]
fn test_same_handle_given_twice_attaches_once() {
    let billing = billing_unit("billing");
    let mut app = app("", vec![billing.clone(), billing.clone()]);

    let summary = app.load_units();
    assert!(summary.is_clean());
    assert_eq!(app.registry().imported().len(), 1);
}

#[test]
#[should_panic(expected = "registered twice")]
fn test_registering_attached_unit_again_panics() {
    let billing = billing_unit("billing");
    let mut app = app("", vec![billing.clone()]);
    app.load_units();

    app.add_units(vec![billing]);
    app.load_units();
}

#[test]
fn test_duplicate_route_rolls_back_unit() {
    let billing = billing_unit("billing");
    let copycat = billing_unit("invoices");
    let mut app = app(
        "[invoices]\npath = \"/billing\"",
        vec![billing, copycat.clone()],
    );

    let summary = app.load_units();
    assert_eq!(summary.attached, vec!["billing"]);
    match &summary.failed[0].1 {
        BootstrapError::DuplicateRoute { method, path } => {
            assert_eq!(method, "GET");
            assert_eq!(path, "/api/billing/");
        }
        other => panic!("unexpected error: {other}"),
    }

    assert!(app.registry().services(Some("invoices")).is_empty());
    assert_eq!(app.routes().len(), 2);
    assert!(!copycat.is_attached());
}

/// Serves whatever item paths it was built with.
struct ItemsController {
    paths: Vec<&'static str>,
}

#[async_trait]
impl Component for ItemsController {}

impl Controller for ItemsController {
    fn build(ctx: &mut ComponentContext<'_>) -> Result<Self, BootstrapError> {
        let paths = match ctx.unit_name() {
            "shop" => vec!["/items", "/items/:id"],
            "catalog" => vec!["/items/{id}", "/files/{*rest}"],
            _ => vec!["/items/{sku}"],
        };
        Ok(Self { paths })
    }

    fn routes(self: Arc<Self>) -> Vec<Route> {
        self.paths
            .iter()
            .map(|path| Route::get(*path, "item", || async { "item" }))
            .collect()
    }
}

fn items_unit(name: &str) -> Unit {
    Unit::builder()
        .meta(ExplicitMeta::new(name, "1.0.0", ""))
        .controller::<ItemsController>()
        .build()
        .unwrap()
}

#[test]
fn test_unmountable_route_rolls_back_unit() {
    let shop = items_unit("shop");
    let mut app = app("", vec![shop.clone(), billing_unit("billing")]);

    let summary = app.load_units();
    assert_eq!(summary.attached, vec!["billing"]);
    match &summary.failed[0].1 {
        BootstrapError::InvalidRoute { path, reason } => {
            assert_eq!(path, "/api/shop/items/:id");
            assert!(reason.contains("{name}"));
        }
        other => panic!("unexpected error: {other}"),
    }

    assert!(!shop.is_attached());
    assert_eq!(app.routes().len(), 2);
    assert!(app.routes().entries().iter().all(|e| !e.path.starts_with("/api/shop")));
    let _router = app.router();
}

#[test]
fn test_capture_routes_mount() {
    let catalog = items_unit("catalog");
    let mut app = app("", vec![catalog.clone()]);

    assert!(app.load_units().is_clean());
    let paths: Vec<&str> = catalog.routes().iter().map(|r| r.path.as_str()).collect();
    assert_eq!(paths, vec!["/api/catalog/items/{id}", "/api/catalog/files/{*rest}"]);
    let _router = app.router();
}

#[test]
fn test_conflicting_capture_names_rejected() {
    let catalog = items_unit("catalog");
    let rival = items_unit("rival");
    let mut app = app("[rival]\npath = \"/catalog\"", vec![catalog, rival.clone()]);

    let summary = app.load_units();
    assert_eq!(summary.attached, vec!["catalog"]);
    assert!(matches!(
        &summary.failed[0].1,
        BootstrapError::InvalidRoute { path, .. } if path == "/api/catalog/items/{sku}"
    ));
    assert!(!rival.is_attached());
    let _router = app.router();
}

/// Remembers the log level it was built with.
struct Verbosity {
    debug: bool,
}

#[async_trait]
impl Component for Verbosity {}

impl Service for Verbosity {
    fn build(ctx: &mut ComponentContext<'_>) -> Result<Self, BootstrapError> {
        Ok(Self { debug: ctx.debug() })
    }
}

fn verbosity_unit(name: &str) -> Unit {
    Unit::builder()
        .meta(ExplicitMeta::new(name, "1.0.0", ""))
        .service::<Verbosity>()
        .build()
        .unwrap()
}

#[test]
fn test_unit_debug_overrides_application() {
    let quiet = verbosity_unit("quiet");
    let loud = verbosity_unit("loud");
    let mut app = app("[loud]\ndebug = true", vec![quiet.clone(), loud.clone()]);
    assert!(app.load_units().is_clean());

    assert!(!quiet.service::<Verbosity>().unwrap().debug);
    assert!(loud.service::<Verbosity>().unwrap().debug);

    let quiet = verbosity_unit("quiet");
    let plain = verbosity_unit("plain");
    let mut app = common::app(
        "[aioli]\ndebug = true\n[quiet]\ndebug = false",
        vec![quiet.clone(), plain.clone()],
    );
    assert!(app.load_units().is_clean());

    assert!(!quiet.service::<Verbosity>().unwrap().debug);
    assert!(plain.service::<Verbosity>().unwrap().debug);
}

#[test]
fn test_unit_config_env_wins() {
    let billing = billing_unit("billing");
    let env = MapEnv::new()
        .with("BILLING_INVOICE_PREFIX", "ENV")
        .with("BILLING_PATH", "/payments");
    let mut app = app_with_env(
        "[billing]\ninvoice_prefix = \"FILE\"",
        env,
        vec![billing.clone()],
    );
    app.load_units();

    assert_eq!(billing.service::<InvoiceService>().unwrap().prefix, "ENV");
    assert_eq!(billing.config().unwrap().path(), "/payments");
}

#[test]
fn test_unit_config_rejects_unknown_field() {
    let mut app = app(
        "[billing]\ninvoice_prefix = \"B\"\ncurrency = \"EUR\"",
        vec![billing_unit("billing")],
    );

    let summary = app.load_units();
    let (label, err) = &summary.failed[0];
    assert_eq!(label, "billing");
    assert!(matches!(err, BootstrapError::UnitConfig { .. }));
    assert!(err.field_errors().unwrap().contains("currency"));
}

#[test]
fn test_invalid_path_rejected() {
    let mut app = app("[billing]\npath = \"billing\"", vec![billing_unit("billing")]);

    let summary = app.load_units();
    assert!(summary.failed[0].1.field_errors().unwrap().contains("path"));
}

#[test]
fn test_controllers_can_be_skipped() {
    let billing = billing_unit("billing");
    let mut app = app(
        "[billing]\nshould_import_controllers = false",
        vec![billing.clone()],
    );
    app.load_units();

    assert!(billing.controllers().is_empty());
    assert!(billing.routes().is_empty());
    assert!(billing.service::<InvoiceService>().is_some());
}

#[test]
fn test_integration_builds_fresh_instance() {
    let billing = billing_unit("billing");
    let accounts = accounts_unit("accounts");
    let mut app = app(
        "[billing]\ninvoice_prefix = \"B\"\n[accounts]\ninvoice_prefix = \"A\"",
        vec![billing.clone(), accounts.clone()],
    );

    let summary = app.load_units();
    assert!(summary.is_clean(), "{:?}", summary.failed);

    let ledger = accounts.service::<Ledger>().unwrap();
    let exported = billing.service::<InvoiceService>().unwrap();
    assert!(!Arc::ptr_eq(&ledger.invoices, &exported));
    assert_eq!(ledger.invoices.unit, "accounts");
    assert_eq!(ledger.invoices.prefix, "A");
    assert_eq!(exported.prefix, "B");

    // the integrated instance is listed but is not the unit's singleton
    assert_eq!(app.registry().services(Some("accounts")).len(), 2);
    assert!(accounts.service::<InvoiceService>().is_none());
}

#[test]
fn test_integration_requires_exporter() {
    let accounts = accounts_unit("accounts");
    let billing = billing_unit("billing");
    let mut app = app("", vec![accounts.clone(), billing]);

    let summary = app.load_units();
    assert_eq!(summary.attached, vec!["billing"]);
    match &summary.failed[0].1 {
        BootstrapError::UnresolvedIntegration { component, requester } => {
            assert_eq!(component, "InvoiceService");
            assert_eq!(requester, "accounts");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(app.registry().services(Some("accounts")).is_empty());
}

#[test]
fn test_connect_shares_singleton() {
    let billing = billing_unit("billing");
    let audit = audit_unit("audit");
    let mut app = app("", vec![billing.clone(), audit.clone()]);
    app.load_units();

    let auditor = audit.service::<Auditor>().unwrap();
    let exported = billing.service::<InvoiceService>().unwrap();
    assert!(Arc::ptr_eq(&auditor.invoices, &exported));
}

#[test]
fn test_connect_without_instance() {
    let mut app = app("", vec![audit_unit("audit")]);

    let summary = app.load_units();
    assert!(matches!(
        &summary.failed[0].1,
        BootstrapError::NotConnected { component, .. } if component == "InvoiceService"
    ));
}

#[test]
fn test_cycle_rejected() {
    let mut app = app("", vec![cyclic_unit("loop"), billing_unit("billing")]);

    let summary = app.load_units();
    assert_eq!(summary.attached, vec!["billing"]);
    match &summary.failed[0].1 {
        BootstrapError::CyclicDependency { unit, cycle } => {
            assert_eq!(unit, "loop");
            assert_eq!(cycle, &vec!["Ping", "Pong", "Ping"]);
        }
        other => panic!("unexpected error: {other}"),
    }
}
