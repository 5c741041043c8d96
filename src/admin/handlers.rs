use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;

use crate::app::{Application, RouteEntry};
use crate::component::ComponentHandle;
use crate::http::HttpError;
use crate::unit::{RouteInfo, Unit, UnitPhase};

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub units: usize,
    pub degraded: usize,
}

#[derive(Serialize)]
pub struct UnitStatus {
    pub name: String,
    pub version: String,
    pub description: String,
    pub phase: UnitPhase,
    pub path: String,
    pub services: Vec<&'static str>,
    pub controllers: Vec<&'static str>,
    pub routes: Vec<RouteInfo>,
}

impl UnitStatus {
    fn from_unit(unit: &Unit) -> Option<Self> {
        let meta = unit.meta()?;
        let config = unit.config()?;
        Some(Self {
            name: meta.name.clone(),
            version: meta.version.clone(),
            description: meta.description.clone(),
            phase: unit.phase(),
            path: config.path().to_string(),
            services: type_names(unit.services()),
            controllers: type_names(unit.controllers()),
            routes: unit.routes().to_vec(),
        })
    }
}

fn type_names(handles: &[Arc<ComponentHandle>]) -> Vec<&'static str> {
    handles.iter().map(|h| h.type_name()).collect()
}

pub async fn get_status(State(app): State<Arc<Application>>) -> Json<SystemStatus> {
    let units = app.registry().imported();
    let degraded = units
        .iter()
        .filter(|u| u.phase() == UnitPhase::Degraded)
        .count();

    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: if degraded == 0 { "operational" } else { "degraded" },
        units: units.len(),
        degraded,
    })
}

pub async fn get_units(State(app): State<Arc<Application>>) -> Json<Vec<UnitStatus>> {
    Json(
        app.registry()
            .imported()
            .iter()
            .filter_map(UnitStatus::from_unit)
            .collect(),
    )
}

pub async fn get_unit(
    State(app): State<Arc<Application>>,
    Path(name): Path<String>,
) -> Result<Json<UnitStatus>, HttpError> {
    app.registry()
        .get_import(&name)
        .and_then(UnitStatus::from_unit)
        .map(Json)
        .ok_or_else(|| HttpError::not_found(format!("no unit named {name}")))
}

pub async fn get_routes(State(app): State<Arc<Application>>) -> Json<Vec<RouteEntry>> {
    Json(app.routes().entries().to_vec())
}
