//! Route table handed to the HTTP layer.
//!
//! # Responsibilities
//! - Accept routes from attached controllers under their full path
//! - Reject a second handler for the same path and method
//! - Produce one axum `Router`, merging methods that share a path
//!
//! # Design Decisions
//! - Full path = api base + unit path, with duplicate and trailing
//!   slashes collapsed, then the route path appended verbatim:
//!   `/api` + `/billing` + `/` → `/api/billing/`
//! - Paths are checked against the router's syntax before mounting, since
//!   axum panics on a bad path when the router is built. Captures are
//!   whole segments: `{id}`, or `{*rest}` as the last segment

use std::collections::BTreeMap;

use axum::http::Method;
use axum::routing::MethodRouter;
use axum::Router;
use serde::Serialize;

/// Where the registry mounts controller routes.
pub trait RouteSink {
    /// Whether `method` on `path` is already taken.
    fn contains(&self, path: &str, method: &Method) -> bool;

    /// Distinct mounted paths.
    fn paths(&self) -> Vec<&str>;

    fn add_route(&mut self, path: String, handler: MethodRouter, method: Method, name: String);
}

/// One mounted endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteEntry {
    pub path: String,
    pub method: String,
    pub name: String,
}

/// Routes of an application, merged per path.
#[derive(Default)]
pub struct RouteTable {
    routers: BTreeMap<String, MethodRouter>,
    entries: Vec<RouteEntry>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mounted endpoints in registration order.
    pub fn entries(&self) -> &[RouteEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Axum router serving every mounted endpoint.
    pub fn router(&self) -> Router {
        self.routers
            .iter()
            .fold(Router::new(), |router, (path, handler)| {
                router.route(path, handler.clone())
            })
    }
}

impl RouteSink for RouteTable {
    fn contains(&self, path: &str, method: &Method) -> bool {
        let method = method.as_str();
        self.entries
            .iter()
            .any(|e| e.path == path && e.method == method)
    }

    fn paths(&self) -> Vec<&str> {
        self.routers.keys().map(String::as_str).collect()
    }

    fn add_route(&mut self, path: String, handler: MethodRouter, method: Method, name: String) {
        tracing::debug!(path = %path, method = %method, name = %name, "Route added");

        self.entries.push(RouteEntry {
            path: path.clone(),
            method: method.to_string(),
            name,
        });

        let merged = match self.routers.remove(&path) {
            Some(existing) => existing.merge(handler),
            None => handler,
        };
        self.routers.insert(path, merged);
    }
}

impl std::fmt::Debug for RouteTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteTable")
            .field("entries", &self.entries)
            .finish()
    }
}

/// Full path of a route.
pub fn format_path(api_base: &str, unit_path: &str, route_path: &str) -> String {
    let mut full = String::new();
    for segment in api_base
        .split('/')
        .chain(unit_path.split('/'))
        .filter(|s| !s.is_empty())
    {
        full.push('/');
        full.push_str(segment);
    }

    if route_path.is_empty() {
        if full.is_empty() {
            full.push('/');
        }
    } else {
        if !route_path.starts_with('/') {
            full.push('/');
        }
        full.push_str(route_path);
    }
    full
}

/// Check `path` against the router's path syntax.
pub fn validate_route_path(path: &str) -> Result<(), &'static str> {
    let Some(rest) = path.strip_prefix('/') else {
        return Err("paths must start with '/'");
    };

    let segments: Vec<&str> = rest.split('/').collect();
    let mut names: Vec<&str> = Vec::new();
    for (i, segment) in segments.iter().enumerate() {
        if segment.starts_with(':') || segment.starts_with('*') {
            return Err("segments must not start with ':' or '*', use {name} or {*name}");
        }
        if !segment.contains(|c: char| c == '{' || c == '}') {
            continue;
        }

        let inner = segment
            .strip_prefix('{')
            .and_then(|s| s.strip_suffix('}'))
            .ok_or("a capture must span the whole segment")?;
        let (name, wildcard) = match inner.strip_prefix('*') {
            Some(name) => (name, true),
            None => (inner, false),
        };
        if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err("capture names must be non-empty and alphanumeric");
        }
        if wildcard && i + 1 != segments.len() {
            return Err("a {*name} capture must be the last segment");
        }
        if names.contains(&name) {
            return Err("capture names must be unique within a path");
        }
        names.push(name);
    }
    Ok(())
}

/// `path` with capture names erased. Two paths of the same shape match the
/// same requests.
pub fn route_shape(path: &str) -> String {
    path.split('/')
        .map(|segment| match segment.strip_prefix('{') {
            Some(inner) if inner.starts_with('*') => "{*}",
            Some(_) => "{}",
            None => segment,
        })
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::{get, post};

    #[test]
    fn test_format_path() {
        assert_eq!(format_path("/api", "/billing", "/"), "/api/billing/");
        assert_eq!(format_path("/", "/billing", "/"), "/billing/");
        assert_eq!(format_path("/api", "/billing", "/invoices"), "/api/billing/invoices");
        assert_eq!(format_path("/api", "/billing", ""), "/api/billing");
        assert_eq!(format_path("/api", "/", "/"), "/api/");
        assert_eq!(format_path("/", "/", ""), "/");
        assert_eq!(format_path("/api", "/billing", "items"), "/api/billing/items");
    }

    #[test]
    fn test_methods_merge_per_path() {
        let mut table = RouteTable::new();
        table.add_route("/a".into(), get(|| async { "get" }), Method::GET, "read".into());
        assert!(table.contains("/a", &Method::GET));
        assert!(!table.contains("/a", &Method::POST));

        table.add_route("/a".into(), post(|| async { "post" }), Method::POST, "write".into());
        assert_eq!(table.len(), 2);
        let _router = table.router();
        assert_eq!(table.paths(), vec!["/a"]);
    }

    #[test]
    fn test_validate_route_path() {
        assert!(validate_route_path("/api/items/").is_ok());
        assert!(validate_route_path("/api/items/{id}").is_ok());
        assert!(validate_route_path("/api/items/{id}/lines/{line_no}").is_ok());
        assert!(validate_route_path("/api/files/{*rest}").is_ok());

        assert!(validate_route_path("api/items").is_err());
        assert!(validate_route_path("/api/items/:id").is_err());
        assert!(validate_route_path("/api/files/*rest").is_err());
        assert!(validate_route_path("/api/items/{id").is_err());
        assert!(validate_route_path("/api/items/id}").is_err());
        assert!(validate_route_path("/api/items/{}").is_err());
        assert!(validate_route_path("/api/items/x{id}").is_err());
        assert!(validate_route_path("/api/{*rest}/tail").is_err());
        assert!(validate_route_path("/api/{id}/{id}").is_err());
    }

    #[test]
    fn test_route_shape() {
        assert_eq!(route_shape("/a/{id}/b"), "/a/{}/b");
        assert_eq!(route_shape("/a/{key}/b"), route_shape("/a/{id}/b"));
        assert_eq!(route_shape("/a/{*rest}"), "/a/{*}");
        assert_eq!(route_shape("/a/"), "/a/");
    }

    #[test]
    fn test_router_accepts_validated_paths() {
        let mut table = RouteTable::new();
        for path in ["/items/{id}", "/files/{*rest}", "/items/"] {
            assert!(validate_route_path(path).is_ok());
            table.add_route(path.into(), get(|| async { "ok" }), Method::GET, path.into());
        }
        let _router = table.router();
    }
}
