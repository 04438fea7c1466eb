//! Route table and registry.
//!
//! # Responsibilities
//! - Keep compiled routes ordered by priority
//! - Look up the matching route for a request
//! - Replace the whole table atomically on registration and reload
//!
//! # Design Decisions
//! - Readers load an `Arc<RouteTable>` snapshot without locking (`arc_swap`)
//! - Writers are serialized and build the next table off to the side
//! - Stable sort by descending priority: ties keep registration order
//! - Explicit `None` rather than a silent default route

use std::sync::{Arc, Mutex};
use std::time::Duration;

use arc_swap::ArcSwap;
use axum::http::Method;
use serde::Serialize;

use crate::config::RouteConfig;
use crate::load_balancer::pool::DEFAULT_RECOVERY_WINDOW;
use crate::routing::matcher::method_matches;
use crate::routing::route::{Route, RouteError};

/// A successful lookup.
#[derive(Debug, Clone)]
pub struct RouteMatch {
    pub route: Arc<Route>,
    pub params: Vec<(String, String)>,
}

impl RouteMatch {
    /// Value of a `{name}` parameter.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

/// An immutable, priority-ordered set of routes.
#[derive(Debug, Default)]
pub struct RouteTable {
    routes: Vec<Arc<Route>>,
    generation: u64,
}

impl RouteTable {
    fn new(mut routes: Vec<Arc<Route>>, generation: u64) -> Self {
        routes.sort_by(|a, b| b.priority.cmp(&a.priority));
        Self { routes, generation }
    }

    /// First route, by priority, whose method and pattern match.
    pub fn match_route(&self, method: &Method, path: &str) -> Option<RouteMatch> {
        self.routes.iter().find_map(|route| {
            if !method_matches(&route.method, method) {
                return None;
            }
            route.pattern.matches(path).map(|params| RouteMatch {
                route: route.clone(),
                params,
            })
        })
    }

    pub fn routes(&self) -> &[Arc<Route>] {
        &self.routes
    }

    pub fn get(&self, id: &str) -> Option<&Arc<Route>> {
        self.routes.iter().find(|route| route.id == id)
    }

    /// Incremented on every swap.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// Outcome of a bulk reload.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReloadReport {
    pub loaded: usize,
    pub inactive: usize,
    pub skipped: Vec<SkippedRoute>,
    pub generation: u64,
}

/// A route left out of a reload.
#[derive(Debug, Clone, Serialize)]
pub struct SkippedRoute {
    pub id: String,
    pub reason: String,
}

/// Owner of the live route table.
#[derive(Debug)]
pub struct RouteRegistry {
    table: ArcSwap<RouteTable>,
    writer: Mutex<()>,
    recovery_window: Duration,
}

impl Default for RouteRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_RECOVERY_WINDOW)
    }
}

impl RouteRegistry {
    pub fn new(recovery_window: Duration) -> Self {
        Self {
            table: ArcSwap::from_pointee(RouteTable::default()),
            writer: Mutex::new(()),
            recovery_window,
        }
    }

    /// Current table. The snapshot stays valid while the caller holds it.
    pub fn snapshot(&self) -> Arc<RouteTable> {
        self.table.load_full()
    }

    pub fn match_route(&self, method: &Method, path: &str) -> Option<RouteMatch> {
        self.table.load().match_route(method, path)
    }

    /// Add one route to the live table.
    pub fn register(&self, config: &RouteConfig) -> Result<Arc<Route>, RouteError> {
        let _writer = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        let current = self.table.load_full();

        if current.get(&config.id).is_some() {
            return Err(RouteError::DuplicateId(config.id.clone()));
        }

        let route = Arc::new(self.compile(config)?);
        let mut routes = current.routes.clone();
        routes.push(route.clone());
        self.table
            .store(Arc::new(RouteTable::new(routes, current.generation + 1)));

        tracing::info!(
            route_id = %route.id,
            service = %route.service_name,
            pattern = %route.pattern,
            servers = route.pool.backends().len(),
            "Route registered"
        );
        Ok(route)
    }

    /// Replace the whole table with the given routes.
    ///
    /// Inactive routes are left out; invalid and duplicate ones are skipped and
    /// reported. Readers see either the old table or the new one, never a mix.
    pub fn reload(&self, configs: &[RouteConfig]) -> ReloadReport {
        let _writer = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        let mut report = ReloadReport::default();
        let mut routes: Vec<Arc<Route>> = Vec::with_capacity(configs.len());

        for config in configs {
            if !config.active {
                report.inactive += 1;
                continue;
            }
            if routes.iter().any(|r| r.id == config.id) {
                let err = RouteError::DuplicateId(config.id.clone());
                tracing::warn!(route_id = %config.id, error = %err, "Skipping route");
                report.skipped.push(SkippedRoute {
                    id: config.id.clone(),
                    reason: err.to_string(),
                });
                continue;
            }
            match self.compile(config) {
                Ok(route) => routes.push(Arc::new(route)),
                Err(err) => {
                    tracing::warn!(route_id = %config.id, error = %err, "Skipping route");
                    report.skipped.push(SkippedRoute {
                        id: config.id.clone(),
                        reason: err.to_string(),
                    });
                }
            }
        }

        report.loaded = routes.len();
        report.generation = self.table.load().generation + 1;
        self.table
            .store(Arc::new(RouteTable::new(routes, report.generation)));

        tracing::info!(
            loaded = report.loaded,
            inactive = report.inactive,
            skipped = report.skipped.len(),
            generation = report.generation,
            "Route table reloaded"
        );
        report
    }

    fn compile(&self, config: &RouteConfig) -> Result<Route, RouteError> {
        Ok(Route::from_config(config)?.with_recovery_window(self.recovery_window))
    }
}
