//! guardant-api — operational REST API for the coordinator.
//!
//! Read-only views over the coordination state: regions with live
//! availability, the worker fleet, open incidents, cached check
//! statuses, and queue health.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/api/v1/regions` | Region catalog with availability |
//! | GET | `/api/v1/workers` | Live workers with load counters |
//! | GET | `/api/v1/incidents` | Open incidents |
//! | GET | `/api/v1/status/{nest_id}/{service_id}` | Latest check status |
//! | GET | `/api/v1/queue` | Queue statistics and recent jobs |
//! | GET | `/metrics` | Prometheus exposition |

pub mod handlers;

use std::sync::Arc;

use axum::Router;
use axum::routing::get;

use guardant_metrics::CheckMetrics;
use guardant_queue::MemoryQueue;
use guardant_registry::{RegionCatalog, WorkerRegistry};
use guardant_state::StateStore;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub store: StateStore,
    pub registry: WorkerRegistry,
    pub catalog: RegionCatalog,
    pub queue: Arc<MemoryQueue>,
    pub metrics: Arc<CheckMetrics>,
}

/// Build the complete API router (REST + metrics).
pub fn build_router(state: ApiState) -> Router {
    let api_routes = Router::new()
        .route("/regions", get(handlers::list_regions))
        .route("/workers", get(handlers::list_workers))
        .route("/incidents", get(handlers::list_incidents))
        .route("/status/{nest_id}/{service_id}", get(handlers::get_status))
        .route("/queue", get(handlers::queue_stats))
        .with_state(state.clone());

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/metrics", get(handlers::prometheus_metrics).with_state(state))
}
