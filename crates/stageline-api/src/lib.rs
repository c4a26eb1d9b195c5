//! stageline-api - REST surface for operator commands.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/api/v1/pipeline` | Stage chain |
//! | GET | `/api/v1/namespaces/{namespace}/workloads` | Instances with status |
//! | GET | `/api/v1/namespaces/{namespace}/history/{label}` | Recorded promotions |
//! | GET | `/api/v1/workloads/{label}/drift` | Versions across stages |
//! | POST | `/api/v1/promote` | Promote from the upstream stage |
//! | POST | `/api/v1/rollback` | Restore the previous version |

pub mod handlers;

use axum::Router;
use axum::routing::{get, post};
use stageline_promote::PromotionEngine;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub engine: PromotionEngine,
}

/// Build the API router.
pub fn build_router(engine: PromotionEngine) -> Router {
    let api_routes = Router::new()
        .route("/pipeline", get(handlers::get_pipeline))
        .route("/namespaces/{namespace}/workloads", get(handlers::list_workloads))
        .route("/namespaces/{namespace}/history/{label}", get(handlers::get_history))
        .route("/workloads/{label}/drift", get(handlers::get_drift))
        .route("/promote", post(handlers::promote))
        .route("/rollback", post(handlers::rollback))
        .with_state(ApiState { engine });

    Router::new().nest("/api/v1", api_routes)
}
