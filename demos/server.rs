// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Simple REST API server example for the point ledger.
//!
//! Run with: `cargo run --example server`
//!
//! ## Endpoints
//!
//! - `GET /point/:id` - Current balance of a user
//! - `GET /point/:id/histories` - Charge/use history of a user
//! - `PATCH /point/:id/charge` - Charge points
//! - `PATCH /point/:id/use` - Use points
//!
//! ## Example Usage
//!
//! ```bash
//! # Charge
//! curl -X PATCH http://localhost:3000/point/1/charge \
//!   -H "Content-Type: application/json" \
//!   -d '{"amount": 100}'
//!
//! # Use
//! curl -X PATCH http://localhost:3000/point/1/use \
//!   -H "Content-Type: application/json" \
//!   -d '{"amount": 30}'
//!
//! # Balance and history
//! curl http://localhost:3000/point/1
//! curl http://localhost:3000/point/1/histories
//! ```

use axum::{
    Json, Router,
    extract::{
        Path, State,
        rejection::{JsonRejection, PathRejection},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, patch},
};
use point_ledger_rs::{
    InMemoryBalanceStore, InMemoryHistoryStore, PointError, PointHistory, PointService, UserId,
    UserPoint,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::net::TcpListener;

/// Request body for charge and use.
///
/// ```json
/// {"amount": 100}
/// ```
#[derive(Debug, Deserialize)]
pub struct PointRequest {
    pub amount: u64,
}

/// Response body for errors.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

/// Shared application state containing the ledger.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<PointService<InMemoryBalanceStore, InMemoryHistoryStore>>,
}

/// Ledger errors and malformed requests, rendered as `ErrorResponse`.
pub enum AppError {
    Point(PointError),
    BadRequest(String),
}

impl From<PointError> for AppError {
    fn from(err: PointError) -> Self {
        AppError::Point(err)
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, code) = match self {
            AppError::Point(err) => {
                let status = match &err {
                    PointError::InvalidAmount => StatusCode::BAD_REQUEST,
                    PointError::ExceedMaxPoint | PointError::NotEnoughPoint => {
                        StatusCode::UNPROCESSABLE_ENTITY
                    }
                    PointError::UserNotFound => StatusCode::NOT_FOUND,
                    PointError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, err.to_string(), err.code())
            }
            AppError::BadRequest(message) => (StatusCode::BAD_REQUEST, message, "INVALID_REQUEST"),
        };

        (
            status,
            Json(ErrorResponse {
                error,
                code: code.to_string(),
            }),
        )
            .into_response()
    }
}

/// GET /point/:id - Current balance.
async fn point(
    State(state): State<AppState>,
    id: Result<Path<u64>, PathRejection>,
) -> Result<Json<UserPoint>, AppError> {
    let Path(id) = id?;
    Ok(Json(state.service.get_user_point(UserId(id)).await?))
}

/// GET /point/:id/histories - History in insertion order.
async fn histories(
    State(state): State<AppState>,
    id: Result<Path<u64>, PathRejection>,
) -> Result<Json<Vec<PointHistory>>, AppError> {
    let Path(id) = id?;
    Ok(Json(state.service.get_user_point_history(UserId(id)).await?))
}

/// PATCH /point/:id/charge - Charge points.
async fn charge(
    State(state): State<AppState>,
    id: Result<Path<u64>, PathRejection>,
    request: Result<Json<PointRequest>, JsonRejection>,
) -> Result<Json<UserPoint>, AppError> {
    let (Path(id), Json(request)) = (id?, request?);
    Ok(Json(state.service.charge(UserId(id), request.amount).await?))
}

/// PATCH /point/:id/use - Use points.
async fn use_point(
    State(state): State<AppState>,
    id: Result<Path<u64>, PathRejection>,
    request: Result<Json<PointRequest>, JsonRejection>,
) -> Result<Json<UserPoint>, AppError> {
    let (Path(id), Json(request)) = (id?, request?);
    Ok(Json(state.service.use_point(UserId(id), request.amount).await?))
}

fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/point/{id}", get(point))
        .route("/point/{id}/histories", get(histories))
        .route("/point/{id}/charge", patch(charge))
        .route("/point/{id}/use", patch(use_point))
        .with_state(state)
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let state = AppState {
        service: Arc::new(PointService::new(
            Arc::new(InMemoryBalanceStore::new()),
            Arc::new(InMemoryHistoryStore::new()),
        )),
    };

    let app = create_router(state);

    let listener = TcpListener::bind("127.0.0.1:3000").await.unwrap();
    tracing::info!("point ledger API listening on http://127.0.0.1:3000");

    axum::serve(listener, app).await.unwrap();
}
