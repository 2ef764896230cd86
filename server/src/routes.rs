// Copyright (c) 2025 sbksba
//
// This software is licensed under the terms of the MIT License.
// See the LICENSE file in the project root for the full license text.
use crate::handlers;
use axum::{
    Router,
    routing::{delete, get, put},
};
use sqlx::SqlitePool;

/// Creates and configures the application router.
pub fn create_router(pool: SqlitePool) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        // Programs
        .route(
            "/api/programs",
            get(handlers::list_programs).post(handlers::create_program),
        )
        .route("/api/programs/{id}", delete(handlers::delete_program))
        // Clients
        .route(
            "/api/clients",
            get(handlers::list_clients).post(handlers::create_client),
        )
        .route(
            "/api/clients/{id}",
            get(handlers::get_client)
                .put(handlers::update_client)
                .delete(handlers::delete_client),
        )
        // Payments
        .route(
            "/api/payments",
            get(handlers::list_payments).post(handlers::create_payment),
        )
        .route(
            "/api/payments/current-month",
            get(handlers::list_current_month_payments),
        )
        .route("/api/payments/{id}/mark-paid", put(handlers::mark_payment_paid))
        // Dashboard
        .route("/api/dashboard/stats", get(handlers::dashboard_stats))
        // Adds the database pool to the application state
        .with_state(pool)
}
