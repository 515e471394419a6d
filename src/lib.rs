pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod utils;

use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method},
    middleware::from_fn_with_state,
    routing::{delete, get, post},
    Router,
};
use sqlx::PgPool;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    handlers::{
        auth, candidate_managements, candidate_processes, candidates, companies, dashboard,
        managements, notes, post_sales, pre_invoice_items, pre_invoices, processes, users,
    },
    middleware::auth::auth_middleware,
    utils::config::Config,
};

#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub config: Arc<Config>,
}

fn cors_layer(origin: &str) -> anyhow::Result<CorsLayer> {
    let allow_origin = if origin == "*" {
        HeaderValue::from_static("*")
    } else {
        origin.parse::<HeaderValue>()?
    };

    Ok(CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]))
}

pub fn build_router(state: AppState) -> anyhow::Result<Router> {
    let cors = cors_layer(&state.config.cors_origin)?;
    let body_limit = state.config.max_body_mb * 1024 * 1024;

    let protected_routes = Router::new()
        .route(
            "/company",
            get(companies::list_companies).post(companies::create_company),
        )
        .route("/company/first", get(companies::get_first_company))
        .route(
            "/company/:id",
            get(companies::get_company)
                .put(companies::update_company)
                .delete(companies::delete_company),
        )
        .route(
            "/company/:id/management",
            get(companies::get_company_managements),
        )
        .route(
            "/management",
            get(managements::list_managements).post(managements::create_management),
        )
        .route(
            "/management/:id",
            get(managements::get_management)
                .put(managements::update_management)
                .delete(managements::delete_management),
        )
        .route(
            "/process",
            get(processes::list_processes).post(processes::create_process),
        )
        .route("/process/count", get(processes::count_processes))
        .route(
            "/process/:id",
            get(processes::get_process)
                .put(processes::update_process)
                .delete(processes::delete_process),
        )
        .route(
            "/candidates",
            get(candidates::list_candidates).post(candidates::create_candidate),
        )
        .route("/candidates/check", post(candidates::check_candidate))
        .route(
            "/candidates/:id",
            get(candidates::get_candidate)
                .put(candidates::update_candidate)
                .delete(candidates::delete_candidate),
        )
        .route(
            "/candidate_process",
            get(candidate_processes::list_candidate_processes)
                .post(candidate_processes::create_candidate_process),
        )
        .route(
            "/candidate_process/:id",
            get(candidate_processes::get_candidate_process)
                .put(candidate_processes::update_candidate_process)
                .delete(candidate_processes::delete_candidate_process),
        )
        .route(
            "/candidate_process/process/:process_id",
            get(candidate_processes::get_process_pipeline)
                .put(candidate_processes::dispatch_stage_action)
                .delete(candidate_processes::delete_process_candidates),
        )
        .route(
            "/candidate_management",
            get(candidate_managements::list_candidate_managements)
                .post(candidate_managements::create_candidate_management),
        )
        .route(
            "/candidate_management/:id",
            get(candidate_managements::get_candidate_management)
                .put(candidate_managements::update_candidate_management)
                .delete(candidate_managements::delete_candidate_management),
        )
        .route(
            "/post_sales_activities",
            get(post_sales::list_post_sales).post(post_sales::create_post_sales),
        )
        .route(
            "/post_sales_activities/:id",
            get(post_sales::get_post_sales).delete(post_sales::delete_post_sales),
        )
        .route(
            "/pre_invoices",
            get(pre_invoices::list_pre_invoices).post(pre_invoices::create_pre_invoice),
        )
        .route(
            "/pre_invoices/:id",
            get(pre_invoices::get_pre_invoice)
                .put(pre_invoices::update_pre_invoice)
                .patch(pre_invoices::change_pre_invoice_status)
                .delete(pre_invoices::delete_pre_invoice),
        )
        .route(
            "/pre_invoice_items",
            get(pre_invoice_items::list_pre_invoice_items)
                .post(pre_invoice_items::create_pre_invoice_item),
        )
        .route(
            "/pre_invoice_items/:id",
            get(pre_invoice_items::get_pre_invoice_item)
                .put(pre_invoice_items::update_pre_invoice_item)
                .delete(pre_invoice_items::delete_pre_invoice_item),
        )
        .route("/users", get(users::list_users).post(users::create_user))
        .route(
            "/users/:id",
            get(users::get_user)
                .put(users::update_user)
                .delete(users::delete_user),
        )
        .route("/users/:id/companies", get(users::get_user_companies))
        .route("/users/by-email/:email", get(users::get_user_by_email))
        .route(
            "/users/management/:management_id",
            get(users::get_management_users),
        )
        .route("/user-company", post(users::create_user_company))
        .route(
            "/user-management",
            get(users::list_user_managements).post(users::create_user_management),
        )
        .route(
            "/user-management/:id",
            delete(users::delete_user_management),
        )
        .route("/roles", get(users::list_roles))
        .route("/notes", post(notes::create_note).put(notes::update_note))
        .route("/dashboard/stats", get(dashboard::get_stats))
        .layer(from_fn_with_state(state.clone(), auth_middleware));

    let app = Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/auth/login", post(auth::login))
        .merge(protected_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state);

    Ok(app)
}

