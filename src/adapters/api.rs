use actix_web::{HttpResponse, Responder, get, web};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;

use crate::app::services::{EntityQueryHandler, ServiceError, SharedEntityStore};
use crate::domain::entity::PollHealth;

#[derive(Clone)]
pub struct ApiState {
    pub entity_queries: SharedEntityStore,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MowerDiagnosticsResponse {
    pub generated_at: String,
    pub mower_count: usize,
    pub stale_count: usize,
    pub mowers: Vec<PollHealth>,
}

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(health)
        .service(list_sensors_endpoint)
        .service(get_sensor_endpoint)
        .service(list_trackers_endpoint)
        .service(get_tracker_endpoint)
        .service(get_mower_diagnostics_endpoint);
}

#[get("/health")]
async fn health() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({ "status": "ok" }))
}

#[get("/sensors")]
async fn list_sensors_endpoint(state: web::Data<ApiState>) -> impl Responder {
    match state.entity_queries.list_sensors() {
        Ok(sensors) => HttpResponse::Ok().json(sensors),
        Err(error) => service_error_response(error),
    }
}

#[get("/sensors/{unique_id}")]
async fn get_sensor_endpoint(
    state: web::Data<ApiState>,
    path: web::Path<String>,
) -> impl Responder {
    let unique_id = path.into_inner();
    match state.entity_queries.get_sensor(&unique_id) {
        Ok(Some(sensor)) => HttpResponse::Ok().json(sensor),
        Ok(None) => HttpResponse::NotFound().json(serde_json::json!({
            "error": format!("no sensor with unique id {unique_id}")
        })),
        Err(error) => service_error_response(error),
    }
}

#[get("/trackers")]
async fn list_trackers_endpoint(state: web::Data<ApiState>) -> impl Responder {
    match state.entity_queries.list_trackers() {
        Ok(trackers) => HttpResponse::Ok().json(trackers),
        Err(error) => service_error_response(error),
    }
}

#[get("/trackers/{dev_id}")]
async fn get_tracker_endpoint(
    state: web::Data<ApiState>,
    path: web::Path<String>,
) -> impl Responder {
    let dev_id = path.into_inner();
    match state.entity_queries.get_tracker(&dev_id) {
        Ok(Some(tracker)) => HttpResponse::Ok().json(tracker),
        Ok(None) => HttpResponse::NotFound().json(serde_json::json!({
            "error": format!("no tracker with device id {dev_id}")
        })),
        Err(error) => service_error_response(error),
    }
}

#[get("/diagnostics/mowers")]
async fn get_mower_diagnostics_endpoint(state: web::Data<ApiState>) -> impl Responder {
    let mowers = match state.entity_queries.list_health() {
        Ok(value) => value,
        Err(error) => return service_error_response(error),
    };

    HttpResponse::Ok().json(MowerDiagnosticsResponse {
        generated_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        mower_count: mowers.len(),
        stale_count: mowers.iter().filter(|mower| mower.stale).count(),
        mowers,
    })
}

fn service_error_response(error: ServiceError) -> HttpResponse {
    match error {
        ServiceError::StoreLockPoisoned => {
            HttpResponse::InternalServerError().json(serde_json::json!({
                "error": "entity store lock poisoned"
            }))
        }
    }
}
