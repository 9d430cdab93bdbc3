use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use datepoll_core::Appointment;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::db::NewAppointment;
use crate::error::AppError;
use crate::AppState;

/// Request to create an appointment with its candidate times
#[derive(Debug, Deserialize, Validate)]
pub struct CreateAppointmentRequest {
    #[validate(length(min = 1, max = 255, message = "must be between 1 and 255 characters"))]
    pub title: String,
    /// Candidate start times in display order
    #[validate(length(min = 1, message = "must contain at least one time"))]
    pub times: Vec<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct AppointmentTimeResponse {
    pub id: Uuid,
    pub position: i32,
    pub starts_at: DateTime<Utc>,
}

/// Response for appointment operations
#[derive(Debug, Serialize)]
pub struct AppointmentResponse {
    pub id: Uuid,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub times: Vec<AppointmentTimeResponse>,
}

impl From<Appointment> for AppointmentResponse {
    fn from(appointment: Appointment) -> Self {
        Self {
            id: appointment.id,
            title: appointment.title,
            created_at: appointment.created_at,
            times: appointment
                .times
                .into_iter()
                .map(|t| AppointmentTimeResponse {
                    id: t.id,
                    position: t.position,
                    starts_at: t.starts_at,
                })
                .collect(),
        }
    }
}

/// Create an appointment
async fn create_appointment(
    State(state): State<AppState>,
    Json(req): Json<CreateAppointmentRequest>,
) -> Result<Response, AppError> {
    req.validate()?;

    let appointment = state
        .store
        .create_appointment(&NewAppointment {
            title: req.title,
            starts_at: req.times,
        })
        .await?;

    tracing::info!(appointment_id = %appointment.id, times = appointment.times.len(), "Appointment created");

    let location = format!("/appointments/{}", appointment.id);
    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, location)],
        Json(AppointmentResponse::from(appointment)),
    )
        .into_response())
}

/// Get an appointment by ID
async fn get_appointment(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<AppointmentResponse>, AppError> {
    let appointment = state
        .store
        .find_appointment(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Appointment {} not found", id)))?;
    Ok(Json(appointment.into()))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/appointments", post(create_appointment))
        .route("/appointments/{id}", get(get_appointment))
}
