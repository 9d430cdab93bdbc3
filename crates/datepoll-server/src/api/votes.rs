use axum::{
    extract::{FromRequest, Path, Query, Request, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
    routing::get,
    Json, Router,
};
use datepoll_core::{BallotState, FieldErrors, Vote};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::auth::PresentedToken;
use super::negotiate::{is_form, Format, Payload};
use super::views::{self, vote_path};
use crate::db::VoteChanges;
use crate::error::AppError;
use crate::votes::{authorize, VoteSubmission};
use crate::AppState;

/// Request to submit a vote
#[derive(Debug, Deserialize)]
pub struct CreateVoteRequest {
    #[serde(default)]
    pub username: String,
    pub appointment_id: Uuid,
    /// Selected candidate time ids
    #[serde(default, alias = "choices[]")]
    pub choices: Vec<Uuid>,
}

/// Fields a vote update may carry. Other keys are dropped during
/// deserialization and never reach the store.
#[derive(Debug, Default, Deserialize)]
pub struct VoteParams {
    pub state: Option<String>,
    pub appointment_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
}

/// Request to update a vote
#[derive(Debug, Deserialize)]
pub struct UpdateVoteRequest {
    pub appointment_vote: VoteParams,
}

/// Flat fields posted by the edit and show pages
#[derive(Debug, Default, Deserialize)]
pub struct VoteForm {
    /// Action the browser form stands for
    #[serde(rename = "_method")]
    pub method: Option<String>,
    #[serde(rename = "appointment_vote[state]")]
    pub state: Option<String>,
    #[serde(rename = "appointment_vote[appointment_id]")]
    pub appointment_id: Option<String>,
    #[serde(rename = "appointment_vote[user_id]")]
    pub user_id: Option<String>,
    pub auth_token: Option<String>,
}

fn filled(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn parse_reference(value: Option<String>, field: &str, errors: &mut FieldErrors) -> Option<Uuid> {
    let value = filled(value)?;
    match value.trim().parse() {
        Ok(id) => Some(id),
        Err(_) => {
            errors.add(field, "is invalid");
            None
        }
    }
}

impl VoteForm {
    fn method(&self) -> Option<String> {
        self.method.as_deref().map(|m| m.trim().to_ascii_lowercase())
    }

    /// Split into the token typed into the form and the whitelisted fields.
    /// Blank inputs leave the field unchanged.
    fn into_parts(self) -> (Option<String>, Result<VoteParams, FieldErrors>) {
        let mut errors = FieldErrors::new();
        let params = VoteParams {
            state: filled(self.state),
            appointment_id: parse_reference(self.appointment_id, "appointment", &mut errors),
            user_id: parse_reference(self.user_id, "user", &mut errors),
        };
        (
            filled(self.auth_token),
            errors.into_result().map(|()| params),
        )
    }
}

/// Update body, either JSON `{"appointment_vote": {...}}` or the flat form
#[derive(Debug)]
pub enum UpdateBody {
    Json(UpdateVoteRequest),
    Form(VoteForm),
}

impl UpdateBody {
    fn into_parts(self) -> (Option<String>, Result<VoteParams, FieldErrors>) {
        match self {
            UpdateBody::Json(req) => (None, Ok(req.appointment_vote)),
            UpdateBody::Form(form) => form.into_parts(),
        }
    }
}

impl<S> FromRequest<S> for UpdateBody
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        if is_form(req.headers()) {
            let Payload(form) = Payload::<VoteForm>::from_request(req, state).await?;
            Ok(UpdateBody::Form(form))
        } else {
            let Payload(body) = Payload::<UpdateVoteRequest>::from_request(req, state).await?;
            Ok(UpdateBody::Json(body))
        }
    }
}

impl From<VoteParams> for VoteChanges {
    fn from(params: VoteParams) -> Self {
        Self {
            state: params.state,
            appointment_id: params.appointment_id,
            user_id: params.user_id,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct NoticeQuery {
    pub notice: Option<String>,
}

impl NoticeQuery {
    fn message(&self) -> Option<&'static str> {
        match self.notice.as_deref()? {
            "created" => Some("Appointment vote was successfully created."),
            "updated" => Some("Appointment vote was successfully updated."),
            "destroyed" => Some("Appointment vote was successfully destroyed."),
            _ => None,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: Uuid,
    pub username: String,
}

#[derive(Debug, Serialize)]
pub struct BallotResponse {
    pub id: Uuid,
    pub appointment_time_id: Uuid,
    pub state: BallotState,
}

/// Response for vote operations
#[derive(Debug, Serialize)]
pub struct VoteResponse {
    pub id: Uuid,
    pub user: UserResponse,
    pub appointment_id: Uuid,
    pub state: Option<String>,
    pub ballots: Vec<BallotResponse>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
    pub url: String,
}

impl From<Vote> for VoteResponse {
    fn from(vote: Vote) -> Self {
        Self {
            url: vote_path(vote.id),
            id: vote.id,
            user: UserResponse {
                id: vote.user.id,
                username: vote.user.username,
            },
            appointment_id: vote.appointment_id,
            state: vote.state,
            ballots: vote
                .ballots
                .into_iter()
                .map(|b| BallotResponse {
                    id: b.id,
                    appointment_time_id: b.appointment_time_id,
                    state: b.state,
                })
                .collect(),
            created_at: vote.created_at,
            updated_at: vote.updated_at,
        }
    }
}

/// Returned once, on creation; the only place the token is revealed
#[derive(Debug, Serialize)]
pub struct CreatedVoteResponse {
    #[serde(flatten)]
    pub vote: VoteResponse,
    pub auth_token: String,
}

/// List all votes
async fn list_votes(
    State(state): State<AppState>,
    format: Format,
    Query(query): Query<NoticeQuery>,
) -> Result<Response, AppError> {
    let votes = state.votes.list().await?;
    Ok(match format {
        Format::Html => Html(views::index(&votes, query.message())).into_response(),
        Format::Json => {
            let response: Vec<VoteResponse> = votes.into_iter().map(Into::into).collect();
            Json(response).into_response()
        }
    })
}

/// Get a vote by ID
async fn get_vote(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    format: Format,
    Query(query): Query<NoticeQuery>,
) -> Result<Response, AppError> {
    let vote = state.votes.load_vote(id).await?;
    Ok(match format {
        Format::Html => {
            let appointment = state.store.find_appointment(vote.appointment_id).await?;
            Html(views::show(&vote, appointment.as_ref(), query.message())).into_response()
        }
        Format::Json => Json(VoteResponse::from(vote)).into_response(),
    })
}

/// Get a vote for editing
async fn edit_vote(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    format: Format,
) -> Result<Response, AppError> {
    let vote = state.votes.load_vote(id).await?;
    Ok(match format {
        Format::Html => Html(views::edit(&vote, &FieldErrors::new())).into_response(),
        Format::Json => Json(VoteResponse::from(vote)).into_response(),
    })
}

/// Submit a vote
async fn create_vote(
    State(state): State<AppState>,
    format: Format,
    Payload(req): Payload<CreateVoteRequest>,
) -> Result<Response, AppError> {
    let submission = VoteSubmission {
        username: req.username,
        appointment_id: req.appointment_id,
        choices: req.choices.into_iter().collect(),
    };

    match state.votes.submit_vote(submission.clone()).await {
        Ok(vote) => {
            let path = vote_path(vote.id);
            Ok(match format {
                Format::Html => Redirect::to(&format!("{path}?notice=created")).into_response(),
                Format::Json => {
                    let auth_token = vote.auth_token.as_str().to_string();
                    (
                        StatusCode::CREATED,
                        [(header::LOCATION, path)],
                        Json(CreatedVoteResponse {
                            vote: vote.into(),
                            auth_token,
                        }),
                    )
                        .into_response()
                }
            })
        }
        Err(AppError::Validation(errors)) if format == Format::Html => {
            let appointment = state.store.find_appointment(submission.appointment_id).await?;
            Ok((
                StatusCode::UNPROCESSABLE_ENTITY,
                Html(views::new_vote(&submission, appointment.as_ref(), &errors)),
            )
                .into_response())
        }
        Err(e) => Err(e),
    }
}

/// Update a vote
async fn update_vote(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    format: Format,
    token: PresentedToken,
    body: UpdateBody,
) -> Result<Response, AppError> {
    let (form_token, params) = body.into_parts();
    let token = token.0.or(form_token);
    apply_update(&state, id, format, token.as_deref(), params).await
}

/// Delete a vote
async fn delete_vote(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    format: Format,
    token: PresentedToken,
) -> Result<Response, AppError> {
    apply_destroy(&state, id, format, token.as_deref()).await
}

/// Browser forms can only POST, so `_method` names the intended action
async fn vote_form_action(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    format: Format,
    token: PresentedToken,
    Payload(form): Payload<VoteForm>,
) -> Result<Response, AppError> {
    let method = form.method();
    let (form_token, params) = form.into_parts();
    let token = token.0.or(form_token);

    match method.as_deref() {
        Some("patch" | "put") => apply_update(&state, id, format, token.as_deref(), params).await,
        Some("delete") => apply_destroy(&state, id, format, token.as_deref()).await,
        _ => Err(AppError::BadRequest(
            "_method must be patch, put or delete".to_string(),
        )),
    }
}

async fn apply_update(
    state: &AppState,
    id: Uuid,
    format: Format,
    token: Option<&str>,
    params: Result<VoteParams, FieldErrors>,
) -> Result<Response, AppError> {
    let result = match params {
        Ok(params) => state.votes.update(id, token, params.into()).await,
        Err(errors) => reject_update(state, id, token, errors).await,
    };

    match result {
        Ok(vote) => {
            let path = vote_path(vote.id);
            Ok(match format {
                Format::Html => Redirect::to(&format!("{path}?notice=updated")).into_response(),
                Format::Json => (
                    StatusCode::OK,
                    [(header::LOCATION, path)],
                    Json(VoteResponse::from(vote)),
                )
                    .into_response(),
            })
        }
        Err(AppError::Validation(errors)) if format == Format::Html => {
            let vote = state.votes.load_vote(id).await?;
            Ok((
                StatusCode::UNPROCESSABLE_ENTITY,
                Html(views::edit(&vote, &errors)),
            )
                .into_response())
        }
        Err(e) => Err(e),
    }
}

/// Malformed form fields still answer 404 and 401 before 422
async fn reject_update(
    state: &AppState,
    id: Uuid,
    token: Option<&str>,
    errors: FieldErrors,
) -> Result<Vote, AppError> {
    let vote = state.votes.load_vote(id).await?;
    authorize(&vote, token)?;
    Err(errors.into())
}

async fn apply_destroy(
    state: &AppState,
    id: Uuid,
    format: Format,
    token: Option<&str>,
) -> Result<Response, AppError> {
    state.votes.destroy(id, token).await?;
    Ok(match format {
        Format::Html => Redirect::to("/appointment_votes?notice=destroyed").into_response(),
        Format::Json => StatusCode::NO_CONTENT.into_response(),
    })
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/appointment_votes", get(list_votes).post(create_vote))
        .route(
            "/appointment_votes/{id}",
            get(get_vote)
                .post(vote_form_action)
                .patch(update_vote)
                .put(update_vote)
                .delete(delete_vote),
        )
        .route("/appointment_votes/{id}/edit", get(edit_vote))
}
