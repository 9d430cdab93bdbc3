use chrono::{DateTime, Utc};
use datepoll_core::{
    Appointment, AppointmentTime, AuthToken, Ballot, BallotState, User, Vote,
};
use uuid::Uuid;

use crate::error::AppError;

/// Appointment database model
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AppointmentRow {
    pub id: Uuid,
    pub title: String,
    pub created_at: DateTime<Utc>,
}

impl AppointmentRow {
    pub fn into_appointment(self, times: Vec<AppointmentTimeRow>) -> Appointment {
        Appointment {
            id: self.id,
            title: self.title,
            created_at: self.created_at,
            times: times.into_iter().map(Into::into).collect(),
        }
    }
}

/// Candidate time database model
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AppointmentTimeRow {
    pub id: Uuid,
    pub appointment_id: Uuid,
    pub position: i32,
    pub starts_at: DateTime<Utc>,
}

impl From<AppointmentTimeRow> for AppointmentTime {
    fn from(row: AppointmentTimeRow) -> Self {
        Self {
            id: row.id,
            appointment_id: row.appointment_id,
            position: row.position,
            starts_at: row.starts_at,
        }
    }
}

/// Vote joined with its user
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct VoteRow {
    pub id: Uuid,
    pub appointment_id: Uuid,
    pub state: Option<String>,
    pub auth_token: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub user_id: Uuid,
    pub username: String,
    pub user_created_at: DateTime<Utc>,
}

impl VoteRow {
    pub fn into_vote(self, ballots: Vec<Ballot>) -> Vote {
        Vote {
            id: self.id,
            user: User {
                id: self.user_id,
                username: self.username,
                created_at: self.user_created_at,
            },
            appointment_id: self.appointment_id,
            state: self.state,
            auth_token: AuthToken::from_stored(self.auth_token),
            ballots,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Ballot database model
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct BallotRow {
    pub id: Uuid,
    pub appointment_vote_id: Uuid,
    pub appointment_time_id: Uuid,
    pub state: String,
}

impl TryFrom<BallotRow> for Ballot {
    type Error = AppError;

    fn try_from(row: BallotRow) -> Result<Self, Self::Error> {
        let state: BallotState = row.state.parse().map_err(AppError::Internal)?;
        Ok(Self {
            id: row.id,
            appointment_time_id: row.appointment_time_id,
            state,
        })
    }
}
