mod memory;
pub mod models;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::Database;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use datepoll_core::{Appointment, AuthToken, NewBallot, Vote};
use uuid::Uuid;
use validator::Validate;

use crate::error::AppError;

/// An appointment to be created together with its candidate times
#[derive(Debug, Clone)]
pub struct NewAppointment {
    pub title: String,
    /// Candidate start times, stored in this order
    pub starts_at: Vec<DateTime<Utc>>,
}

/// Everything written when a vote is submitted
#[derive(Debug, Clone)]
pub struct NewVote {
    /// Username of the user created alongside the vote
    pub username: String,
    pub appointment_id: Uuid,
    pub auth_token: AuthToken,
    pub ballots: Vec<NewBallot>,
}

/// Fields of a vote that may be changed after creation
#[derive(Debug, Clone, Default, PartialEq, Eq, Validate)]
pub struct VoteChanges {
    #[validate(length(max = 255, message = "is too long (maximum is 255 characters)"))]
    pub state: Option<String>,
    pub appointment_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
}

impl VoteChanges {
    pub fn is_empty(&self) -> bool {
        self.state.is_none() && self.appointment_id.is_none() && self.user_id.is_none()
    }
}

/// Persistence for appointments and votes.
///
/// Every method is a single unit of work: either all of its writes land or
/// none do.
#[async_trait]
pub trait VoteStore: Send + Sync {
    /// Check that the store is reachable
    async fn ping(&self) -> Result<(), AppError>;

    /// Create an appointment and its candidate times
    async fn create_appointment(&self, new: &NewAppointment) -> Result<Appointment, AppError>;

    /// Get an appointment with its times ordered by position
    async fn find_appointment(&self, id: Uuid) -> Result<Option<Appointment>, AppError>;

    async fn user_exists(&self, id: Uuid) -> Result<bool, AppError>;

    /// List all votes in creation order
    async fn list_votes(&self) -> Result<Vec<Vote>, AppError>;

    async fn find_vote(&self, id: Uuid) -> Result<Option<Vote>, AppError>;

    /// Create the user, the vote and its ballots.
    ///
    /// Fails with `NotFound` and writes nothing when the appointment does not
    /// exist.
    async fn insert_vote(&self, new: &NewVote) -> Result<Vote, AppError>;

    /// Apply `changes` to a vote. When `ballots` is given the vote's ballots
    /// are replaced by it. Returns `None` when the vote does not exist.
    async fn update_vote(
        &self,
        id: Uuid,
        changes: &VoteChanges,
        ballots: Option<&[NewBallot]>,
    ) -> Result<Option<Vote>, AppError>;

    /// Delete a vote and its ballots. Returns whether a vote was removed.
    async fn delete_vote(&self, id: Uuid) -> Result<bool, AppError>;
}
