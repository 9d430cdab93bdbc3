use datepoll_core::{fan_out, AuthToken, FieldErrors, Vote};
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use crate::db::{NewVote, VoteChanges, VoteStore};
use crate::error::AppError;

/// A vote as submitted by a client
#[derive(Debug, Clone, Validate)]
pub struct VoteSubmission {
    #[validate(length(max = 255, message = "is too long (maximum is 255 characters)"))]
    pub username: String,
    pub appointment_id: Uuid,
    /// Candidate times the voter can attend
    pub choices: HashSet<Uuid>,
}

/// Vote workflows on top of an injected store
#[derive(Clone)]
pub struct VoteService {
    store: Arc<dyn VoteStore>,
}

impl VoteService {
    pub fn new(store: Arc<dyn VoteStore>) -> Self {
        Self { store }
    }

    /// Record a vote: one new user, one vote and one ballot per candidate
    /// time of the appointment.
    pub async fn submit_vote(&self, submission: VoteSubmission) -> Result<Vote, AppError> {
        submission.validate()?;

        let appointment = self
            .store
            .find_appointment(submission.appointment_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("Appointment {} not found", submission.appointment_id))
            })?;

        let ballots = fan_out(&appointment.times, &submission.choices);
        let vote = self
            .store
            .insert_vote(&NewVote {
                username: submission.username,
                appointment_id: appointment.id,
                auth_token: AuthToken::generate(),
                ballots,
            })
            .await?;

        tracing::info!(
            vote_id = %vote.id,
            appointment_id = %appointment.id,
            ballots = vote.ballots.len(),
            "Vote submitted"
        );
        Ok(vote)
    }

    pub async fn list(&self) -> Result<Vec<Vote>, AppError> {
        self.store.list_votes().await
    }

    /// Load a vote or fail with `NotFound`
    pub async fn load_vote(&self, id: Uuid) -> Result<Vote, AppError> {
        self.store
            .find_vote(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Appointment vote {id} not found")))
    }

    /// Update the whitelisted fields of a vote.
    ///
    /// Moving a vote to another appointment replaces its ballots with a "no"
    /// for each time of the new appointment.
    pub async fn update(
        &self,
        id: Uuid,
        token: Option<&str>,
        changes: VoteChanges,
    ) -> Result<Vote, AppError> {
        let vote = self.load_vote(id).await?;
        authorize(&vote, token)?;
        changes.validate()?;

        if changes.is_empty() {
            return Ok(vote);
        }

        let mut errors = FieldErrors::new();
        let mut ballots = None;

        if let Some(appointment_id) = changes.appointment_id {
            match self.store.find_appointment(appointment_id).await? {
                Some(appointment) if appointment.id != vote.appointment_id => {
                    ballots = Some(fan_out(&appointment.times, &HashSet::new()));
                }
                Some(_) => {}
                None => errors.add("appointment", "must exist"),
            }
        }
        if let Some(user_id) = changes.user_id {
            if !self.store.user_exists(user_id).await? {
                errors.add("user", "must exist");
            }
        }
        errors.into_result()?;

        let updated = self
            .store
            .update_vote(id, &changes, ballots.as_deref())
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Appointment vote {id} not found")))?;

        tracing::info!(vote_id = %id, "Vote updated");
        Ok(updated)
    }

    /// Delete a vote and its ballots
    pub async fn destroy(&self, id: Uuid, token: Option<&str>) -> Result<(), AppError> {
        let vote = self.load_vote(id).await?;
        authorize(&vote, token)?;

        if !self.store.delete_vote(id).await? {
            return Err(AppError::NotFound(format!("Appointment vote {id} not found")));
        }

        tracing::info!(vote_id = %id, "Vote deleted");
        Ok(())
    }
}

/// Allow a mutation only when the presented token is the vote's own token
pub fn authorize(vote: &Vote, token: Option<&str>) -> Result<(), AppError> {
    match token {
        Some(token) if vote.auth_token.matches(token) => Ok(()),
        _ => {
            tracing::debug!(vote_id = %vote.id, "Rejected vote token");
            Err(AppError::Unauthorized)
        }
    }
}
