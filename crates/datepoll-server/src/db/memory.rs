use async_trait::async_trait;
use chrono::{DateTime, Utc};
use datepoll_core::{
    Appointment, AppointmentTime, AuthToken, Ballot, FieldErrors, NewBallot, User, Vote,
};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{NewAppointment, NewVote, VoteChanges, VoteStore};
use crate::error::AppError;

struct VoteRecord {
    id: Uuid,
    user_id: Uuid,
    appointment_id: Uuid,
    state: Option<String>,
    auth_token: AuthToken,
    ballots: Vec<Ballot>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    appointments: HashMap<Uuid, Appointment>,
    /// Kept in insertion order
    votes: Vec<VoteRecord>,
}

impl Tables {
    fn assemble(&self, record: &VoteRecord) -> Result<Vote, AppError> {
        let user = self
            .users
            .get(&record.user_id)
            .cloned()
            .ok_or_else(|| AppError::Internal(format!("user {} missing", record.user_id)))?;

        Ok(Vote {
            id: record.id,
            user,
            appointment_id: record.appointment_id,
            state: record.state.clone(),
            auth_token: record.auth_token.clone(),
            ballots: record.ballots.clone(),
            created_at: record.created_at,
            updated_at: record.updated_at,
        })
    }

    /// Check ballots against the appointment's times before anything is written
    fn check_ballots(&self, appointment_id: Uuid, ballots: &[NewBallot]) -> Result<(), AppError> {
        let appointment = self
            .appointments
            .get(&appointment_id)
            .ok_or_else(|| AppError::NotFound(format!("Appointment {appointment_id} not found")))?;

        let mut errors = FieldErrors::new();
        for ballot in ballots {
            if !appointment.has_time(ballot.appointment_time_id) {
                errors.add("appointment_time", "must exist");
            }
        }
        errors.into_result().map_err(Into::into)
    }
}

fn materialize(ballots: &[NewBallot]) -> Vec<Ballot> {
    ballots
        .iter()
        .map(|b| Ballot {
            id: Uuid::new_v4(),
            appointment_time_id: b.appointment_time_id,
            state: b.state,
        })
        .collect()
}

/// Process-local store.
///
/// A single lock guards all tables, so each operation is atomic.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored users
    pub async fn user_count(&self) -> usize {
        self.tables.read().await.users.len()
    }

    /// Number of stored ballots across all votes
    pub async fn ballot_count(&self) -> usize {
        self.tables
            .read()
            .await
            .votes
            .iter()
            .map(|v| v.ballots.len())
            .sum()
    }
}

#[async_trait]
impl VoteStore for MemoryStore {
    async fn ping(&self) -> Result<(), AppError> {
        Ok(())
    }

    async fn create_appointment(&self, new: &NewAppointment) -> Result<Appointment, AppError> {
        let id = Uuid::new_v4();
        let times = new
            .starts_at
            .iter()
            .enumerate()
            .map(|(position, starts_at)| AppointmentTime {
                id: Uuid::new_v4(),
                appointment_id: id,
                position: position as i32,
                starts_at: *starts_at,
            })
            .collect();

        let appointment = Appointment {
            id,
            title: new.title.clone(),
            created_at: Utc::now(),
            times,
        };

        self.tables
            .write()
            .await
            .appointments
            .insert(id, appointment.clone());
        Ok(appointment)
    }

    async fn find_appointment(&self, id: Uuid) -> Result<Option<Appointment>, AppError> {
        Ok(self.tables.read().await.appointments.get(&id).cloned())
    }

    async fn user_exists(&self, id: Uuid) -> Result<bool, AppError> {
        Ok(self.tables.read().await.users.contains_key(&id))
    }

    async fn list_votes(&self) -> Result<Vec<Vote>, AppError> {
        let tables = self.tables.read().await;
        tables.votes.iter().map(|r| tables.assemble(r)).collect()
    }

    async fn find_vote(&self, id: Uuid) -> Result<Option<Vote>, AppError> {
        let tables = self.tables.read().await;
        tables
            .votes
            .iter()
            .find(|r| r.id == id)
            .map(|r| tables.assemble(r))
            .transpose()
    }

    async fn insert_vote(&self, new: &NewVote) -> Result<Vote, AppError> {
        let mut tables = self.tables.write().await;
        tables.check_ballots(new.appointment_id, &new.ballots)?;

        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            username: new.username.clone(),
            created_at: now,
        };
        let record = VoteRecord {
            id: Uuid::new_v4(),
            user_id: user.id,
            appointment_id: new.appointment_id,
            state: None,
            auth_token: new.auth_token.clone(),
            ballots: materialize(&new.ballots),
            created_at: now,
            updated_at: now,
        };

        tables.users.insert(user.id, user);
        let vote = tables.assemble(&record)?;
        tables.votes.push(record);
        Ok(vote)
    }

    async fn update_vote(
        &self,
        id: Uuid,
        changes: &VoteChanges,
        ballots: Option<&[NewBallot]>,
    ) -> Result<Option<Vote>, AppError> {
        let mut tables = self.tables.write().await;
        let Some(index) = tables.votes.iter().position(|r| r.id == id) else {
            return Ok(None);
        };

        let mut errors = FieldErrors::new();
        if let Some(user_id) = changes.user_id {
            if !tables.users.contains_key(&user_id) {
                errors.add("user", "must exist");
            }
        }
        if let Some(appointment_id) = changes.appointment_id {
            if !tables.appointments.contains_key(&appointment_id) {
                errors.add("appointment", "must exist");
            }
        }
        errors.into_result()?;

        if let Some(ballots) = ballots {
            let appointment_id = changes
                .appointment_id
                .unwrap_or(tables.votes[index].appointment_id);
            tables.check_ballots(appointment_id, ballots)?;
        }

        let record = &mut tables.votes[index];
        if let Some(state) = &changes.state {
            record.state = Some(state.clone());
        }
        if let Some(appointment_id) = changes.appointment_id {
            record.appointment_id = appointment_id;
        }
        if let Some(user_id) = changes.user_id {
            record.user_id = user_id;
        }
        if let Some(ballots) = ballots {
            record.ballots = materialize(ballots);
        }
        record.updated_at = Utc::now();

        tables.assemble(&tables.votes[index]).map(Some)
    }

    async fn delete_vote(&self, id: Uuid) -> Result<bool, AppError> {
        let mut tables = self.tables.write().await;
        let before = tables.votes.len();
        tables.votes.retain(|r| r.id != id);
        Ok(tables.votes.len() < before)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use datepoll_core::BallotState;

    async fn appointment(store: &MemoryStore, slots: usize) -> Appointment {
        let start = Utc::now();
        store
            .create_appointment(&NewAppointment {
                title: "Standup".into(),
                starts_at: (0..slots).map(|i| start + Duration::hours(i as i64)).collect(),
            })
            .await
            .unwrap()
    }

    fn no_ballots(appt: &Appointment) -> Vec<NewBallot> {
        appt.times
            .iter()
            .map(|t| NewBallot {
                appointment_time_id: t.id,
                state: BallotState::No,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_appointment_times_keep_order() {
        let store = MemoryStore::new();
        let appt = appointment(&store, 3).await;

        let loaded = store.find_appointment(appt.id).await.unwrap().unwrap();
        let positions: Vec<_> = loaded.times.iter().map(|t| t.position).collect();
        assert_eq!(positions, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_insert_vote_for_missing_appointment_writes_nothing() {
        let store = MemoryStore::new();
        let result = store
            .insert_vote(&NewVote {
                username: "ghost".into(),
                appointment_id: Uuid::new_v4(),
                auth_token: AuthToken::generate(),
                ballots: vec![],
            })
            .await;

        assert!(matches!(result, Err(AppError::NotFound(_))));
        assert_eq!(store.user_count().await, 0);
        assert!(store.list_votes().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_insert_rejects_foreign_ballots() {
        let store = MemoryStore::new();
        let appt = appointment(&store, 1).await;
        let other = appointment(&store, 1).await;

        let result = store
            .insert_vote(&NewVote {
                username: "mallory".into(),
                appointment_id: appt.id,
                auth_token: AuthToken::generate(),
                ballots: no_ballots(&other),
            })
            .await;

        assert!(matches!(result, Err(AppError::Validation(_))));
        assert_eq!(store.user_count().await, 0);
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let store = MemoryStore::new();
        let appt = appointment(&store, 2).await;
        let vote = store
            .insert_vote(&NewVote {
                username: "dave".into(),
                appointment_id: appt.id,
                auth_token: AuthToken::generate(),
                ballots: no_ballots(&appt),
            })
            .await
            .unwrap();
        assert_eq!(store.ballot_count().await, 2);

        let changes = VoteChanges {
            state: Some("confirmed".into()),
            ..Default::default()
        };
        let updated = store.update_vote(vote.id, &changes, None).await.unwrap().unwrap();
        assert_eq!(updated.state.as_deref(), Some("confirmed"));
        assert_eq!(updated.ballots, vote.ballots);
        assert!(updated.updated_at >= vote.updated_at);

        let bad = VoteChanges {
            user_id: Some(Uuid::new_v4()),
            ..Default::default()
        };
        let err = store.update_vote(vote.id, &bad, None).await.unwrap_err();
        match err {
            AppError::Validation(errors) => assert_eq!(errors.get("user"), ["must exist"]),
            other => panic!("unexpected error: {other:?}"),
        }

        assert!(store.delete_vote(vote.id).await.unwrap());
        assert!(!store.delete_vote(vote.id).await.unwrap());
        assert!(store.find_vote(vote.id).await.unwrap().is_none());
        assert_eq!(store.ballot_count().await, 0);
    }
}
