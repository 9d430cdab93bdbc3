use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ballot::BallotState;
use crate::token::AuthToken;

/// A voter. A new one is created for every submitted vote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub created_at: DateTime<Utc>,
}

/// A candidate time slot of an appointment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppointmentTime {
    pub id: Uuid,
    pub appointment_id: Uuid,
    /// Position within the appointment, ballots follow this order
    pub position: i32,
    pub starts_at: DateTime<Utc>,
}

/// An event being scheduled, together with its candidate times
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub title: String,
    pub created_at: DateTime<Utc>,
    /// Candidate times ordered by position
    pub times: Vec<AppointmentTime>,
}

impl Appointment {
    pub fn has_time(&self, time_id: Uuid) -> bool {
        self.times.iter().any(|t| t.id == time_id)
    }
}

/// One yes/no answer for a single candidate time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ballot {
    pub id: Uuid,
    pub appointment_time_id: Uuid,
    pub state: BallotState,
}

/// A user's response to an appointment
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Vote {
    pub id: Uuid,
    pub user: User,
    pub appointment_id: Uuid,
    /// Free-form status text, settable through updates
    pub state: Option<String>,
    #[serde(skip_serializing)]
    pub auth_token: AuthToken,
    /// One ballot per candidate time of the appointment
    pub ballots: Vec<Ballot>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Vote {
    /// Get the ballot cast for a candidate time
    pub fn ballot_for(&self, time_id: Uuid) -> Option<&Ballot> {
        self.ballots.iter().find(|b| b.appointment_time_id == time_id)
    }

    /// Ids of the times answered with "yes"
    pub fn accepted_time_ids(&self) -> Vec<Uuid> {
        self.ballots
            .iter()
            .filter(|b| b.state == BallotState::Yes)
            .map(|b| b.appointment_time_id)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vote_with(states: &[BallotState]) -> Vote {
        let now = Utc::now();
        Vote {
            id: Uuid::new_v4(),
            user: User {
                id: Uuid::new_v4(),
                username: "alice".into(),
                created_at: now,
            },
            appointment_id: Uuid::new_v4(),
            state: None,
            auth_token: AuthToken::generate(),
            ballots: states
                .iter()
                .map(|&state| Ballot {
                    id: Uuid::new_v4(),
                    appointment_time_id: Uuid::new_v4(),
                    state,
                })
                .collect(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_accepted_time_ids() {
        let vote = vote_with(&[BallotState::Yes, BallotState::No, BallotState::Yes]);
        let accepted = vote.accepted_time_ids();
        assert_eq!(
            accepted,
            vec![vote.ballots[0].appointment_time_id, vote.ballots[2].appointment_time_id]
        );
        assert_eq!(
            vote.ballot_for(vote.ballots[1].appointment_time_id).map(|b| b.state),
            Some(BallotState::No)
        );
        assert!(vote.ballot_for(Uuid::new_v4()).is_none());
    }

    #[test]
    fn test_token_not_serialized() {
        let vote = vote_with(&[]);
        let json = serde_json::to_value(&vote).unwrap();
        assert!(json.get("auth_token").is_none());
        assert_eq!(json["user"]["username"], "alice");
    }
}
