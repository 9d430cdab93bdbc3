use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::model::AppointmentTime;

/// Answer given for a single candidate time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BallotState {
    Yes,
    No,
}

impl BallotState {
    pub fn as_str(&self) -> &'static str {
        match self {
            BallotState::Yes => "yes",
            BallotState::No => "no",
        }
    }

    /// `Yes` when `selected`, `No` otherwise
    pub fn from_selection(selected: bool) -> Self {
        if selected {
            BallotState::Yes
        } else {
            BallotState::No
        }
    }
}

impl fmt::Display for BallotState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BallotState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "yes" => Ok(BallotState::Yes),
            "no" => Ok(BallotState::No),
            other => Err(format!("unknown ballot state: {other}")),
        }
    }
}

/// A ballot that has not been persisted yet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBallot {
    pub appointment_time_id: Uuid,
    pub state: BallotState,
}

/// Expand a selection into one ballot per candidate time.
///
/// The output follows the order of `times`. Selected ids that are not among
/// `times` have no effect.
pub fn fan_out(times: &[AppointmentTime], selected: &HashSet<Uuid>) -> Vec<NewBallot> {
    times
        .iter()
        .map(|time| NewBallot {
            appointment_time_id: time.id,
            state: BallotState::from_selection(selected.contains(&time.id)),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn slots(appointment_id: Uuid, n: usize) -> Vec<AppointmentTime> {
        (0..n)
            .map(|i| AppointmentTime {
                id: Uuid::new_v4(),
                appointment_id,
                position: i as i32,
                starts_at: Utc.with_ymd_and_hms(2025, 3, 1 + i as u32, 18, 0, 0).unwrap(),
            })
            .collect()
    }

    #[test]
    fn test_fan_out_marks_selected_times() {
        let times = slots(Uuid::new_v4(), 3);
        let selected: HashSet<Uuid> = [times[0].id, times[2].id].into_iter().collect();

        let ballots = fan_out(&times, &selected);

        let states: Vec<_> = ballots.iter().map(|b| b.state).collect();
        assert_eq!(states, vec![BallotState::Yes, BallotState::No, BallotState::Yes]);
        let ids: Vec<_> = ballots.iter().map(|b| b.appointment_time_id).collect();
        let expected: Vec<_> = times.iter().map(|t| t.id).collect();
        assert_eq!(ids, expected);
    }

    #[test]
    fn test_fan_out_ignores_foreign_ids() {
        let times = slots(Uuid::new_v4(), 2);
        let selected: HashSet<Uuid> = [Uuid::new_v4(), Uuid::new_v4()].into_iter().collect();

        let ballots = fan_out(&times, &selected);

        assert_eq!(ballots.len(), 2);
        assert!(ballots.iter().all(|b| b.state == BallotState::No));
    }

    #[test]
    fn test_fan_out_covers_every_time_once() {
        let times = slots(Uuid::new_v4(), 7);
        let ballots = fan_out(&times, &HashSet::new());

        let unique: HashSet<_> = ballots.iter().map(|b| b.appointment_time_id).collect();
        assert_eq!(ballots.len(), times.len());
        assert_eq!(unique.len(), times.len());
    }

    #[test]
    fn test_fan_out_without_times() {
        let selected: HashSet<Uuid> = [Uuid::new_v4()].into_iter().collect();
        assert!(fan_out(&[], &selected).is_empty());
    }

    #[test]
    fn test_state_parsing() {
        assert_eq!("yes".parse::<BallotState>(), Ok(BallotState::Yes));
        assert_eq!("no".parse::<BallotState>(), Ok(BallotState::No));
        assert!("maybe".parse::<BallotState>().is_err());
        assert_eq!(BallotState::Yes.to_string(), "yes");
        assert_eq!(serde_json::to_string(&BallotState::No).unwrap(), "\"no\"");
    }
}
