pub mod ballot;
pub mod error;
pub mod model;
pub mod token;

pub use ballot::{fan_out, BallotState, NewBallot};
pub use error::FieldErrors;
pub use model::{Appointment, AppointmentTime, Ballot, User, Vote};
pub use token::AuthToken;
