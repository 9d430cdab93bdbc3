use async_trait::async_trait;
use datepoll_core::{Appointment, Ballot, FieldErrors, NewBallot, Vote};
use sqlx::{postgres::PgPoolOptions, PgPool, Postgres, Transaction};
use std::collections::HashMap;
use uuid::Uuid;

use super::models::{AppointmentRow, AppointmentTimeRow, BallotRow, VoteRow};
use super::{NewAppointment, NewVote, VoteChanges, VoteStore};
use crate::error::AppError;

const FOREIGN_KEY_VIOLATION: &str = "23503";

const VOTE_SELECT: &str = r#"
    SELECT v.id, v.appointment_id, v.state, v.auth_token, v.created_at, v.updated_at,
           u.id AS user_id, u.username, u.created_at AS user_created_at
    FROM appointment_votes v
    JOIN users u ON u.id = v.user_id
"#;

const BALLOT_SELECT: &str = r#"
    SELECT b.id, b.appointment_vote_id, b.appointment_time_id, b.state
    FROM appointment_time_votes b
    JOIN appointment_times t ON t.id = b.appointment_time_id
"#;

/// Postgres-backed store
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Connect to the database
    pub async fn connect(database_url: &str, max_connections: u32) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        Ok(Self { pool })
    }

    /// Wrap an existing pool
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run database migrations
    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    async fn ballots_for(&self, vote_ids: &[Uuid]) -> Result<HashMap<Uuid, Vec<Ballot>>, AppError> {
        let rows = sqlx::query_as::<_, BallotRow>(&format!(
            "{BALLOT_SELECT} WHERE b.appointment_vote_id = ANY($1) ORDER BY t.position, t.id"
        ))
        .bind(vote_ids)
        .fetch_all(&self.pool)
        .await?;

        let mut grouped: HashMap<Uuid, Vec<Ballot>> = HashMap::new();
        for row in rows {
            let vote_id = row.appointment_vote_id;
            grouped.entry(vote_id).or_default().push(row.try_into()?);
        }
        Ok(grouped)
    }

    async fn insert_ballots(
        tx: &mut Transaction<'_, Postgres>,
        vote_id: Uuid,
        ballots: &[NewBallot],
    ) -> Result<(), AppError> {
        for ballot in ballots {
            sqlx::query(
                "INSERT INTO appointment_time_votes (id, appointment_vote_id, appointment_time_id, state) \
                 VALUES ($1, $2, $3, $4)",
            )
            .bind(Uuid::new_v4())
            .bind(vote_id)
            .bind(ballot.appointment_time_id)
            .bind(ballot.state.as_str())
            .execute(&mut **tx)
            .await?;
        }
        Ok(())
    }
}

fn foreign_key_constraint(err: &sqlx::Error) -> Option<String> {
    let db_err = err.as_database_error()?;
    if db_err.code().as_deref() != Some(FOREIGN_KEY_VIOLATION) {
        return None;
    }
    Some(db_err.constraint().unwrap_or_default().to_string())
}

#[async_trait]
impl VoteStore for Database {
    async fn ping(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn create_appointment(&self, new: &NewAppointment) -> Result<Appointment, AppError> {
        let mut tx = self.pool.begin().await?;

        let appointment = sqlx::query_as::<_, AppointmentRow>(
            r#"INSERT INTO appointments (id, title) VALUES ($1, $2) RETURNING id, title, created_at"#,
        )
        .bind(Uuid::new_v4())
        .bind(&new.title)
        .fetch_one(&mut *tx)
        .await?;

        let mut times = Vec::with_capacity(new.starts_at.len());
        for (position, starts_at) in new.starts_at.iter().enumerate() {
            let time = sqlx::query_as::<_, AppointmentTimeRow>(
                r#"INSERT INTO appointment_times (id, appointment_id, position, starts_at)
                   VALUES ($1, $2, $3, $4)
                   RETURNING id, appointment_id, position, starts_at"#,
            )
            .bind(Uuid::new_v4())
            .bind(appointment.id)
            .bind(position as i32)
            .bind(starts_at)
            .fetch_one(&mut *tx)
            .await?;
            times.push(time);
        }

        tx.commit().await?;
        Ok(appointment.into_appointment(times))
    }

    async fn find_appointment(&self, id: Uuid) -> Result<Option<Appointment>, AppError> {
        let appointment = sqlx::query_as::<_, AppointmentRow>(
            r#"SELECT id, title, created_at FROM appointments WHERE id = $1"#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(appointment) = appointment else {
            return Ok(None);
        };

        let times = sqlx::query_as::<_, AppointmentTimeRow>(
            r#"SELECT id, appointment_id, position, starts_at FROM appointment_times
               WHERE appointment_id = $1 ORDER BY position, id"#,
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(appointment.into_appointment(times)))
    }

    async fn user_exists(&self, id: Uuid) -> Result<bool, AppError> {
        let exists: (bool,) = sqlx::query_as("SELECT EXISTS (SELECT 1 FROM users WHERE id = $1)")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(exists.0)
    }

    async fn list_votes(&self) -> Result<Vec<Vote>, AppError> {
        let rows = sqlx::query_as::<_, VoteRow>(&format!("{VOTE_SELECT} ORDER BY v.created_at, v.id"))
            .fetch_all(&self.pool)
            .await?;

        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let mut ballots = self.ballots_for(&ids).await?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let vote_ballots = ballots.remove(&row.id).unwrap_or_default();
                row.into_vote(vote_ballots)
            })
            .collect())
    }

    async fn find_vote(&self, id: Uuid) -> Result<Option<Vote>, AppError> {
        let row = sqlx::query_as::<_, VoteRow>(&format!("{VOTE_SELECT} WHERE v.id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let ballots = self.ballots_for(&[id]).await?.remove(&id).unwrap_or_default();
                Ok(Some(row.into_vote(ballots)))
            }
            None => Ok(None),
        }
    }

    async fn insert_vote(&self, new: &NewVote) -> Result<Vote, AppError> {
        let vote_id = Uuid::new_v4();
        let mut tx = self.pool.begin().await?;

        let user_id: (Uuid,) =
            sqlx::query_as("INSERT INTO users (id, username) VALUES ($1, $2) RETURNING id")
                .bind(Uuid::new_v4())
                .bind(&new.username)
                .fetch_one(&mut *tx)
                .await?;

        let inserted = sqlx::query(
            "INSERT INTO appointment_votes (id, user_id, appointment_id, auth_token) \
             VALUES ($1, $2, $3, $4)",
        )
        .bind(vote_id)
        .bind(user_id.0)
        .bind(new.appointment_id)
        .bind(new.auth_token.as_str())
        .execute(&mut *tx)
        .await;

        // The appointment may vanish between lookup and insert
        if let Err(err) = inserted {
            if foreign_key_constraint(&err).is_some() {
                return Err(AppError::NotFound(format!(
                    "Appointment {} not found",
                    new.appointment_id
                )));
            }
            return Err(err.into());
        }

        Self::insert_ballots(&mut tx, vote_id, &new.ballots).await?;
        tx.commit().await?;

        self.find_vote(vote_id)
            .await?
            .ok_or_else(|| AppError::Internal(format!("vote {vote_id} missing after insert")))
    }

    async fn update_vote(
        &self,
        id: Uuid,
        changes: &VoteChanges,
        ballots: Option<&[NewBallot]>,
    ) -> Result<Option<Vote>, AppError> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            r#"UPDATE appointment_votes SET
                   state = COALESCE($2, state),
                   appointment_id = COALESCE($3, appointment_id),
                   user_id = COALESCE($4, user_id),
                   updated_at = NOW()
               WHERE id = $1"#,
        )
        .bind(id)
        .bind(&changes.state)
        .bind(changes.appointment_id)
        .bind(changes.user_id)
        .execute(&mut *tx)
        .await;

        let updated = match updated {
            Ok(result) => result,
            Err(err) => {
                return Err(match foreign_key_constraint(&err) {
                    Some(constraint) if constraint.contains("user_id") => {
                        FieldErrors::single("user", "must exist").into()
                    }
                    Some(_) => FieldErrors::single("appointment", "must exist").into(),
                    None => err.into(),
                });
            }
        };

        if updated.rows_affected() == 0 {
            return Ok(None);
        }

        if let Some(ballots) = ballots {
            sqlx::query("DELETE FROM appointment_time_votes WHERE appointment_vote_id = $1")
                .bind(id)
                .execute(&mut *tx)
                .await?;
            Self::insert_ballots(&mut tx, id, ballots).await?;
        }

        tx.commit().await?;
        self.find_vote(id).await
    }

    async fn delete_vote(&self, id: Uuid) -> Result<bool, AppError> {
        // Ballots go with the vote through ON DELETE CASCADE
        let result = sqlx::query("DELETE FROM appointment_votes WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
