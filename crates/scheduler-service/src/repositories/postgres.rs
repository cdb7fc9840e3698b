//! PostgreSQL meeting store.
//!
//! # Concurrency
//!
//! Guarded writes run in a transaction that first takes a transaction-scoped
//! advisory lock per participant (in sorted order, so two writers never
//! deadlock), then re-reads the candidate bookings and writes only if the
//! conflict check still passes. Status changes are single `UPDATE ... WHERE
//! status = ANY(...)` statements.
//!
//! # Security
//!
//! - All queries use parameterized statements
//! - Meeting messages are never logged

use super::{MeetingStore, WriteOutcome};
use crate::errors::SchedulerError;
use crate::models::{Meeting, MeetingStatus};
use crate::observability::metrics;
use crate::services::conflict::{find_conflicts, ConflictPolicy, ConflictQuery};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::types::{ConferenceId, MeetingId, ProfileId};
use sqlx::postgres::PgRow;
use sqlx::{PgConnection, PgPool, Row};
use std::time::Instant;
use tracing::{debug, instrument};
use uuid::Uuid;

const MEETING_COLUMNS: &str = "meeting_id, conference_id, requester_id, recipient_id, \
     proposed_time, duration_minutes, message, status, created_at, updated_at, start_notified_at";

/// Meeting store backed by a `meetings` table.
#[derive(Debug, Clone)]
pub struct PgMeetingStore {
    pool: PgPool,
}

impl PgMeetingStore {
    /// Create a store over an existing pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn timed<T, F>(operation: &str, fut: F) -> Result<T, SchedulerError>
    where
        F: std::future::Future<Output = Result<T, sqlx::Error>>,
    {
        let start = Instant::now();
        let result = fut.await;
        let status = if result.is_ok() { "success" } else { "error" };
        metrics::record_db_query(operation, status, start.elapsed());
        result.map_err(SchedulerError::from)
    }
}

/// Serialize guarded writers touching any of `participants`.
async fn lock_participants(
    conn: &mut PgConnection,
    participants: &[ProfileId],
) -> Result<(), sqlx::Error> {
    let mut keys: Vec<Uuid> = participants.iter().map(|p| p.0).collect();
    keys.sort();
    keys.dedup();

    for key in keys {
        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1::text, 0))")
            .bind(key)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

async fn fetch_active_near(
    conn: &mut PgConnection,
    conference_id: ConferenceId,
    participants: &[ProfileId],
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> Result<Vec<PgRow>, sqlx::Error> {
    let ids: Vec<Uuid> = participants.iter().map(|p| p.0).collect();
    sqlx::query(&format!(
        r#"
        SELECT {MEETING_COLUMNS}
        FROM meetings
        WHERE conference_id = $1
          AND status IN ('pending', 'accepted')
          AND (requester_id = ANY($2) OR recipient_id = ANY($2))
          AND proposed_time <= $4
          AND proposed_time + make_interval(mins => duration_minutes) >= $3
        ORDER BY proposed_time ASC, created_at ASC
        "#
    ))
    .bind(conference_id.0)
    .bind(ids)
    .bind(from)
    .bind(to)
    .fetch_all(&mut *conn)
    .await
}

async fn guard_conflicts(
    conn: &mut PgConnection,
    policy: ConflictPolicy,
    query: &ConflictQuery,
) -> Result<Result<bool, SchedulerError>, sqlx::Error> {
    lock_participants(conn, &query.participants).await?;

    let (lo, hi) = policy.candidate_range(&query.window);
    let rows = fetch_active_near(conn, query.conference_id, &query.participants, lo, hi).await?;
    let existing = match rows.into_iter().map(map_row_to_meeting).collect::<Result<Vec<_>, _>>() {
        Ok(existing) => existing,
        Err(e) => return Ok(Err(e)),
    };

    Ok(Ok(!find_conflicts(policy, query, &existing).is_empty()))
}

fn statuses(list: &[MeetingStatus]) -> Vec<String> {
    list.iter().map(|s| s.as_str().to_string()).collect()
}

#[async_trait]
impl MeetingStore for PgMeetingStore {
    #[instrument(skip_all, name = "scheduler.repo.insert_unless_conflict", fields(meeting_id = %meeting.id))]
    async fn insert_unless_conflict(
        &self,
        meeting: Meeting,
        policy: ConflictPolicy,
        query: &ConflictQuery,
    ) -> Result<WriteOutcome, SchedulerError> {
        let duration_minutes = i32::try_from(meeting.duration_minutes)
            .map_err(|_| SchedulerError::InvalidDuration("duration out of range".to_string()))?;

        Self::timed("insert_unless_conflict", async {
            let mut tx = self.pool.begin().await?;

            let conflicted = match guard_conflicts(&mut tx, policy, query).await? {
                Ok(conflicted) => conflicted,
                Err(e) => {
                    tx.rollback().await?;
                    return Ok(Err(e));
                }
            };
            if conflicted {
                debug!(target: "scheduler.repository.meetings", "Insert refused: conflicting booking");
                tx.rollback().await?;
                return Ok(Ok(WriteOutcome::Conflict));
            }

            let row = sqlx::query(&format!(
                r#"
                INSERT INTO meetings (
                    meeting_id, conference_id, requester_id, recipient_id,
                    proposed_time, duration_minutes, message, status,
                    created_at, updated_at, start_notified_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
                RETURNING {MEETING_COLUMNS}
                "#
            ))
            .bind(meeting.id.0) // $1
            .bind(meeting.conference_id.0) // $2
            .bind(meeting.requester_id.0) // $3
            .bind(meeting.recipient_id.0) // $4
            .bind(meeting.proposed_time) // $5
            .bind(duration_minutes) // $6
            .bind(meeting.message.as_deref()) // $7
            .bind(meeting.status.as_str()) // $8
            .bind(meeting.created_at) // $9
            .bind(meeting.updated_at) // $10
            .bind(meeting.start_notified_at) // $11
            .fetch_one(&mut *tx)
            .await?;

            tx.commit().await?;
            Ok::<_, sqlx::Error>(map_row_to_meeting(row).map(WriteOutcome::Applied))
        })
        .await?
    }

    #[instrument(skip_all, name = "scheduler.repo.accept_unless_conflict", fields(meeting_id = %meeting_id))]
    async fn accept_unless_conflict(
        &self,
        meeting_id: MeetingId,
        policy: ConflictPolicy,
        query: &ConflictQuery,
        at: DateTime<Utc>,
    ) -> Result<WriteOutcome, SchedulerError> {
        Self::timed("accept_unless_conflict", async {
            let mut tx = self.pool.begin().await?;

            // Participant locks before the row lock, same order as inserts.
            lock_participants(&mut tx, &query.participants).await?;

            let current: Option<String> =
                sqlx::query_scalar("SELECT status FROM meetings WHERE meeting_id = $1 FOR UPDATE")
                    .bind(meeting_id.0)
                    .fetch_optional(&mut *tx)
                    .await?;

            let status = match current.as_deref().map(str::parse::<MeetingStatus>) {
                None => {
                    tx.rollback().await?;
                    return Ok(Ok(WriteOutcome::NotFound));
                }
                Some(Err(e)) => {
                    tx.rollback().await?;
                    return Ok(Err(SchedulerError::Database(e.to_string())));
                }
                Some(Ok(status)) => status,
            };
            if status != MeetingStatus::Pending {
                tx.rollback().await?;
                return Ok(Ok(WriteOutcome::StatusMismatch(status)));
            }

            match guard_conflicts(&mut tx, policy, query).await? {
                Ok(false) => {}
                Ok(true) => {
                    tx.rollback().await?;
                    return Ok(Ok(WriteOutcome::Conflict));
                }
                Err(e) => {
                    tx.rollback().await?;
                    return Ok(Err(e));
                }
            }

            let row = sqlx::query(&format!(
                r#"
                UPDATE meetings
                SET status = 'accepted', updated_at = $2
                WHERE meeting_id = $1
                RETURNING {MEETING_COLUMNS}
                "#
            ))
            .bind(meeting_id.0)
            .bind(at)
            .fetch_one(&mut *tx)
            .await?;

            tx.commit().await?;
            Ok::<_, sqlx::Error>(map_row_to_meeting(row).map(WriteOutcome::Applied))
        })
        .await?
    }

    #[instrument(skip_all, name = "scheduler.repo.transition", fields(meeting_id = %meeting_id, to = %to))]
    async fn transition(
        &self,
        meeting_id: MeetingId,
        from: &[MeetingStatus],
        to: MeetingStatus,
        at: DateTime<Utc>,
    ) -> Result<WriteOutcome, SchedulerError> {
        let row = Self::timed(
            "transition",
            sqlx::query(&format!(
                r#"
                UPDATE meetings
                SET status = $3, updated_at = $4
                WHERE meeting_id = $1 AND status = ANY($2)
                RETURNING {MEETING_COLUMNS}
                "#
            ))
            .bind(meeting_id.0)
            .bind(statuses(from))
            .bind(to.as_str())
            .bind(at)
            .fetch_optional(&self.pool),
        )
        .await?;

        if let Some(row) = row {
            return map_row_to_meeting(row).map(WriteOutcome::Applied);
        }

        // Lost the compare-and-set; report why.
        match self.get(meeting_id).await? {
            Some(current) => Ok(WriteOutcome::StatusMismatch(current.status)),
            None => Ok(WriteOutcome::NotFound),
        }
    }

    #[instrument(skip_all, name = "scheduler.repo.get", fields(meeting_id = %meeting_id))]
    async fn get(&self, meeting_id: MeetingId) -> Result<Option<Meeting>, SchedulerError> {
        let row = Self::timed(
            "get_meeting",
            sqlx::query(&format!(
                "SELECT {MEETING_COLUMNS} FROM meetings WHERE meeting_id = $1"
            ))
            .bind(meeting_id.0)
            .fetch_optional(&self.pool),
        )
        .await?;

        row.map(map_row_to_meeting).transpose()
    }

    #[instrument(skip_all, name = "scheduler.repo.find_active_near", fields(conference_id = %conference_id))]
    async fn find_active_near(
        &self,
        conference_id: ConferenceId,
        participants: &[ProfileId],
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Meeting>, SchedulerError> {
        let rows = Self::timed("find_active_near", async {
            let mut conn = self.pool.acquire().await?;
            fetch_active_near(&mut conn, conference_id, participants, from, to).await
        })
        .await?;

        rows.into_iter().map(map_row_to_meeting).collect()
    }

    #[instrument(skip_all, name = "scheduler.repo.list_for_profile", fields(conference_id = %conference_id, profile_id = %profile))]
    async fn list_for_profile(
        &self,
        conference_id: ConferenceId,
        profile: ProfileId,
        status: Option<MeetingStatus>,
    ) -> Result<Vec<Meeting>, SchedulerError> {
        let rows = Self::timed(
            "list_for_profile",
            sqlx::query(&format!(
                r#"
                SELECT {MEETING_COLUMNS}
                FROM meetings
                WHERE conference_id = $1
                  AND (requester_id = $2 OR recipient_id = $2)
                  AND ($3::text IS NULL OR status = $3)
                ORDER BY proposed_time ASC, created_at ASC
                "#
            ))
            .bind(conference_id.0)
            .bind(profile.0)
            .bind(status.map(|s| s.as_str()))
            .fetch_all(&self.pool),
        )
        .await?;

        rows.into_iter().map(map_row_to_meeting).collect()
    }

    #[instrument(skip_all, name = "scheduler.repo.find_due_for_start")]
    async fn find_due_for_start(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Meeting>, SchedulerError> {
        let rows = Self::timed(
            "find_due_for_start",
            sqlx::query(&format!(
                r#"
                SELECT {MEETING_COLUMNS}
                FROM meetings
                WHERE status = 'accepted'
                  AND start_notified_at IS NULL
                  AND proposed_time BETWEEN $1 AND $2
                ORDER BY proposed_time ASC
                "#
            ))
            .bind(from)
            .bind(to)
            .fetch_all(&self.pool),
        )
        .await?;

        rows.into_iter().map(map_row_to_meeting).collect()
    }

    #[instrument(skip_all, name = "scheduler.repo.claim_start_notification", fields(meeting_id = %meeting_id))]
    async fn claim_start_notification(
        &self,
        meeting_id: MeetingId,
        at: DateTime<Utc>,
    ) -> Result<bool, SchedulerError> {
        let result = Self::timed(
            "claim_start_notification",
            sqlx::query(
                r#"
                UPDATE meetings
                SET start_notified_at = $2
                WHERE meeting_id = $1
                  AND status = 'accepted'
                  AND start_notified_at IS NULL
                "#,
            )
            .bind(meeting_id.0)
            .bind(at)
            .execute(&self.pool),
        )
        .await?;

        Ok(result.rows_affected() == 1)
    }
}

/// Map a database row to a [`Meeting`].
///
/// Shared by every query that selects `MEETING_COLUMNS`.
fn map_row_to_meeting(row: PgRow) -> Result<Meeting, SchedulerError> {
    let status: String = row.try_get("status")?;
    let status = status
        .parse::<MeetingStatus>()
        .map_err(|e| SchedulerError::Database(e.to_string()))?;
    let duration_minutes: i32 = row.try_get("duration_minutes")?;
    let duration_minutes = u32::try_from(duration_minutes)
        .map_err(|_| SchedulerError::Database(format!("invalid duration {}", duration_minutes)))?;

    Ok(Meeting {
        id: MeetingId(row.try_get("meeting_id")?),
        conference_id: ConferenceId(row.try_get("conference_id")?),
        requester_id: ProfileId(row.try_get("requester_id")?),
        recipient_id: ProfileId(row.try_get("recipient_id")?),
        proposed_time: row.try_get("proposed_time")?,
        duration_minutes,
        message: row.try_get("message")?,
        status,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        start_notified_at: row.try_get("start_notified_at")?,
    })
}
