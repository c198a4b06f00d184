// SPDX-FileCopyrightText: 2026 Twinlink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Durable background job queue with leases.

use rusqlite::{Connection, OptionalExtension, Row, params};
use twinlink_core::TwinlinkError;
use twinlink_core::types::{BackgroundJob, JobStatus};

use crate::database::{Database, map_tr_err};
use crate::rows::{json_col, not_found, opt_json_col, parse_col, to_json};

const JOB_COLUMNS: &str = "id, kind, payload, owner_user_id, status, progress, retry_count, \
                           max_retries, result, error, next_run_at, locked_until, started_at, \
                           completed_at, created_at, updated_at";

fn job_from_row(row: &Row<'_>) -> rusqlite::Result<BackgroundJob> {
    Ok(BackgroundJob {
        id: row.get(0)?,
        kind: row.get(1)?,
        payload: json_col(row, 2)?,
        owner_user_id: row.get(3)?,
        status: parse_col(row, 4)?,
        progress: row.get(5)?,
        retry_count: row.get(6)?,
        max_retries: row.get(7)?,
        result: opt_json_col(row, 8)?,
        error: row.get(9)?,
        next_run_at: row.get(10)?,
        locked_until: row.get(11)?,
        started_at: row.get(12)?,
        completed_at: row.get(13)?,
        created_at: row.get(14)?,
        updated_at: row.get(15)?,
    })
}

fn select_job(conn: &Connection, id: &str) -> rusqlite::Result<Option<BackgroundJob>> {
    conn.query_row(
        &format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?1"),
        params![id],
        job_from_row,
    )
    .optional()
}

pub async fn insert_job(db: &Database, job: &BackgroundJob) -> Result<(), TwinlinkError> {
    let job = job.clone();
    db.connection()
        .call(move |conn| {
            let payload = to_json(&job.payload)?;
            conn.execute(
                "INSERT INTO jobs (id, kind, payload, owner_user_id, status, progress,
                                   retry_count, max_retries, next_run_at, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, 0, 0, ?6, ?7, ?8, ?8)",
                params![
                    job.id,
                    job.kind,
                    payload,
                    job.owner_user_id,
                    job.status.to_string(),
                    job.max_retries,
                    job.next_run_at,
                    job.created_at,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Lease the oldest runnable job until `lease_until`.
///
/// Runs whose lease lapsed (the worker died mid-attempt) and that still
/// have retries left are first turned into a retry. Lapsed runs without
/// retries stay running for [`claim_expired_job`].
pub async fn claim_next_job(
    db: &Database,
    now: &str,
    lease_until: &str,
) -> Result<Option<BackgroundJob>, TwinlinkError> {
    let now = now.to_string();
    let lease_until = lease_until.to_string();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "UPDATE jobs SET status = 'retrying', retry_count = retry_count + 1,
                 error = 'lease expired', locked_until = NULL, next_run_at = ?1, updated_at = ?1
                 WHERE status = 'running' AND locked_until <= ?1 AND retry_count < max_retries",
                params![now],
            )?;

            let next: Option<String> = tx
                .query_row(
                    "SELECT id FROM jobs
                     WHERE status IN ('pending', 'retrying') AND next_run_at <= ?1
                     ORDER BY next_run_at, created_at, id
                     LIMIT 1",
                    params![now],
                    |row| row.get(0),
                )
                .optional()?;
            let Some(id) = next else {
                tx.commit()?;
                return Ok(None);
            };
            tx.execute(
                "UPDATE jobs SET status = 'running', locked_until = ?2,
                 started_at = COALESCE(started_at, ?1), updated_at = ?1
                 WHERE id = ?3",
                params![now, lease_until, id],
            )?;
            let claimed = select_job(&tx, &id)?;
            tx.commit()?;
            Ok(claimed)
        })
        .await
        .map_err(map_tr_err)
}

/// Lease one running job whose lease lapsed with no retries left, so the
/// caller can fail it through the job's exhaustion path.
pub async fn claim_expired_job(
    db: &Database,
    now: &str,
    lease_until: &str,
) -> Result<Option<BackgroundJob>, TwinlinkError> {
    let now = now.to_string();
    let lease_until = lease_until.to_string();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let expired: Option<String> = tx
                .query_row(
                    "SELECT id FROM jobs
                     WHERE status = 'running' AND locked_until <= ?1
                       AND retry_count >= max_retries
                     ORDER BY locked_until, id
                     LIMIT 1",
                    params![now],
                    |row| row.get(0),
                )
                .optional()?;
            let Some(id) = expired else {
                tx.commit()?;
                return Ok(None);
            };
            tx.execute(
                "UPDATE jobs SET locked_until = ?2, error = 'lease expired', updated_at = ?1
                 WHERE id = ?3",
                params![now, lease_until, id],
            )?;
            let claimed = select_job(&tx, &id)?;
            tx.commit()?;
            Ok(claimed)
        })
        .await
        .map_err(map_tr_err)
}

pub async fn update_job_progress(
    db: &Database,
    job_id: &str,
    progress: u8,
) -> Result<(), TwinlinkError> {
    let job_id = job_id.to_string();
    let progress = progress.min(100);
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE jobs SET progress = ?2,
                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?1 AND status = 'running'",
                params![job_id, progress],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

pub async fn complete_job(
    db: &Database,
    job_id: &str,
    result: &serde_json::Value,
    at: &str,
) -> Result<(), TwinlinkError> {
    let job_id = job_id.to_string();
    let result = result.clone();
    let at = at.to_string();
    db.connection()
        .call(move |conn| {
            let result = to_json(&result)?;
            conn.execute(
                "UPDATE jobs SET status = 'completed', progress = 100, result = ?2, error = NULL,
                 locked_until = NULL, completed_at = ?3, updated_at = ?3
                 WHERE id = ?1",
                params![job_id, result, at],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Record a failed attempt and return the job's new state.
pub async fn fail_job(
    db: &Database,
    job_id: &str,
    error: &str,
    retry_at: Option<&str>,
    at: &str,
) -> Result<BackgroundJob, TwinlinkError> {
    let job_id = job_id.to_string();
    let error = error.to_string();
    let retry_at = retry_at.map(str::to_string);
    let at = at.to_string();
    db.connection()
        .call(move |conn| -> Result<Result<BackgroundJob, TwinlinkError>, rusqlite::Error> {
            let tx = conn.transaction()?;
            let Some(job) = select_job(&tx, &job_id)? else {
                return Ok(Err(not_found("job", &job_id)));
            };
            match retry_at {
                Some(retry_at) if !job.retries_exhausted() => tx.execute(
                    "UPDATE jobs SET status = 'retrying', retry_count = retry_count + 1,
                     error = ?2, next_run_at = ?3, locked_until = NULL, updated_at = ?4
                     WHERE id = ?1",
                    params![job_id, error, retry_at, at],
                )?,
                _ => tx.execute(
                    "UPDATE jobs SET status = 'failed', error = ?2, locked_until = NULL,
                     completed_at = ?3, updated_at = ?3
                     WHERE id = ?1",
                    params![job_id, error, at],
                )?,
            };
            let updated = select_job(&tx, &job_id)?;
            tx.commit()?;
            Ok(updated.ok_or_else(|| not_found("job", &job_id)))
        })
        .await
        .map_err(map_tr_err)?
}

pub async fn get_job(db: &Database, job_id: &str) -> Result<Option<BackgroundJob>, TwinlinkError> {
    let job_id = job_id.to_string();
    db.connection()
        .call(move |conn| select_job(conn, &job_id))
        .await
        .map_err(map_tr_err)
}

/// Newest first, optionally filtered by owner and status.
pub async fn list_jobs(
    db: &Database,
    owner_user_id: Option<&str>,
    status: Option<JobStatus>,
    limit: i64,
) -> Result<Vec<BackgroundJob>, TwinlinkError> {
    let owner = owner_user_id.map(str::to_string);
    let status = status.map(|s| s.to_string());
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {JOB_COLUMNS} FROM jobs
                 WHERE (?1 IS NULL OR owner_user_id = ?1) AND (?2 IS NULL OR status = ?2)
                 ORDER BY created_at DESC, id
                 LIMIT ?3"
            ))?;
            let rows = stmt.query_map(params![owner, status, limit], job_from_row)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}
