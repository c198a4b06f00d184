// SPDX-FileCopyrightText: 2026 Twinlink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Durable per-user notifications.

use rusqlite::{Row, params};
use twinlink_core::TwinlinkError;
use twinlink_core::types::{Notification, Page};

use crate::database::{Database, map_tr_err};
use crate::rows::{json_col, to_json};

const NOTIFICATION_COLUMNS: &str =
    "id, user_id, type, title, content, data, is_read, read_at, created_at";

fn notification_from_row(row: &Row<'_>) -> rusqlite::Result<Notification> {
    Ok(Notification {
        id: row.get(0)?,
        user_id: row.get(1)?,
        kind: row.get(2)?,
        title: row.get(3)?,
        content: row.get(4)?,
        data: json_col(row, 5)?,
        is_read: row.get(6)?,
        read_at: row.get(7)?,
        created_at: row.get(8)?,
    })
}

pub async fn insert_notification(
    db: &Database,
    notification: &Notification,
) -> Result<(), TwinlinkError> {
    let n = notification.clone();
    db.connection()
        .call(move |conn| {
            let data = to_json(&n.data)?;
            conn.execute(
                "INSERT INTO notifications (id, user_id, type, title, content, data, is_read,
                                            read_at, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    n.id,
                    n.user_id,
                    n.kind,
                    n.title,
                    n.content,
                    data,
                    n.is_read,
                    n.read_at,
                    n.created_at,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Newest first.
pub async fn list_notifications(
    db: &Database,
    user_id: &str,
    unread_only: bool,
    page: Page,
) -> Result<Vec<Notification>, TwinlinkError> {
    let user_id = user_id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {NOTIFICATION_COLUMNS} FROM notifications
                 WHERE user_id = ?1 AND (?2 = 0 OR is_read = 0)
                 ORDER BY created_at DESC, rowid DESC
                 LIMIT ?3 OFFSET ?4"
            ))?;
            let rows = stmt.query_map(
                params![user_id, unread_only, page.limit, page.offset],
                notification_from_row,
            )?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

pub async fn unread_notification_count(db: &Database, user_id: &str) -> Result<i64, TwinlinkError> {
    let user_id = user_id.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM notifications WHERE user_id = ?1 AND is_read = 0",
                params![user_id],
                |row| row.get(0),
            )
        })
        .await
        .map_err(map_tr_err)
}

/// Returns false when the notification does not belong to `user_id`.
pub async fn mark_notification_read(
    db: &Database,
    user_id: &str,
    notification_id: &str,
    at: &str,
) -> Result<bool, TwinlinkError> {
    let user_id = user_id.to_string();
    let notification_id = notification_id.to_string();
    let at = at.to_string();
    db.connection()
        .call(move |conn| {
            let changed = conn.execute(
                "UPDATE notifications SET is_read = 1, read_at = COALESCE(read_at, ?3)
                 WHERE id = ?2 AND user_id = ?1",
                params![user_id, notification_id, at],
            )?;
            Ok(changed == 1)
        })
        .await
        .map_err(map_tr_err)
}

pub async fn mark_all_notifications_read(
    db: &Database,
    user_id: &str,
    at: &str,
) -> Result<usize, TwinlinkError> {
    let user_id = user_id.to_string();
    let at = at.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE notifications SET is_read = 1, read_at = ?2
                 WHERE user_id = ?1 AND is_read = 0",
                params![user_id, at],
            )
        })
        .await
        .map_err(map_tr_err)
}

/// Delete read notifications created before `older_than`.
pub async fn purge_read_notifications(
    db: &Database,
    older_than: &str,
) -> Result<usize, TwinlinkError> {
    let older_than = older_than.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "DELETE FROM notifications WHERE is_read = 1 AND created_at < ?1",
                params![older_than],
            )
        })
        .await
        .map_err(map_tr_err)
}
