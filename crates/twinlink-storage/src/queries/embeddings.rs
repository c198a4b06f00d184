// SPDX-FileCopyrightText: 2026 Twinlink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Embedding storage with supersession history.

use rusqlite::{OptionalExtension, Row, params};
use twinlink_core::TwinlinkError;
use twinlink_core::types::{AGENT_ENTITY, Embedding};

use crate::database::{Database, map_tr_err};
use crate::rows::{blob_to_vec, vec_to_blob};

const EMBEDDING_COLUMNS: &str =
    "id, entity_type, entity_id, vector, model, is_current, superseded_by, created_at";

fn embedding_from_row(row: &Row<'_>) -> rusqlite::Result<Embedding> {
    let blob: Vec<u8> = row.get(3)?;
    Ok(Embedding {
        id: row.get(0)?,
        entity_type: row.get(1)?,
        entity_id: row.get(2)?,
        vector: blob_to_vec(&blob),
        model: row.get(4)?,
        is_current: row.get(5)?,
        superseded_by: row.get(6)?,
        created_at: row.get(7)?,
    })
}

/// Store `embedding` as current and point the previous current row at it.
pub async fn save_embedding(db: &Database, embedding: &Embedding) -> Result<(), TwinlinkError> {
    let embedding = embedding.clone();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let previous: Option<String> = tx
                .query_row(
                    "SELECT id FROM embeddings
                     WHERE entity_type = ?1 AND entity_id = ?2 AND is_current = 1",
                    params![embedding.entity_type, embedding.entity_id],
                    |row| row.get(0),
                )
                .optional()?;
            if let Some(previous) = &previous {
                tx.execute(
                    "UPDATE embeddings SET is_current = 0 WHERE id = ?1",
                    params![previous],
                )?;
            }
            tx.execute(
                "INSERT INTO embeddings (id, entity_type, entity_id, vector, dimensions, model,
                                         is_current, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1, ?7)",
                params![
                    embedding.id,
                    embedding.entity_type,
                    embedding.entity_id,
                    vec_to_blob(&embedding.vector),
                    embedding.vector.len() as i64,
                    embedding.model,
                    embedding.created_at,
                ],
            )?;
            if let Some(previous) = &previous {
                tx.execute(
                    "UPDATE embeddings SET superseded_by = ?2 WHERE id = ?1",
                    params![previous, embedding.id],
                )?;
            }
            tx.commit()
        })
        .await
        .map_err(map_tr_err)
}

pub async fn current_embedding(
    db: &Database,
    entity_type: &str,
    entity_id: &str,
) -> Result<Option<Embedding>, TwinlinkError> {
    let entity_type = entity_type.to_string();
    let entity_id = entity_id.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                &format!(
                    "SELECT {EMBEDDING_COLUMNS} FROM embeddings
                     WHERE entity_type = ?1 AND entity_id = ?2 AND is_current = 1"
                ),
                params![entity_type, entity_id],
                embedding_from_row,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// Current agent vectors that may be proposed as match candidates: the
/// agent is active and its owner is active and discoverable.
pub async fn discoverable_agent_embeddings(
    db: &Database,
) -> Result<Vec<Embedding>, TwinlinkError> {
    db.connection()
        .call(|conn| {
            let mut stmt = conn.prepare(
                "SELECT e.id, e.entity_type, e.entity_id, e.vector, e.model, e.is_current,
                        e.superseded_by, e.created_at
                 FROM embeddings e
                 JOIN agents a ON a.id = e.entity_id
                 JOIN users u ON u.id = a.user_id
                 WHERE e.entity_type = ?1 AND e.is_current = 1
                   AND a.is_active = 1 AND u.is_active = 1 AND u.discoverable = 1
                 ORDER BY e.entity_id",
            )?;
            let rows = stmt.query_map(params![AGENT_ENTITY], embedding_from_row)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

pub async fn embedding_history(
    db: &Database,
    entity_type: &str,
    entity_id: &str,
) -> Result<Vec<Embedding>, TwinlinkError> {
    let entity_type = entity_type.to_string();
    let entity_id = entity_id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {EMBEDDING_COLUMNS} FROM embeddings
                 WHERE entity_type = ?1 AND entity_id = ?2
                 ORDER BY is_current DESC, created_at DESC, rowid DESC"
            ))?;
            let rows = stmt.query_map(params![entity_type, entity_id], embedding_from_row)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}
