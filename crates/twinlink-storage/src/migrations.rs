// SPDX-FileCopyrightText: 2026 Twinlink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Embedded schema migrations.
//!
//! SQL files under `migrations/` are compiled in with refinery and applied
//! every time a [`Database`](crate::Database) is opened.

use twinlink_core::TwinlinkError;

mod embedded {
    use refinery::embed_migrations;
    embed_migrations!("migrations");
}

/// Apply all pending migrations. Applied versions are tracked in
/// `refinery_schema_history`.
pub fn run_migrations(conn: &mut rusqlite::Connection) -> Result<(), TwinlinkError> {
    let report = embedded::migrations::runner()
        .run(conn)
        .map_err(|e| TwinlinkError::Storage {
            source: Box::new(e),
        })?;
    for migration in report.applied_migrations() {
        tracing::info!(
            version = migration.version(),
            name = %migration.name(),
            "applied migration"
        );
    }
    Ok(())
}
