// SPDX-FileCopyrightText: 2026 Twinlink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed query modules. Each function takes a [`Database`](crate::Database)
//! and runs on its background thread.

pub mod conversations;
pub mod embeddings;
pub mod jobs;
pub mod matches;
pub mod notifications;
pub mod profiles;

#[cfg(test)]
pub(crate) mod test_support {
    pub use crate::testing::{agent, user};

    use crate::database::Database;
    use crate::queries::profiles::create_user;

    /// In-memory database with the given users.
    pub async fn seeded_db(users: &[&str]) -> Database {
        let db = Database::open_in_memory().await.unwrap();
        for id in users {
            create_user(&db, &user(id)).await.unwrap();
        }
        db
    }
}
