use async_trait::async_trait;
use sqlx::{Sqlite, SqlitePool, Transaction};
use std::collections::{BTreeMap, BTreeSet};

use super::StoreError;
use crate::models::{Group, UserId};
use crate::registry::{GroupChange, GroupStore};

/// Groups in `listening_groups`, membership in `users.group_name`.
pub struct GroupRepository {
    pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
struct GroupRow {
    name: String,
    leader_id: i64,
}

#[derive(sqlx::FromRow)]
struct MemberRow {
    id: i64,
    group_name: String,
}

impl GroupRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn apply_one(
        tx: &mut Transaction<'_, Sqlite>,
        change: &GroupChange,
    ) -> Result<(), StoreError> {
        match change {
            // Members are written through their Assign changes
            GroupChange::Upsert(group) => {
                sqlx::query(
                    r#"
                    INSERT INTO listening_groups (name, leader_id) VALUES (?, ?)
                    ON CONFLICT(name) DO UPDATE SET leader_id = excluded.leader_id
                    "#,
                )
                .bind(&group.name)
                .bind(group.leader_id.0)
                .execute(&mut **tx)
                .await?;
            }
            GroupChange::Remove(name) => {
                sqlx::query("DELETE FROM listening_groups WHERE name = ?")
                    .bind(name)
                    .execute(&mut **tx)
                    .await?;
                sqlx::query("UPDATE users SET group_name = NULL WHERE group_name = ?")
                    .bind(name)
                    .execute(&mut **tx)
                    .await?;
            }
            GroupChange::Assign {
                user_id,
                group_name,
            } => {
                let result = sqlx::query("UPDATE users SET group_name = ? WHERE id = ?")
                    .bind(group_name)
                    .bind(user_id.0)
                    .execute(&mut **tx)
                    .await?;
                if result.rows_affected() == 0 {
                    return Err(StoreError::NotFound(format!("user {}", user_id)));
                }
            }
            GroupChange::DeleteUser(user_id) => {
                let result = sqlx::query("DELETE FROM users WHERE id = ?")
                    .bind(user_id.0)
                    .execute(&mut **tx)
                    .await?;
                if result.rows_affected() == 0 {
                    return Err(StoreError::NotFound(format!("user {}", user_id)));
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl GroupStore for GroupRepository {
    async fn load_all(&self) -> Result<Vec<Group>, StoreError> {
        let groups: Vec<GroupRow> =
            sqlx::query_as("SELECT name, leader_id FROM listening_groups ORDER BY name")
                .fetch_all(&self.pool)
                .await?;
        let members: Vec<MemberRow> = sqlx::query_as(
            "SELECT id, group_name FROM users WHERE group_name IS NOT NULL ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut by_group: BTreeMap<String, BTreeSet<UserId>> = BTreeMap::new();
        for member in members {
            by_group
                .entry(member.group_name)
                .or_default()
                .insert(UserId(member.id));
        }

        let mut loaded = Vec::with_capacity(groups.len());
        for row in groups {
            let members = by_group.remove(&row.name).unwrap_or_default();
            loaded.push(Group {
                name: row.name,
                leader_id: UserId(row.leader_id),
                members,
            });
        }

        for (name, members) in by_group {
            tracing::warn!(
                "{} user(s) reference missing group '{}', ignoring",
                members.len(),
                name
            );
        }

        Ok(loaded)
    }

    async fn apply(&self, changes: &[GroupChange]) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        for change in changes {
            Self::apply_one(&mut tx, change).await?;
        }
        tx.commit().await?;
        Ok(())
    }
}
