//! User lifecycle operations that span the registry and the user table.

use std::sync::Arc;

use crate::db::StoreError;
use crate::models::UserId;
use crate::registry::GroupRegistry;

pub struct AccountService {
    registry: Arc<GroupRegistry>,
}

impl AccountService {
    pub fn new(registry: Arc<GroupRegistry>) -> Self {
        Self { registry }
    }

    /// Removes the user from its group and deletes the account.
    ///
    /// Both happen in one registry transition; a join racing the deletion
    /// cannot leave the deleted user behind as a member.
    pub async fn delete_user(&self, user_id: UserId) -> Result<(), StoreError> {
        match self.registry.remove_user(user_id).await? {
            Some(group) => tracing::info!("Deleted user {} (left '{}')", user_id, group.name),
            None => tracing::info!("Deleted user {}", user_id),
        }
        Ok(())
    }
}
