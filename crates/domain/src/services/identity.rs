//! Identity collaborator: premium status lookups.

use std::collections::HashSet;
use std::sync::RwLock;

use uuid::Uuid;

use crate::error::RepositoryError;

/// Supplies account flags; the engine never authenticates on its own.
#[async_trait::async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn is_premium(&self, user_id: Uuid) -> Result<bool, RepositoryError>;
}

/// In-process identity provider backed by a set of premium users.
#[derive(Debug, Default)]
pub struct StaticIdentityProvider {
    premium: RwLock<HashSet<Uuid>>,
}

impl StaticIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_premium(users: impl IntoIterator<Item = Uuid>) -> Self {
        Self {
            premium: RwLock::new(users.into_iter().collect()),
        }
    }

    pub fn set_premium(&self, user_id: Uuid, premium: bool) {
        if let Ok(mut set) = self.premium.write() {
            if premium {
                set.insert(user_id);
            } else {
                set.remove(&user_id);
            }
        }
    }
}

#[async_trait::async_trait]
impl IdentityProvider for StaticIdentityProvider {
    async fn is_premium(&self, user_id: Uuid) -> Result<bool, RepositoryError> {
        self.premium
            .read()
            .map(|set| set.contains(&user_id))
            .map_err(|_| RepositoryError::Unavailable("identity lock poisoned".to_string()))
    }
}
