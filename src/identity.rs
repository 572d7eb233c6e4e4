//! Identity and role resolution. Roles are looked up per call so the
//! answer always reflects current database state.
use super::error::LifecycleError;
use super::store::Gateway;
use std::collections::HashSet;

pub const QUALITY_MANAGER: &str = "Quality Manager";

#[derive(Debug, Clone)]
pub struct UserIdentity {
    pub user_id: u64,
    pub active: bool,
    pub roles: HashSet<String>,
}

impl UserIdentity {
    pub fn holds(&self, role: &str) -> bool {
        self.roles.contains(role)
    }

    pub fn is_quality_manager(&self) -> bool {
        self.holds(QUALITY_MANAGER)
    }
}

/// Resolve a user name to its id, active flag and role set
pub fn resolve(gateway: &Gateway, user_name: &str) -> anyhow::Result<UserIdentity> {
    let user = gateway
        .user_by_name(user_name)?
        .ok_or_else(|| LifecycleError::UserNotFound(user_name.to_string()))?;
    let roles = gateway.roles_of(user.user_id)?;
    Ok(UserIdentity {
        user_id: user.user_id,
        active: user.active,
        roles,
    })
}
