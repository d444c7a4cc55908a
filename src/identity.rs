use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::LifecycleError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "user_role", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Responsible,
    Drafter,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Responsible => "responsible",
            Role::Drafter => "drafter",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = LifecycleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "responsible" => Ok(Role::Responsible),
            "drafter" => Ok(Role::Drafter),
            other => Err(LifecycleError::Unauthenticated(format!(
                "unknown role '{}'",
                other
            ))),
        }
    }
}

/// Authenticated caller as handed over by the identity provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: Uuid,
    pub role: Role,
}

impl Identity {
    pub fn new(user_id: Uuid, role: Role) -> Self {
        Self { user_id, role }
    }

    /// Builds an identity from the raw header values set by the auth proxy.
    pub fn from_claims(user_id: Option<&str>, role: Option<&str>) -> Result<Self, LifecycleError> {
        let user_id = user_id
            .ok_or_else(|| LifecycleError::Unauthenticated("missing user id".into()))?;
        let user_id = Uuid::parse_str(user_id.trim())
            .map_err(|_| LifecycleError::Unauthenticated("malformed user id".into()))?;
        let role = role
            .ok_or_else(|| LifecycleError::Unauthenticated("missing role".into()))?
            .parse()?;
        Ok(Self { user_id, role })
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}
