//! Domain records shared by the platform and the gateway.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Result, ScoreHallError};

/// Name of the administrative pseudo-tenant. It never has a directory row.
pub const ADMIN_TENANT_NAME: &str = "admin";

/// Role asserted by a credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Organizer,
    Player,
    None,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Organizer => "organizer",
            Role::Player => "player",
            Role::None => "none",
        }
    }

    /// Parse a `role` claim. `none` is not a valid claim value.
    pub fn from_claim(value: &str) -> Option<Role> {
        match value {
            "admin" => Some(Role::Admin),
            "organizer" => Some(Role::Organizer),
            "player" => Some(Role::Player),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who is making the current request. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub role: Role,
    pub subject: String,
    pub tenant_name: String,
    pub tenant_id: i64,
}

impl Identity {
    pub fn is_admin_tenant(&self) -> bool {
        self.tenant_name == ADMIN_TENANT_NAME
    }

    pub fn require_role(&self, role: Role) -> Result<()> {
        if self.role == role {
            Ok(())
        } else {
            Err(ScoreHallError::authorization(format!("{role} role required")))
        }
    }
}

/// Tenant directory row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantRow {
    pub id: i64,
    pub name: String,
    pub display_name: String,
    pub created_at: i64,
    pub updated_at: i64,
}

impl TenantRow {
    /// The administrative pseudo-tenant used for host `admin`.
    pub fn admin() -> Self {
        Self {
            id: 0,
            name: ADMIN_TENANT_NAME.into(),
            display_name: ADMIN_TENANT_NAME.into(),
            created_at: 0,
            updated_at: 0,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.name == ADMIN_TENANT_NAME
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerRow {
    pub tenant_id: i64,
    pub id: String,
    pub display_name: String,
    pub is_disqualified: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompetitionRow {
    pub tenant_id: i64,
    pub id: String,
    pub title: String,
    pub finished_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl CompetitionRow {
    pub fn is_finished(&self) -> bool {
        self.finished_at.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerScoreRow {
    pub tenant_id: i64,
    pub id: String,
    pub player_id: String,
    pub competition_id: String,
    pub score: i64,
    pub row_num: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Earliest ranking visit for one (player, competition, tenant).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisitSummary {
    pub player_id: String,
    pub competition_id: String,
    pub tenant_id: i64,
    pub min_created_at: i64,
}

/// One line of the billing report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TenantBilling {
    pub id: String,
    pub name: String,
    pub display_name: String,
    #[serde(rename = "billing")]
    pub billing_yen: i64,
    #[serde(skip)]
    pub tenant_id: i64,
}

impl TenantBilling {
    pub fn unbilled(tenant: &TenantRow) -> Self {
        Self {
            id: tenant.id.to_string(),
            name: tenant.name.clone(),
            display_name: tenant.display_name.clone(),
            billing_yen: 0,
            tenant_id: tenant.id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_from_claim() {
        assert_eq!(Role::from_claim("admin"), Some(Role::Admin));
        assert_eq!(Role::from_claim("organizer"), Some(Role::Organizer));
        assert_eq!(Role::from_claim("player"), Some(Role::Player));
        assert_eq!(Role::from_claim("none"), None);
        assert_eq!(Role::from_claim("Admin"), None);
    }

    #[test]
    fn test_require_role() {
        let id = Identity {
            role: Role::Organizer,
            subject: "org-1".into(),
            tenant_name: "alpha".into(),
            tenant_id: 3,
        };
        assert!(id.require_role(Role::Organizer).is_ok());
        let err = id.require_role(Role::Admin).unwrap_err();
        assert_eq!(err.status_code(), 403);
    }

    #[test]
    fn test_billing_json_shape() {
        let tenant = TenantRow {
            id: 42,
            name: "alpha".into(),
            display_name: "Alpha Inc".into(),
            created_at: 1,
            updated_at: 1,
        };
        let mut b = TenantBilling::unbilled(&tenant);
        b.billing_yen = 110;
        let json = serde_json::to_value(&b).unwrap();
        assert_eq!(json["id"], "42");
        assert_eq!(json["billing"], 110);
        assert!(json.get("tenant_id").is_none());
    }
}
