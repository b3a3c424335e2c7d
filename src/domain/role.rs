//! Roles and actors.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::status::ParseError;

/// Closed set of roles an actor can hold
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoleId {
    /// Implicitly authorized for every stage
    Superuser,
    ProductOwner,
    TechnicalArchitect,
    Developer,
    SalesManager,
    FinanceApprover,
    BusinessAnalyst,
}

impl RoleId {
    pub const ALL: [RoleId; 7] = [
        RoleId::Superuser,
        RoleId::ProductOwner,
        RoleId::TechnicalArchitect,
        RoleId::Developer,
        RoleId::SalesManager,
        RoleId::FinanceApprover,
        RoleId::BusinessAnalyst,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RoleId::Superuser => "SUPERUSER",
            RoleId::ProductOwner => "PRODUCT_OWNER",
            RoleId::TechnicalArchitect => "TECHNICAL_ARCHITECT",
            RoleId::Developer => "DEVELOPER",
            RoleId::SalesManager => "SALES_MANAGER",
            RoleId::FinanceApprover => "FINANCE_APPROVER",
            RoleId::BusinessAnalyst => "BUSINESS_ANALYST",
        }
    }

    pub fn is_superuser(&self) -> bool {
        matches!(self, RoleId::Superuser)
    }
}

impl fmt::Display for RoleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RoleId {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().replace('-', "_").to_ascii_uppercase();
        Self::ALL
            .iter()
            .find(|role| role.as_str() == normalized)
            .copied()
            .ok_or_else(|| ParseError::UnknownRole(s.to_string()))
    }
}

/// The identity issuing an action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    /// Stable identity (user name, service account)
    pub id: String,

    /// Role the actor acts under
    pub role: RoleId,
}

impl Actor {
    pub fn new(id: impl Into<String>, role: RoleId) -> Self {
        Self {
            id: id.into(),
            role,
        }
    }

    /// Actor used for system-initiated actions (recovery)
    pub fn system() -> Self {
        Self::new("system", RoleId::Superuser)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_parsing() {
        assert_eq!("finance_approver".parse::<RoleId>().unwrap(), RoleId::FinanceApprover);
        assert_eq!("FINANCE-APPROVER".parse::<RoleId>().unwrap(), RoleId::FinanceApprover);
        assert!("janitor".parse::<RoleId>().is_err());
    }

    #[test]
    fn test_role_serialization() {
        let json = serde_json::to_string(&RoleId::TechnicalArchitect).unwrap();
        assert_eq!(json, "\"TECHNICAL_ARCHITECT\"");
        assert!(RoleId::Superuser.is_superuser());
        assert!(!RoleId::Developer.is_superuser());
    }
}
