#![allow(dead_code)]
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Account status. The RiskGate's account-state check rejects
/// any order from an account that is not `Active`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "user_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    Active,
    Frozen,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub kyc_level: i32,
    pub status: UserStatus,
    pub register_ip: Option<String>,
    pub last_login_ip: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn is_active(&self) -> bool {
        self.status == UserStatus::Active
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frozen_account_is_not_active() {
        let user = User {
            id: Uuid::new_v4(),
            email: "trader@example.com".into(),
            kyc_level: 1,
            status: UserStatus::Frozen,
            register_ip: None,
            last_login_ip: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert!(!user.is_active());
    }
}
