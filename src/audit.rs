/// Security audit trail
///
/// Structured records for session events. Clients only ever see a generic
/// 401; the audit record keeps the specific failure kind.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    Register,
    Login,
    Refresh,
    TokenReuse,
    Logout,
    PasswordChange,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditOutcome {
    Success,
    Failure,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuditLog {
    pub log_id: String,
    pub timestamp: DateTime<Utc>,
    pub action: AuditAction,
    pub outcome: AuditOutcome,
    pub user_id: Option<Uuid>,
    /// Failure kind or a short note; never a secret or token
    pub message: String,
}

impl AuditLog {
    pub fn success(action: AuditAction, user_id: Uuid) -> Self {
        Self::new(action, AuditOutcome::Success, Some(user_id), String::new())
    }

    pub fn failure(action: AuditAction, user_id: Option<Uuid>, message: impl Into<String>) -> Self {
        Self::new(action, AuditOutcome::Failure, user_id, message.into())
    }

    fn new(
        action: AuditAction,
        outcome: AuditOutcome,
        user_id: Option<Uuid>,
        message: String,
    ) -> Self {
        Self {
            log_id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            action,
            outcome,
            user_id,
            message,
        }
    }

    pub fn emit(&self) {
        match self.outcome {
            AuditOutcome::Failure => tracing::warn!(
                target: "audit",
                log_id = %self.log_id,
                action = ?self.action,
                outcome = ?self.outcome,
                user_id = ?self.user_id,
                message = %self.message,
                "Audit log entry"
            ),
            AuditOutcome::Success => tracing::info!(
                target: "audit",
                log_id = %self.log_id,
                action = ?self.action,
                outcome = ?self.outcome,
                user_id = ?self.user_id,
                "Audit log entry"
            ),
        }
    }
}
