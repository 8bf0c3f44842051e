//! Trace kept for a citizen existence check.
//!
//! Only the outcome is recorded. Whatever citizen data the centralizer
//! returns stays in the response and is never persisted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::trace::{TraceEntry, TraceId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationStatus {
    /// Centralizer does not know the citizen; registration may proceed.
    Eligible,
    /// Centralizer already knows the citizen.
    AlreadyRegistered,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationRecord {
    id: TraceId,
    citizen_id: i64,
    status: ValidationStatus,
    external_status_code: Option<u16>,
    error_message: String,
    requested_at: DateTime<Utc>,
}

impl ValidationRecord {
    pub fn answered(
        id: TraceId,
        citizen_id: i64,
        exists: bool,
        status_code: u16,
        requested_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            citizen_id,
            status: if exists {
                ValidationStatus::AlreadyRegistered
            } else {
                ValidationStatus::Eligible
            },
            external_status_code: Some(status_code),
            error_message: String::new(),
            requested_at,
        }
    }

    pub fn failed(
        id: TraceId,
        citizen_id: i64,
        cause: &str,
        requested_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            citizen_id,
            status: ValidationStatus::Error,
            external_status_code: None,
            error_message: cause.to_string(),
            requested_at,
        }
    }

    pub fn is_eligible(&self) -> bool {
        self.status == ValidationStatus::Eligible
    }

    pub fn id(&self) -> &TraceId {
        &self.id
    }

    pub fn citizen_id(&self) -> i64 {
        self.citizen_id
    }

    pub fn status(&self) -> ValidationStatus {
        self.status
    }

    pub fn external_status_code(&self) -> Option<u16> {
        self.external_status_code
    }

    pub fn error_message(&self) -> &str {
        &self.error_message
    }

    pub fn requested_at(&self) -> DateTime<Utc> {
        self.requested_at
    }
}

impl TraceEntry for ValidationRecord {
    fn trace_id(&self) -> &TraceId {
        &self.id
    }

    fn subject_id(&self) -> i64 {
        self.citizen_id
    }

    fn recorded_at(&self) -> DateTime<Utc> {
        self.requested_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_citizen_is_eligible() {
        let record = ValidationRecord::answered(TraceId::new("v1"), 7, false, 204, Utc::now());
        assert_eq!(record.status(), ValidationStatus::Eligible);
        assert!(record.is_eligible());
        assert_eq!(record.external_status_code(), Some(204));
    }

    #[test]
    fn known_citizen_is_not_eligible() {
        let record = ValidationRecord::answered(TraceId::new("v2"), 7, true, 200, Utc::now());
        assert_eq!(record.status(), ValidationStatus::AlreadyRegistered);
        assert!(!record.is_eligible());
    }

    #[test]
    fn failure_keeps_cause_and_no_status_code() {
        let record = ValidationRecord::failed(TraceId::new("v3"), 7, "connection refused", Utc::now());
        assert_eq!(record.status(), ValidationStatus::Error);
        assert_eq!(record.error_message(), "connection refused");
        assert_eq!(record.external_status_code(), None);
        assert!(!record.is_eligible());
    }

    #[test]
    fn status_serializes_screaming() {
        let record = ValidationRecord::answered(TraceId::new("v4"), 7, true, 200, Utc::now());
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["status"], "ALREADY_REGISTERED");
        assert_eq!(value["citizenId"], 7);
    }
}
