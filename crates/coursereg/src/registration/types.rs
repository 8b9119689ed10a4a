/// Result types returned to the presentation layer
use crate::db::Enrollment;
use serde::Serialize;

/// Where a session is in the validate/enroll flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RegistrationPhase {
    Idle,
    Validating,
    Valid,
    Invalid,
    Enrolling,
    Enrolled,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationResult {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ValidationResult {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            valid: true,
            error: None,
            message: Some(message.into()),
        }
    }

    pub fn invalid(error: impl Into<String>) -> Self {
        Self {
            valid: false,
            error: Some(error.into()),
            message: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnrollResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub enrolled: Vec<Enrollment>,
}

impl EnrollResult {
    pub fn enrolled(enrolled: Vec<Enrollment>) -> Self {
        Self {
            success: true,
            error: None,
            enrolled,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            enrolled: Vec::new(),
        }
    }
}
