use serde::{Deserialize, Serialize};

/// HTTP status the centralizer uses for "found" / "authenticated".
pub const STATUS_OK: u16 = 200;
/// HTTP status the centralizer uses for "citizen not registered".
pub const STATUS_NO_CONTENT: u16 = 204;

/// Answer to a document authentication call that reached the centralizer.
///
/// A non-200 status is a business outcome, not an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusinessOutcome {
    pub success: bool,
    pub status_code: u16,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

/// Answer to a citizen existence check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CitizenLookup {
    /// `true` when the centralizer already knows the citizen (200),
    /// `false` when it does not (204).
    pub exists: bool,
    pub status_code: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}
