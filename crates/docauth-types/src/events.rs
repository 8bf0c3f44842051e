//! Event bodies carried on the broker.
//!
//! Field names follow the wire contract used by the other services on the
//! exchange (`idCitizen`, `UrlDocument`, `documentTitle`, `authSuccess`).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const FIELD_ID_CITIZEN: &str = "idCitizen";
pub const FIELD_URL_DOCUMENT: &str = "UrlDocument";
pub const FIELD_DOCUMENT_TITLE: &str = "documentTitle";

/// Inbound `document.authentication.requested` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticationRequested {
    #[serde(rename = "idCitizen")]
    pub id_citizen: i64,
    #[serde(rename = "UrlDocument")]
    pub url_document: String,
    #[serde(rename = "documentTitle")]
    pub document_title: String,
}

impl AuthenticationRequested {
    /// Extract a request from an already decoded JSON body.
    ///
    /// All three fields must be present; the id must be a positive integer and
    /// the two strings must not be blank. Every problem found is reported, not
    /// just the first one.
    pub fn from_json(value: &Value) -> Result<Self, MalformedRequest> {
        let Some(body) = value.as_object() else {
            return Err(MalformedRequest {
                problems: vec!["body is not a JSON object".to_string()],
            });
        };

        let mut problems = Vec::new();
        let id_citizen = required_id(body, &mut problems);
        let url_document = required_text(body, FIELD_URL_DOCUMENT, &mut problems);
        let document_title = required_text(body, FIELD_DOCUMENT_TITLE, &mut problems);

        match (id_citizen, url_document, document_title) {
            (Some(id_citizen), Some(url_document), Some(document_title)) => Ok(Self {
                id_citizen,
                url_document,
                document_title,
            }),
            _ => Err(MalformedRequest { problems }),
        }
    }
}

fn required_id(body: &Map<String, Value>, problems: &mut Vec<String>) -> Option<i64> {
    match body.get(FIELD_ID_CITIZEN) {
        None | Some(Value::Null) => {
            problems.push(format!("missing {FIELD_ID_CITIZEN}"));
            None
        }
        Some(value) => match value.as_i64() {
            Some(id) if id > 0 => Some(id),
            _ => {
                problems.push(format!("{FIELD_ID_CITIZEN} must be a positive integer"));
                None
            }
        },
    }
}

fn required_text(
    body: &Map<String, Value>,
    field: &'static str,
    problems: &mut Vec<String>,
) -> Option<String> {
    match body.get(field) {
        None | Some(Value::Null) => {
            problems.push(format!("missing {field}"));
            None
        }
        Some(Value::String(text)) if text.trim().is_empty() => {
            problems.push(format!("empty {field}"));
            None
        }
        Some(Value::String(text)) => Some(text.clone()),
        Some(_) => {
            problems.push(format!("{field} must be a string"));
            None
        }
    }
}

/// A JSON body that parsed but does not carry a usable request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed authentication request: {}", problems.join(", "))]
pub struct MalformedRequest {
    pub problems: Vec<String>,
}

/// Outbound result event, published on the success or failure routing key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticationResult {
    #[serde(rename = "idCitizen")]
    pub id_citizen: i64,
    #[serde(rename = "UrlDocument")]
    pub url_document: String,
    #[serde(rename = "documentTitle")]
    pub document_title: String,
    #[serde(rename = "authSuccess")]
    pub auth_success: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn from_json_accepts_complete_request() {
        let body = json!({
            "idCitizen": 1128456232,
            "UrlDocument": "https://x/doc.pdf",
            "documentTitle": "Diploma"
        });

        let request = AuthenticationRequested::from_json(&body).unwrap();

        assert_eq!(request.id_citizen, 1128456232);
        assert_eq!(request.url_document, "https://x/doc.pdf");
        assert_eq!(request.document_title, "Diploma");
    }

    #[test]
    fn from_json_reports_every_missing_field() {
        let body = json!({ "idCitizen": 1128456232 });

        let err = AuthenticationRequested::from_json(&body).unwrap_err();

        assert_eq!(
            err.problems,
            vec!["missing UrlDocument".to_string(), "missing documentTitle".to_string()]
        );
        assert!(err.to_string().contains("missing UrlDocument, missing documentTitle"));
    }

    #[test]
    fn from_json_rejects_blank_strings_and_null_id() {
        let body = json!({
            "idCitizen": null,
            "UrlDocument": "   ",
            "documentTitle": "Diploma"
        });

        let err = AuthenticationRequested::from_json(&body).unwrap_err();

        assert_eq!(
            err.problems,
            vec!["missing idCitizen".to_string(), "empty UrlDocument".to_string()]
        );
    }

    #[test]
    fn from_json_rejects_wrong_types() {
        let body = json!({
            "idCitizen": "1128456232",
            "UrlDocument": 42,
            "documentTitle": "Diploma"
        });

        let err = AuthenticationRequested::from_json(&body).unwrap_err();

        assert!(err.problems.contains(&"idCitizen must be a positive integer".to_string()));
        assert!(err.problems.contains(&"UrlDocument must be a string".to_string()));
    }

    #[test]
    fn from_json_rejects_zero_id() {
        let body = json!({
            "idCitizen": 0,
            "UrlDocument": "https://x/doc.pdf",
            "documentTitle": "Diploma"
        });

        assert!(AuthenticationRequested::from_json(&body).is_err());
    }

    #[test]
    fn from_json_rejects_non_object_body() {
        let err = AuthenticationRequested::from_json(&json!("not an object")).unwrap_err();
        assert_eq!(err.problems, vec!["body is not a JSON object".to_string()]);
    }

    #[test]
    fn result_event_uses_wire_field_names() {
        let event = AuthenticationResult {
            id_citizen: 1128456232,
            url_document: "https://x/doc.pdf".to_string(),
            document_title: "Diploma".to_string(),
            auth_success: true,
        };

        let value = serde_json::to_value(&event).unwrap();

        assert_eq!(
            value,
            json!({
                "idCitizen": 1128456232,
                "UrlDocument": "https://x/doc.pdf",
                "documentTitle": "Diploma",
                "authSuccess": true
            })
        );
    }
}
