// ── Response envelope ──
//
// Every REST response is wrapped as
// `{ "success": bool, "data": ..., "error": "...", "details": {...} }`.

use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::Error;

/// The `{ success, data, error, details }` wrapper the backend puts around
/// every payload.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiEnvelope<T> {
    #[serde(default = "default_success")]
    pub success: bool,
    pub data: Option<T>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub details: Option<serde_json::Value>,
}

fn default_success() -> bool {
    true
}

impl<T: DeserializeOwned> ApiEnvelope<T> {
    /// Parse a 2xx body and unwrap the payload.
    ///
    /// `success: false` becomes [`Error::Rejected`]; a missing `data`
    /// field becomes a deserialization error.
    pub fn parse_data(body: &str) -> Result<T, Error> {
        let envelope = Self::parse(body)?;
        if !envelope.success {
            return Err(envelope.into_rejection());
        }
        envelope.data.ok_or_else(|| Error::Deserialization {
            message: "response envelope has no `data` field".into(),
            body: body.to_owned(),
        })
    }

    fn parse(body: &str) -> Result<Self, Error> {
        serde_json::from_str(body).map_err(|e| {
            let preview: String = body.chars().take(200).collect();
            Error::Deserialization {
                message: format!("{e} (body preview: {preview:?})"),
                body: body.to_owned(),
            }
        })
    }
}

impl<T> ApiEnvelope<T> {
    fn into_rejection(self) -> Error {
        Error::Rejected {
            message: self.error.unwrap_or_else(|| "request rejected".into()),
            details: self.details,
        }
    }
}

/// Parse a 2xx body where the payload is irrelevant (e.g. DELETE).
pub(crate) fn parse_ack(body: &str) -> Result<(), Error> {
    if body.trim().is_empty() {
        return Ok(());
    }
    let envelope: ApiEnvelope<serde_json::Value> = ApiEnvelope::parse(body)?;
    if envelope.success {
        Ok(())
    } else {
        Err(envelope.into_rejection())
    }
}

/// Build an [`Error::Api`] from a non-2xx status and its raw body.
pub(crate) fn error_from_status(status: u16, raw: String) -> Error {
    match serde_json::from_str::<ApiEnvelope<serde_json::Value>>(&raw) {
        Ok(envelope) => Error::Api {
            status,
            message: envelope.error.unwrap_or_else(|| format!("HTTP {status}")),
            details: envelope.details,
        },
        Err(_) => Error::Api {
            status,
            message: if raw.is_empty() {
                format!("HTTP {status}")
            } else {
                raw
            },
            details: None,
        },
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn parse_data_unwraps_payload() {
        let body = r#"{"success":true,"data":{"id":"b1"}}"#;
        let data: serde_json::Value = ApiEnvelope::parse_data(body).unwrap();
        assert_eq!(data["id"], "b1");
    }

    #[test]
    fn parse_data_rejects_unsuccessful_envelope() {
        let body = r#"{"success":false,"error":"Brand is linked","details":{"linkedProducts":[]}}"#;
        let err = ApiEnvelope::<serde_json::Value>::parse_data(body).unwrap_err();
        match err {
            Error::Rejected { message, details } => {
                assert_eq!(message, "Brand is linked");
                assert!(details.unwrap().get("linkedProducts").is_some());
            }
            other => panic!("expected Rejected, got {other:?}"),
        }
    }

    #[test]
    fn parse_data_requires_data_field() {
        let err = ApiEnvelope::<serde_json::Value>::parse_data(r#"{"success":true}"#).unwrap_err();
        assert!(matches!(err, Error::Deserialization { .. }));
    }

    #[test]
    fn ack_accepts_empty_body() {
        assert!(parse_ack("").is_ok());
        assert!(parse_ack(r#"{"success":true}"#).is_ok());
    }

    #[test]
    fn status_error_falls_back_to_raw_body() {
        let err = error_from_status(502, "Bad Gateway".into());
        assert!(matches!(err, Error::Api { status: 502, ref message, .. } if message == "Bad Gateway"));
    }

    #[test]
    fn status_error_reads_envelope() {
        let raw = r#"{"success":false,"error":"Validation failed","details":{"fields":{"name":"required"}}}"#;
        let err = error_from_status(422, raw.into());
        assert_eq!(err.status(), Some(422));
        assert_eq!(err.to_string(), "API error (HTTP 422): Validation failed");
    }
}
