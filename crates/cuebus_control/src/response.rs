//! Response Envelope
//!
//! `{"success": true, "data"?: ...}` or
//! `{"success": false, "error": {"code": ..., "message": ...}}`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CommandError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl Response {
    pub fn ok() -> Self {
        Self {
            success: true,
            data: None,
            error: None,
        }
    }

    /// Success carrying `data`; a value that fails to serialize becomes an
    /// internal error
    pub fn ok_with<T: Serialize>(data: &T) -> Self {
        match serde_json::to_value(data) {
            Ok(value) => Self {
                success: true,
                data: Some(value),
                error: None,
            },
            Err(e) => Self::failure("INTERNAL_ERROR", e.to_string()),
        }
    }

    pub fn failure(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(ErrorBody {
                code: code.into(),
                message: message.into(),
            }),
        }
    }

    pub fn from_error(err: &CommandError) -> Self {
        Self::failure(err.code(), err.to_string())
    }

    pub fn error_code(&self) -> Option<&str> {
        self.error.as_ref().map(|e| e.code.as_str())
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            format!(
                r#"{{"success":false,"error":{{"code":"INTERNAL_ERROR","message":"{}"}}}}"#,
                e.to_string().replace('"', "'")
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_ok_omits_data() {
        let json = serde_json::to_value(Response::ok()).unwrap();
        assert_eq!(json, json!({"success": true}));
    }

    #[test]
    fn test_ok_with_data() {
        let json = serde_json::to_value(Response::ok_with(&json!({"level": -6.0}))).unwrap();
        assert_eq!(json, json!({"success": true, "data": {"level": -6.0}}));
    }

    #[test]
    fn test_failure_shape() {
        let response = Response::from_error(&CommandError::UnknownCommand("doesNotExist".into()));
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["error"]["code"], "UNKNOWN_COMMAND");
        assert!(json["error"]["message"]
            .as_str()
            .unwrap()
            .contains("doesNotExist"));
        assert!(json.get("data").is_none());
    }
}
