//! The request and response envelopes shared by every transport.

use crate::types::Value;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt};

pub const INVALID_REQUEST_MESSAGE: &str = "Invalid RPC request format";
pub const UNKNOWN_ERROR_MESSAGE: &str = "Unknown error occurred";
pub const INTERNAL_SERVER_ERROR_MESSAGE: &str = "Internal server error";
pub const METHOD_NOT_ALLOWED_MESSAGE: &str = "Method not allowed";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Request {
    pub endpoint: String,
    pub params: Vec<Value>,
}

impl Request {
    pub fn new(endpoint: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            endpoint: endpoint.into(),
            params,
        }
    }

    /// Checks the envelope shape: a map holding a non-empty string `endpoint`
    /// and an array `params`. Other keys are ignored.
    pub fn from_value(value: Value) -> Result<Self, ErrorObject> {
        let Value::Map(mut map) = value else {
            return Err(ErrorObject::invalid_request());
        };
        match (map.remove("endpoint"), map.remove("params")) {
            (Some(Value::String(endpoint)), Some(Value::Array(params))) if !endpoint.is_empty() => {
                Ok(Self { endpoint, params })
            }
            _ => Err(ErrorObject::invalid_request()),
        }
    }

    pub fn into_value(self) -> Value {
        let mut map = BTreeMap::new();
        map.insert("endpoint".to_owned(), Value::String(self.endpoint));
        map.insert("params".to_owned(), Value::Array(self.params));
        Value::Map(map)
    }
}

/// Machine-readable failure kind. Unrecognized codes are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ErrorCode {
    InvalidRequest,
    EndpointNotFound,
    InternalError,
    /// Only produced by HTTP adapters, never by the handler.
    MethodNotAllowed,
    Other(String),
}

impl ErrorCode {
    pub fn as_str(&self) -> &str {
        match self {
            ErrorCode::InvalidRequest => "INVALID_REQUEST",
            ErrorCode::EndpointNotFound => "ENDPOINT_NOT_FOUND",
            ErrorCode::InternalError => "INTERNAL_ERROR",
            ErrorCode::MethodNotAllowed => "METHOD_NOT_ALLOWED",
            ErrorCode::Other(code) => code,
        }
    }
}

impl From<String> for ErrorCode {
    fn from(code: String) -> Self {
        match code.as_str() {
            "INVALID_REQUEST" => ErrorCode::InvalidRequest,
            "ENDPOINT_NOT_FOUND" => ErrorCode::EndpointNotFound,
            "INTERNAL_ERROR" => ErrorCode::InternalError,
            "METHOD_NOT_ALLOWED" => ErrorCode::MethodNotAllowed,
            _ => ErrorCode::Other(code),
        }
    }
}

impl From<ErrorCode> for String {
    fn from(code: ErrorCode) -> Self {
        match code {
            ErrorCode::Other(code) => code,
            known => known.as_str().to_owned(),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorObject {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<ErrorCode>,
}

impl ErrorObject {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: Some(code),
        }
    }

    pub fn invalid_request() -> Self {
        Self::new(ErrorCode::InvalidRequest, INVALID_REQUEST_MESSAGE)
    }

    pub fn endpoint_not_found(endpoint: &str) -> Self {
        Self::new(
            ErrorCode::EndpointNotFound,
            format!("Endpoint '{endpoint}' not found"),
        )
    }

    /// An endpoint failure. Empty messages fall back to a generic one.
    pub fn internal(message: impl Into<String>) -> Self {
        let message = message.into();
        if message.is_empty() {
            Self::new(ErrorCode::InternalError, UNKNOWN_ERROR_MESSAGE)
        } else {
            Self::new(ErrorCode::InternalError, message)
        }
    }

    pub fn internal_server_error() -> Self {
        Self::new(ErrorCode::InternalError, INTERNAL_SERVER_ERROR_MESSAGE)
    }

    pub fn method_not_allowed() -> Self {
        Self::new(ErrorCode::MethodNotAllowed, METHOD_NOT_ALLOWED_MESSAGE)
    }

    fn from_value(value: Value) -> Option<Self> {
        let Value::Map(mut map) = value else {
            return None;
        };
        let message = match map.remove("message") {
            Some(Value::String(message)) => message,
            _ => return None,
        };
        let code = match map.remove("code") {
            None | Some(Value::Null) => None,
            Some(Value::String(code)) => Some(ErrorCode::from(code)),
            Some(_) => return None,
        };
        Some(Self { message, code })
    }

    fn into_value(self) -> Value {
        let mut map = BTreeMap::new();
        map.insert("message".to_owned(), Value::String(self.message));
        if let Some(code) = self.code {
            map.insert("code".to_owned(), Value::String(code.into()));
        }
        Value::Map(map)
    }
}

impl fmt::Display for ErrorObject {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Outcome of one call: `{"data": ..}` or `{"error": {..}}`, never both and
/// never neither.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Response {
    Data(Value),
    Error(ErrorObject),
}

impl Response {
    pub fn is_error(&self) -> bool {
        matches!(self, Response::Error(_))
    }

    pub fn data(&self) -> Option<&Value> {
        match self {
            Response::Data(data) => Some(data),
            Response::Error(_) => None,
        }
    }

    pub fn error(&self) -> Option<&ErrorObject> {
        match self {
            Response::Data(_) => None,
            Response::Error(error) => Some(error),
        }
    }

    pub fn into_result(self) -> Result<Value, ErrorObject> {
        match self {
            Response::Data(data) => Ok(data),
            Response::Error(error) => Err(error),
        }
    }

    /// Reads the structured-message form used by in-process transports.
    pub fn from_value(value: Value) -> Option<Self> {
        let Value::Map(mut map) = value else {
            return None;
        };
        if map.len() != 1 {
            return None;
        }
        if let Some(data) = map.remove("data") {
            return Some(Response::Data(data));
        }
        map.remove("error")
            .and_then(ErrorObject::from_value)
            .map(Response::Error)
    }

    pub fn into_value(self) -> Value {
        let (key, value) = match self {
            Response::Data(data) => ("data", data),
            Response::Error(error) => ("error", error.into_value()),
        };
        let mut map = BTreeMap::new();
        map.insert(key.to_owned(), value);
        Value::Map(map)
    }
}

impl From<ErrorObject> for Response {
    fn from(error: ErrorObject) -> Self {
        Response::Error(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request_value(json: serde_json::Value) -> Value {
        Value::from(json)
    }

    #[test]
    fn shape_check() {
        let ok = Request::from_value(request_value(json!({"endpoint": "add", "params": [5, 3]})))
            .unwrap();
        assert_eq!(ok, Request::new("add", vec![Value::Int(5), Value::Int(3)]));

        for bad in [
            json!({"endpoint": "ping"}),
            json!({"endpoint": "ping", "params": {"a": 1}}),
            json!({"endpoint": "", "params": []}),
            json!({"endpoint": 7, "params": []}),
            json!({"params": []}),
            json!(["ping", []]),
            json!("invalid json"),
        ] {
            let err = Request::from_value(request_value(bad.clone())).unwrap_err();
            assert_eq!(err, ErrorObject::invalid_request(), "{bad}");
        }
    }

    #[test]
    fn wire_shape() {
        let data = Response::Data(Value::Int(8));
        assert_eq!(serde_json::to_value(&data).unwrap(), json!({"data": 8}));

        let error = Response::from(ErrorObject::endpoint_not_found("nonExistent"));
        assert_eq!(
            serde_json::to_value(&error).unwrap(),
            json!({"error": {"message": "Endpoint 'nonExistent' not found", "code": "ENDPOINT_NOT_FOUND"}})
        );

        let unit = Response::Data(Value::Null);
        assert_eq!(serde_json::to_value(&unit).unwrap(), json!({"data": null}));
    }

    #[test]
    fn parses_error_envelopes() {
        let parsed: Response = serde_json::from_value(json!({
            "error": {"message": "nope", "code": "RATE_LIMITED"}
        }))
        .unwrap();
        assert_eq!(
            parsed,
            Response::Error(ErrorObject {
                message: "nope".into(),
                code: Some(ErrorCode::Other("RATE_LIMITED".into())),
            })
        );

        let no_code: Response = serde_json::from_value(json!({"error": {"message": "x"}})).unwrap();
        assert_eq!(no_code.error().and_then(|e| e.code.clone()), None);
    }

    #[test]
    fn rejects_ambiguous_envelopes() {
        assert!(serde_json::from_str::<Response>(r#"{}"#).is_err());
        assert!(
            serde_json::from_str::<Response>(r#"{"data":1,"error":{"message":"x"}}"#).is_err()
        );

        let both = Value::from(json!({"data": 1, "error": {"message": "x"}}));
        assert_eq!(Response::from_value(both), None);
        assert_eq!(Response::from_value(Value::from(json!({}))), None);
    }

    #[test]
    fn structured_message_form() {
        let error = Response::from(ErrorObject::internal("Test error"));
        assert_eq!(Response::from_value(error.clone().into_value()), Some(error));

        let data = Response::Data(Value::from("pong"));
        assert_eq!(Response::from_value(data.clone().into_value()), Some(data));
    }

    #[test]
    fn empty_failure_message_falls_back() {
        assert_eq!(ErrorObject::internal("").message, UNKNOWN_ERROR_MESSAGE);
    }
}
