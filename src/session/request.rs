//! Requests as plain data, so they can be rebuilt for a retry.

use reqwest::Method;
use serde::Serialize;

use super::error::SessionError;

/// How the request body is encoded.
#[derive(Debug, Clone, Default)]
pub enum RequestBody {
    #[default]
    None,
    /// Sent as `application/json`.
    Json(serde_json::Value),
    /// Sent as `multipart/form-data`; the encoder picks the boundary.
    Multipart(Vec<FormField>),
}

#[derive(Debug, Clone)]
pub enum FormField {
    Text {
        name: String,
        value: String,
    },
    File {
        name: String,
        file_name: String,
        content_type: String,
        bytes: Vec<u8>,
    },
}

impl FormField {
    pub fn text(name: impl Into<String>, value: impl Into<String>) -> Self {
        FormField::Text {
            name: name.into(),
            value: value.into(),
        }
    }

    pub fn file(
        name: impl Into<String>,
        file_name: impl Into<String>,
        content_type: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Self {
        FormField::File {
            name: name.into(),
            file_name: file_name.into(),
            content_type: content_type.into(),
            bytes,
        }
    }
}

/// One logical API call. `path` is relative to the client's base URL.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub body: RequestBody,
    retried: bool,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: RequestBody::None,
            retried: false,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn json<T: Serialize>(mut self, body: &T) -> Result<Self, SessionError> {
        let value = serde_json::to_value(body).map_err(|e| SessionError::Decode(e.to_string()))?;
        self.body = RequestBody::Json(value);
        Ok(self)
    }

    pub fn multipart(mut self, fields: Vec<FormField>) -> Self {
        self.body = RequestBody::Multipart(fields);
        self
    }

    /// Whether this request already went through a refresh-and-retry.
    pub fn is_retried(&self) -> bool {
        self.retried
    }

    pub(super) fn mark_retried(&mut self) {
        self.retried = true;
    }
}
