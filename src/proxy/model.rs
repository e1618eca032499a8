use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use base64::{Engine as _, engine::general_purpose};
use serde::{Deserialize, Serialize};

use super::error::ProxyError;

fn default_method() -> String {
    "GET".to_string()
}

/// Outbound call as submitted by a dashboard user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyRequest {
    pub url: String,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// JSON values are serialized, strings are sent verbatim
    #[serde(default)]
    pub body: Option<serde_json::Value>,
    #[serde(default)]
    pub api_key_id: Option<String>,
}

impl ProxyRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: default_method(),
            headers: HashMap::new(),
            body: None,
            api_key_id: None,
        }
    }

    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into();
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_api_key(mut self, api_key_id: impl Into<String>) -> Self {
        self.api_key_id = Some(api_key_id.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Head => "HEAD",
        }
    }

    /// GET and HEAD never carry a request body
    pub fn allows_body(&self) -> bool {
        !matches!(self, HttpMethod::Get | HttpMethod::Head)
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = ProxyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "GET" => Ok(HttpMethod::Get),
            "POST" => Ok(HttpMethod::Post),
            "PUT" => Ok(HttpMethod::Put),
            "PATCH" => Ok(HttpMethod::Patch),
            "DELETE" => Ok(HttpMethod::Delete),
            "HEAD" => Ok(HttpMethod::Head),
            other => Err(ProxyError::InvalidRequest(format!("unsupported method: {}", other))),
        }
    }
}

impl From<HttpMethod> for reqwest::Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Patch => reqwest::Method::PATCH,
            HttpMethod::Delete => reqwest::Method::DELETE,
            HttpMethod::Head => reqwest::Method::HEAD,
        }
    }
}

/// Upstream body, decoded as JSON, then UTF-8 text, then base64
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResponseBody {
    Json(serde_json::Value),
    Text(String),
    Binary { base64: String },
}

impl ResponseBody {
    pub fn from_bytes(bytes: &[u8]) -> Self {
        if bytes.is_empty() {
            return ResponseBody::Text(String::new());
        }
        if let Ok(value) = serde_json::from_slice::<serde_json::Value>(bytes) {
            return ResponseBody::Json(value);
        }
        match std::str::from_utf8(bytes) {
            Ok(text) => ResponseBody::Text(text.to_string()),
            Err(_) => ResponseBody::Binary {
                base64: general_purpose::STANDARD.encode(bytes),
            },
        }
    }
}

/// What the proxy hands back to the caller, whatever the upstream status
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProxyResult {
    pub status_code: u16,
    /// Lower-cased names; repeated headers joined with ", "
    pub headers: BTreeMap<String, String>,
    pub body: ResponseBody,
    pub time_taken_ms: f64,
}
