//! Outbound HTTP call step ("http").
//!
//! The response is never judged: any status code the server returns is
//! handed downstream verbatim so a later gate can decide. Only faults below
//! HTTP (DNS, connect, timeout, broken body) are reported as errors.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::{Method, Url};
use serde_json::{json, Map, Value};
use tracing::{info, warn};

use super::masking::{mask_headers, mask_url};
use super::{config_value, Outcome, StepHandler};
use crate::core::PipelineState;
use crate::domain::StepConfig;

/// Default per-call timeout
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 30;

/// Upper bound accepted for a per-step `timeout_seconds` override
const MAX_TIMEOUT_SECONDS: f64 = 3600.0;

/// Settings shared by every http step
#[derive(Debug, Clone)]
pub struct HttpSettings {
    /// Timeout applied when the step does not override it
    pub timeout: Duration,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECONDS),
        }
    }
}

/// Issues one HTTP request and reports the raw response
pub struct HttpStep {
    client: reqwest::Client,
    settings: HttpSettings,
}

/// Request body as configured
#[derive(Debug, Clone, PartialEq)]
enum RequestBody {
    Json(Value),
    Text(String),
}

/// A validated request, ready to send
#[derive(Debug)]
struct PreparedRequest {
    method: Method,
    url: Url,
    headers: HeaderMap,
    params: Vec<(String, String)>,
    body: Option<RequestBody>,
    timeout: Duration,
}

impl HttpStep {
    /// Create a step with its own client
    pub fn new(settings: HttpSettings) -> Self {
        Self::with_client(Self::default_client(), settings)
    }

    /// Create a step that shares an existing client
    pub fn with_client(client: reqwest::Client, settings: HttpSettings) -> Self {
        Self { client, settings }
    }

    /// Client that reports redirects instead of following them
    pub fn default_client() -> reqwest::Client {
        reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "Failed to build HTTP client, using defaults");
                reqwest::Client::new()
            })
    }

    /// Validate the step configuration into a request
    fn prepare(&self, config: &StepConfig) -> Result<PreparedRequest, String> {
        let raw_url = match config.get("url") {
            Some(Value::String(url)) if !url.trim().is_empty() => url.trim(),
            Some(Value::String(_)) | None | Some(Value::Null) => {
                return Err("'url' is required for the http step".to_string())
            }
            Some(_) => return Err("'url' must be a string".to_string()),
        };

        let url = Url::parse(raw_url)
            .map_err(|e| format!("invalid url '{}': {}", mask_url(raw_url), e))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(format!("unsupported url scheme '{}'", url.scheme()));
        }

        let method_name = match config.get("method") {
            None | Some(Value::Null) => "GET".to_string(),
            Some(Value::String(m)) if m.trim().is_empty() => "GET".to_string(),
            Some(Value::String(m)) => m.trim().to_ascii_uppercase(),
            Some(_) => return Err("'method' must be a string".to_string()),
        };
        let method = Method::from_bytes(method_name.as_bytes())
            .map_err(|_| format!("invalid http method '{}'", method_name))?;

        let mut headers = HeaderMap::new();
        if let Some(value) = config_value(config, &["headers", "header"]) {
            for (name, value) in scalar_pairs(value, "headers")? {
                let header_name = HeaderName::from_bytes(name.as_bytes())
                    .map_err(|_| format!("invalid header name '{}'", name))?;
                let header_value = HeaderValue::from_str(&value)
                    .map_err(|_| format!("invalid value for header '{}'", name))?;
                headers.append(header_name, header_value);
            }
        }

        let params = match config_value(config, &["params", "query"]) {
            Some(value) => scalar_pairs(value, "params")?,
            None => Vec::new(),
        };

        let body = config_value(config, &["body", "json_body"]).map(parse_body);

        let timeout = match config.get("timeout_seconds") {
            None | Some(Value::Null) => self.settings.timeout,
            Some(value) => match value.as_f64() {
                Some(secs) if secs > 0.0 && secs <= MAX_TIMEOUT_SECONDS => {
                    Duration::from_secs_f64(secs)
                }
                _ => {
                    return Err(format!(
                        "'timeout_seconds' must be a number in (0, {}]",
                        MAX_TIMEOUT_SECONDS
                    ))
                }
            },
        };

        Ok(PreparedRequest {
            method,
            url,
            headers,
            params,
            body,
            timeout,
        })
    }

    /// Send the request and shape the response into the step output
    async fn send(&self, request: PreparedRequest) -> Outcome {
        let safe_url = mask_url(request.url.as_str());
        let method = request.method.clone();
        let started = Instant::now();

        info!(
            url = %safe_url,
            %method,
            headers = ?mask_headers(&header_map_to_json(&request.headers)),
            "step.http.execute"
        );

        let mut builder = self
            .client
            .request(request.method, request.url)
            .headers(request.headers)
            .timeout(request.timeout);
        if !request.params.is_empty() {
            builder = builder.query(&request.params);
        }
        builder = match request.body {
            Some(RequestBody::Json(value)) => builder.json(&value),
            Some(RequestBody::Text(text)) => builder.body(text),
            None => builder,
        };

        let response = match builder.send().await {
            Ok(response) => response,
            Err(e) => {
                let detail = describe_transport_error(e, request.timeout);
                let duration_ms = started.elapsed().as_millis() as u64;
                warn!(url = %safe_url, %method, error = %detail, duration_ms, "step.http.error");
                return Outcome::transport_error(format!("{} {} failed: {}", method, safe_url, detail));
            }
        };

        let status_code = response.status().as_u16();
        let headers = header_map_to_json(response.headers());
        let is_json = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|ct| ct.to_ascii_lowercase().contains("json"))
            .unwrap_or(false);

        let text = match response.text().await {
            Ok(text) => text,
            Err(e) => {
                let detail = describe_transport_error(e, request.timeout);
                warn!(url = %safe_url, %method, error = %detail, "step.http.error");
                return Outcome::transport_error(format!(
                    "{} {} failed while reading the response body: {}",
                    method, safe_url, detail
                ));
            }
        };

        let decoded = if is_json {
            serde_json::from_str::<Value>(&text).ok()
        } else {
            None
        };

        info!(
            url = %safe_url,
            %method,
            status = status_code,
            duration_ms = started.elapsed().as_millis() as u64,
            "step.http.complete"
        );

        Outcome::Continue(json!({
            "status_code": status_code,
            "headers": headers,
            "body": decoded.clone().unwrap_or_else(|| Value::String(text.clone())),
            "json": decoded.unwrap_or(Value::Null),
            "text": text,
        }))
    }
}

#[async_trait]
impl StepHandler for HttpStep {
    fn name(&self) -> &str {
        "http"
    }

    async fn execute(&self, config: &StepConfig, _state: &PipelineState) -> Outcome {
        match self.prepare(config) {
            Ok(request) => self.send(request).await,
            Err(message) => Outcome::config_error(message),
        }
    }
}

/// Flatten a mapping of scalars into string pairs
fn scalar_pairs(value: &Value, key: &str) -> Result<Vec<(String, String)>, String> {
    let map = value
        .as_object()
        .ok_or_else(|| format!("'{}' must be a mapping", key))?;

    let mut pairs = Vec::with_capacity(map.len());
    for (name, value) in map {
        let rendered = match value {
            Value::Null => continue,
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Array(_) | Value::Object(_) => {
                return Err(format!("'{}.{}' must be a scalar value", key, name))
            }
        };
        pairs.push((name.clone(), rendered));
    }
    Ok(pairs)
}

/// Objects and arrays go out as JSON; strings are sent as JSON only when they
/// hold a JSON document, otherwise as raw text
fn parse_body(value: &Value) -> RequestBody {
    match value {
        Value::String(raw) => match serde_json::from_str::<Value>(raw) {
            Ok(parsed @ (Value::Object(_) | Value::Array(_))) => RequestBody::Json(parsed),
            _ => RequestBody::Text(raw.clone()),
        },
        other => RequestBody::Json(other.clone()),
    }
}

/// Lowercase header names; repeated headers are joined with ", "
fn header_map_to_json(headers: &HeaderMap) -> Map<String, Value> {
    let mut out: Map<String, Value> = Map::new();
    for (name, value) in headers {
        let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
        match out.get_mut(name.as_str()) {
            Some(Value::String(existing)) => {
                existing.push_str(", ");
                existing.push_str(&value);
            }
            _ => {
                out.insert(name.as_str().to_string(), Value::String(value));
            }
        }
    }
    out
}

/// Human-readable transport failure, without the (possibly credentialed) URL
fn describe_transport_error(error: reqwest::Error, timeout: Duration) -> String {
    if error.is_timeout() {
        return format!("request timed out after {:?}", timeout);
    }

    let kind = if error.is_connect() {
        "connection failed"
    } else {
        "request failed"
    };

    let error = error.without_url();
    let mut detail = error.to_string();
    let mut source = std::error::Error::source(&error);
    while let Some(cause) = source {
        detail.push_str(": ");
        detail.push_str(&cause.to_string());
        source = cause.source();
    }

    format!("{} ({})", kind, detail)
}
