//! Built-in node handlers.

use super::error::NodeError;
use super::registry::{NodeHandler, PortValues};
use crate::routing::RequestRouter;
use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose};
use relay_abstraction::{Request, RequestKind, Tier};
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// String form of a port value: strings as-is, everything else as JSON.
fn value_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn param_str<'a>(parameters: &'a Map<String, Value>, name: &str) -> Option<&'a str> {
    parameters.get(name).and_then(Value::as_str)
}

fn required_param<'a>(parameters: &'a Map<String, Value>, name: &str) -> Result<&'a str, NodeError> {
    param_str(parameters, name)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| NodeError::invalid_parameter(name, "required string parameter"))
}

/// An input port value, falling back to the parameter of the same name.
fn input_or_param<'a>(
    inputs: &'a PortValues,
    parameters: &'a Map<String, Value>,
    name: &str,
) -> Option<&'a Value> {
    inputs.get(name).or_else(|| parameters.get(name)).filter(|value| !value.is_null())
}

fn outputs<const N: usize>(entries: [(&str, Value); N]) -> PortValues {
    entries.into_iter().map(|(port, value)| (port.to_string(), value)).collect()
}

/// `input`: emits the `value` parameter on port `data`.
pub struct InputHandler;

#[async_trait]
impl NodeHandler for InputHandler {
    async fn execute(
        &self,
        _inputs: &PortValues,
        parameters: &Map<String, Value>,
        _cancel: &CancellationToken,
    ) -> Result<PortValues, NodeError> {
        let value = parameters.get("value").cloned().unwrap_or(Value::Null);
        Ok(outputs([("data", value)]))
    }
}

/// `transform`: applies a `|`-separated pipeline of operations to input `data`.
///
/// Operations: `uppercase`, `lowercase`, `trim`, `reverse`, `length`,
/// `json_parse`, `json_stringify` and `template:<text>`, where `{{data}}`
/// in the text is replaced by the current value. A template consumes the
/// rest of the pipeline, so it may contain `|`.
pub struct TransformHandler;

impl TransformHandler {
    fn parse_ops(code: &str) -> Vec<&str> {
        let mut ops = Vec::new();
        let mut rest = code;
        loop {
            let trimmed = rest.trim_start();
            if trimmed.starts_with("template:") {
                ops.push(trimmed);
                break;
            }
            match trimmed.split_once('|') {
                Some((op, tail)) => {
                    ops.push(op.trim());
                    rest = tail;
                }
                None => {
                    ops.push(trimmed.trim());
                    break;
                }
            }
        }
        ops.retain(|op| !op.is_empty());
        ops
    }

    fn apply(op: &str, value: Value) -> Result<Value, NodeError> {
        if let Some(template) = op.strip_prefix("template:") {
            return Ok(Value::String(template.replace("{{data}}", &value_text(&value))));
        }

        match op {
            "uppercase" => Ok(Value::String(value_text(&value).to_uppercase())),
            "lowercase" => Ok(Value::String(value_text(&value).to_lowercase())),
            "trim" => Ok(Value::String(value_text(&value).trim().to_string())),
            "reverse" => match value {
                Value::Array(mut items) => {
                    items.reverse();
                    Ok(Value::Array(items))
                }
                other => Ok(Value::String(value_text(&other).chars().rev().collect())),
            },
            "length" => {
                let length = match &value {
                    Value::Null => 0,
                    Value::String(text) => text.chars().count(),
                    Value::Array(items) => items.len(),
                    Value::Object(map) => map.len(),
                    other => other.to_string().chars().count(),
                };
                Ok(Value::from(length as u64))
            }
            "json_parse" => serde_json::from_str(&value_text(&value))
                .map_err(|e| NodeError::Transform(format!("json_parse: {}", e))),
            "json_stringify" => Ok(Value::String(value.to_string())),
            other => Err(NodeError::invalid_parameter("code", format!("unknown operation '{}'", other))),
        }
    }
}

#[async_trait]
impl NodeHandler for TransformHandler {
    async fn execute(
        &self,
        inputs: &PortValues,
        parameters: &Map<String, Value>,
        _cancel: &CancellationToken,
    ) -> Result<PortValues, NodeError> {
        let mut value = inputs.get("data").cloned().ok_or_else(|| NodeError::missing_input("data"))?;
        let code = param_str(parameters, "code").unwrap_or_default();

        for op in Self::parse_ops(code) {
            value = Self::apply(op, value)?;
        }
        Ok(outputs([("result", value)]))
    }
}

/// `filter`: keeps the items of array input `data` that match
/// `field` / `op` / `value`.
///
/// Ops: `eq`, `ne`, `contains`, `gt`, `lt`, `exists` (default). Without
/// `field` the item itself is compared.
pub struct FilterHandler;

impl FilterHandler {
    const OPS: [&'static str; 6] = ["eq", "ne", "contains", "gt", "lt", "exists"];

    fn matches(item: &Value, field: Option<&str>, op: &str, expected: Option<&Value>) -> bool {
        let target = match field {
            Some(field) => item.get(field),
            None => Some(item),
        };

        match op {
            "exists" => target.is_some_and(|value| !value.is_null()),
            "eq" => target.is_some_and(|value| Some(value) == expected),
            "ne" => !target.is_some_and(|value| Some(value) == expected),
            "contains" => match (target, expected) {
                (Some(Value::String(text)), Some(needle)) => text.contains(&value_text(needle)),
                (Some(Value::Array(items)), Some(needle)) => items.contains(needle),
                _ => false,
            },
            "gt" | "lt" => {
                let lhs = target.and_then(Value::as_f64);
                let rhs = expected.and_then(Value::as_f64);
                match (lhs, rhs) {
                    (Some(lhs), Some(rhs)) if op == "gt" => lhs > rhs,
                    (Some(lhs), Some(rhs)) => lhs < rhs,
                    _ => false,
                }
            }
            _ => false,
        }
    }
}

#[async_trait]
impl NodeHandler for FilterHandler {
    async fn execute(
        &self,
        inputs: &PortValues,
        parameters: &Map<String, Value>,
        _cancel: &CancellationToken,
    ) -> Result<PortValues, NodeError> {
        let data = inputs.get("data").ok_or_else(|| NodeError::missing_input("data"))?;
        let items = data
            .as_array()
            .ok_or_else(|| NodeError::Transform("filter input 'data' must be an array".to_string()))?;

        let op = param_str(parameters, "op").unwrap_or("exists");
        if !Self::OPS.contains(&op) {
            return Err(NodeError::invalid_parameter("op", format!("unknown operator '{}'", op)));
        }
        let field = param_str(parameters, "field");
        let expected = parameters.get("value");

        let kept: Vec<Value> =
            items.iter().filter(|item| Self::matches(item, field, op, expected)).cloned().collect();
        let count = kept.len() as u64;
        Ok(outputs([("result", Value::Array(kept)), ("count", Value::from(count))]))
    }
}

/// `merge`: combines all inputs into one object on port `result`.
pub struct MergeHandler;

#[async_trait]
impl NodeHandler for MergeHandler {
    async fn execute(
        &self,
        inputs: &PortValues,
        _parameters: &Map<String, Value>,
        _cancel: &CancellationToken,
    ) -> Result<PortValues, NodeError> {
        let merged: Map<String, Value> =
            inputs.iter().map(|(port, value)| (port.clone(), value.clone())).collect();
        Ok(outputs([("result", Value::Object(merged))]))
    }
}

/// `output`: passes its inputs through unchanged.
pub struct OutputHandler;

#[async_trait]
impl NodeHandler for OutputHandler {
    async fn execute(
        &self,
        inputs: &PortValues,
        _parameters: &Map<String, Value>,
        _cancel: &CancellationToken,
    ) -> Result<PortValues, NodeError> {
        Ok(inputs.clone())
    }
}

/// `ai_text`, `ai_code`, `ai_image`: route a prompt through the request router.
///
/// The prompt comes from input `prompt` (or the parameter), with optional
/// `system` input/parameter and `tier` parameter. The run's cancellation
/// signal is attached as the request's abort signal.
pub struct AiHandler {
    router: Arc<RequestRouter>,
    kind: RequestKind,
}

impl AiHandler {
    /// Creates a handler producing requests of `kind`.
    #[must_use]
    pub fn new(router: Arc<RequestRouter>, kind: RequestKind) -> Self {
        Self { router, kind }
    }
}

#[async_trait]
impl NodeHandler for AiHandler {
    async fn execute(
        &self,
        inputs: &PortValues,
        parameters: &Map<String, Value>,
        cancel: &CancellationToken,
    ) -> Result<PortValues, NodeError> {
        let prompt = input_or_param(inputs, parameters, "prompt")
            .map(value_text)
            .ok_or_else(|| NodeError::missing_input("prompt"))?;

        let mut request = Request::new(self.kind, prompt).with_abort(cancel.clone());
        if let Some(system) = input_or_param(inputs, parameters, "system") {
            request = request.with_system_prompt(value_text(system));
        }
        if let Some(tier) = param_str(parameters, "tier") {
            let tier = tier
                .parse::<Tier>()
                .map_err(|()| NodeError::invalid_parameter("tier", format!("unknown tier '{}'", tier)))?;
            request = request.with_tier(tier);
        }

        let response = self.router.complete(request).await?;
        debug!(kind = %self.kind, provider = %response.provider_tag, "AI node fulfilled");

        let mut ports = outputs([
            ("provider", Value::String(response.provider_tag)),
            ("model", Value::String(response.model_id)),
            ("cost", Value::from(response.cost)),
            ("tokens", Value::from(response.tokens_used)),
        ]);

        let payload = response.payload;
        match self.kind {
            RequestKind::Code => {
                let code = payload.code.or(payload.text).unwrap_or_default();
                ports.insert("code".to_string(), Value::String(code));
            }
            RequestKind::Image => {
                let url = payload.media_urls.first().cloned().map_or(Value::Null, Value::String);
                ports.insert("url".to_string(), url);
                ports.insert(
                    "urls".to_string(),
                    Value::Array(payload.media_urls.into_iter().map(Value::String).collect()),
                );
            }
            _ => {
                ports.insert("text".to_string(), Value::String(payload.text.unwrap_or_default()));
            }
        }
        Ok(ports)
    }
}

/// `file_write`: writes input `content` to parameter `path`.
///
/// `encoding` is `utf8` (default) or `base64`. Parent directories are created.
pub struct FileWriteHandler;

#[async_trait]
impl NodeHandler for FileWriteHandler {
    async fn execute(
        &self,
        inputs: &PortValues,
        parameters: &Map<String, Value>,
        cancel: &CancellationToken,
    ) -> Result<PortValues, NodeError> {
        let path = PathBuf::from(required_param(parameters, "path")?);
        let content = input_or_param(inputs, parameters, "content")
            .ok_or_else(|| NodeError::missing_input("content"))?;

        let bytes = match param_str(parameters, "encoding").unwrap_or("utf8") {
            "utf8" | "utf-8" | "text" => value_text(content).into_bytes(),
            "base64" => general_purpose::STANDARD
                .decode(value_text(content).trim())
                .map_err(|e| NodeError::Transform(format!("invalid base64 content: {}", e)))?,
            other => {
                return Err(NodeError::invalid_parameter(
                    "encoding",
                    format!("unsupported encoding '{}'", other),
                ));
            }
        };

        if cancel.is_cancelled() {
            return Err(NodeError::Cancelled);
        }

        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, &bytes).await?;
        debug!(path = %path.display(), bytes = bytes.len(), "Wrote file");

        Ok(outputs([
            ("path", Value::String(path.display().to_string())),
            ("bytes", Value::from(bytes.len() as u64)),
        ]))
    }
}

/// `http_request`: calls `url` with `method` (default GET), optional
/// `headers` parameter and `body` input.
///
/// Outputs the status code and the body, parsed as JSON when possible.
pub struct HttpRequestHandler {
    client: reqwest::Client,
}

impl HttpRequestHandler {
    /// Creates a handler with a default client.
    #[must_use]
    pub fn new() -> Self {
        Self { client: reqwest::Client::new() }
    }
}

impl Default for HttpRequestHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NodeHandler for HttpRequestHandler {
    async fn execute(
        &self,
        inputs: &PortValues,
        parameters: &Map<String, Value>,
        cancel: &CancellationToken,
    ) -> Result<PortValues, NodeError> {
        let url = input_or_param(inputs, parameters, "url")
            .map(value_text)
            .ok_or_else(|| NodeError::invalid_parameter("url", "required string parameter"))?;
        let method_name = param_str(parameters, "method").unwrap_or("GET").to_uppercase();
        let method = reqwest::Method::from_bytes(method_name.as_bytes()).map_err(|_| {
            NodeError::invalid_parameter("method", format!("invalid method '{}'", method_name))
        })?;

        let mut builder = self.client.request(method, &url);
        if let Some(Value::Object(headers)) = parameters.get("headers") {
            for (name, value) in headers {
                builder = builder.header(name.as_str(), value_text(value));
            }
        }
        if let Some(body) = input_or_param(inputs, parameters, "body") {
            builder = match body {
                Value::String(text) => builder.body(text.clone()),
                other => builder.json(other),
            };
        }

        debug!(url = %url, method = %method_name, "Sending HTTP request");
        let response = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(NodeError::Cancelled),
            result = builder.send() => result.map_err(|e| NodeError::Http(e.to_string()))?,
        };

        let status = response.status().as_u16();
        let text = response.text().await.map_err(|e| NodeError::Http(e.to_string()))?;
        let body = serde_json::from_str::<Value>(&text).unwrap_or_else(|_| Value::String(text));

        Ok(outputs([("status", Value::from(status)), ("body", body)]))
    }
}
