//! HTTP client for the automation controller.
//!
//! Covers the three remote surfaces the engine needs: the long-poll change
//! feed, one-shot getter reads, and templated action calls.

use crate::config::ControllerConfig;
use crate::device::DeviceKey;
use crate::widget::ActionDef;
use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// One batch from the controller's change feed.
#[derive(Debug, Clone, Deserialize)]
pub struct RefreshResult {
    /// Cursor to hand back on the next poll
    #[serde(default)]
    pub last: i64,
    #[serde(default)]
    pub events: Vec<ControllerEvent>,
}

/// A single change event as delivered by the feed.
#[derive(Debug, Clone, Deserialize)]
pub struct ControllerEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub data: Value,
}

pub struct ControllerClient {
    http: reqwest::Client,
    base_url: String,
    user: String,
    password: String,
    poll_timeout: u64,
}

impl ControllerClient {
    pub fn new(config: &ControllerConfig) -> Result<Self> {
        // Transport timeout sits above the server-side long-poll timeout so a
        // quiet feed returns normally instead of erroring.
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.poll_timeout_seconds + 5))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http,
            base_url: format!("{}://{}", config.protocol, config.host),
            user: config.user.clone(),
            password: config.password.clone(),
            poll_timeout: config.poll_timeout_seconds,
        })
    }

    /// Long-poll the change feed from the given cursor.
    pub async fn poll_changes(&self, since: i64) -> Result<RefreshResult> {
        let url = format!(
            "{}/api/refreshStates?last={}&timeout={}",
            self.base_url, since, self.poll_timeout
        );

        let response = self
            .http
            .get(&url)
            .basic_auth(&self.user, Some(&self.password))
            .send()
            .await
            .context("Change feed request failed")?;

        if !response.status().is_success() {
            return Err(anyhow!("Change feed returned status {}", response.status()));
        }

        response
            .json::<RefreshResult>()
            .await
            .context("Failed to parse change feed response")
    }

    /// Read one value through a getter's API path. `${id}` in the path
    /// substitutes the device identity.
    pub async fn get_value(&self, api: &str, id: &DeviceKey) -> Result<Value> {
        let url = format!("{}{}", self.base_url, substitute_id(api, id));
        debug!(url = %url, "Getter read");

        let response = self
            .http
            .get(&url)
            .basic_auth(&self.user, Some(&self.password))
            .send()
            .await
            .context("Getter request failed")?;

        if !response.status().is_success() {
            return Err(anyhow!("Getter returned status {}", response.status()));
        }

        response.json::<Value>().await.context("Failed to parse getter response")
    }

    /// Execute an action against a device, templating the body from the
    /// supplied value.
    pub async fn execute_action(
        &self,
        id: &DeviceKey,
        action: &ActionDef,
        value: &Value,
    ) -> Result<()> {
        let url = format!("{}{}", self.base_url, substitute_id(&action.api, id));
        let method = action.method.as_deref().unwrap_or("POST").to_ascii_uppercase();
        let body = action.body.as_ref().map(|b| template_body(b, value));
        debug!(url = %url, method = %method, "Action call");

        let mut request = match method.as_str() {
            "GET" => self.http.get(&url),
            "PUT" => self.http.put(&url),
            "DELETE" => self.http.delete(&url),
            _ => self.http.post(&url),
        };
        request = request.basic_auth(&self.user, Some(&self.password));
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await.context("Action request failed")?;
        if !response.status().is_success() {
            return Err(anyhow!("Action returned status {}", response.status()));
        }
        Ok(())
    }
}

fn substitute_id(api: &str, id: &DeviceKey) -> String {
    api.replace("${id}", &id.to_string())
}

/// Fill a body template from an action value.
///
/// Scalar values substitute `${value}` spans; object values substitute
/// `${<key>}` spans per key. A string that is exactly one span takes the
/// replacement's JSON type instead of stringifying it.
pub fn template_body(body: &Value, value: &Value) -> Value {
    match body {
        Value::String(s) => template_string(s, value),
        Value::Array(items) => {
            Value::Array(items.iter().map(|v| template_body(v, value)).collect())
        }
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), template_body(v, value)))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn template_string(template: &str, value: &Value) -> Value {
    let lookup = |name: &str| -> Option<Value> {
        match value {
            Value::Object(map) => map.get(name).cloned(),
            scalar if name == "value" => Some(scalar.clone()),
            _ => None,
        }
    };

    // Whole-span templates keep the replacement's type
    if let Some(inner) = template
        .strip_prefix("${")
        .and_then(|rest| rest.strip_suffix('}'))
    {
        if !inner.contains("${") {
            if let Some(replacement) = lookup(inner) {
                return replacement;
            }
        }
    }

    let mut out = String::new();
    let mut rest = template;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                let name = &after[..end];
                match lookup(name) {
                    Some(Value::String(s)) => out.push_str(&s),
                    Some(replacement) => out.push_str(&replacement.to_string()),
                    None => out.push_str(&rest[start..start + 2 + end + 1]),
                }
                rest = &after[end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    Value::String(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn id_substitution_in_api_path() {
        assert_eq!(
            substitute_id("/api/devices/${id}/action/turnOn", &DeviceKey::Num(42)),
            "/api/devices/42/action/turnOn"
        );
        assert_eq!(
            substitute_id("/api/devices/${id}", &DeviceKey::Str("virtual-7".into())),
            "/api/devices/virtual-7"
        );
    }

    #[test]
    fn scalar_value_templating_keeps_type() {
        let body = json!({"args": ["${value}"]});
        assert_eq!(template_body(&body, &json!(75)), json!({"args": [75]}));
        assert_eq!(
            template_body(&body, &json!("heat")),
            json!({"args": ["heat"]})
        );
    }

    #[test]
    fn object_value_templates_per_key() {
        let body = json!({"args": [{"red": "${red}", "green": "${green}"}]});
        let value = json!({"red": 255, "green": 128});
        assert_eq!(
            template_body(&body, &value),
            json!({"args": [{"red": 255, "green": 128}]})
        );
    }

    #[test]
    fn embedded_span_stringifies() {
        let body = json!("level ${value} percent");
        assert_eq!(
            template_body(&body, &json!(40)),
            json!("level 40 percent")
        );
    }

    #[test]
    fn unresolved_span_is_preserved() {
        let body = json!({"args": ["${missing}"]});
        assert_eq!(
            template_body(&body, &json!({"red": 1})),
            json!({"args": ["${missing}"]})
        );
    }

    #[test]
    fn refresh_result_parses_partial_payload() {
        let result: RefreshResult = serde_json::from_value(json!({
            "last": 1042,
            "events": [
                {"type": "DevicePropertyUpdatedEvent", "data": {"id": 12}}
            ],
            "status": "IDLE"
        }))
        .unwrap();
        assert_eq!(result.last, 1042);
        assert_eq!(result.events.len(), 1);
        assert_eq!(result.events[0].event_type, "DevicePropertyUpdatedEvent");
    }
}
