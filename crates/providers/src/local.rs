//! Local (Ollama) endpoint management: base-URL normalization, model
//! listing, and model pulls. Chat streaming for the local provider goes
//! through the OpenAI-compatible adapter; these helpers cover the
//! management surface around it.

use anyhow::{anyhow, Result};
use reqwest::Client;
use serde_json::Value;
use std::sync::LazyLock;
use std::time::Duration;

static SHARED_HTTP: LazyLock<Client> = LazyLock::new(|| {
    Client::builder()
        .timeout(Duration::from_secs(45))
        .build()
        .expect("failed to build HTTP client")
});

pub const DEFAULT_OLLAMA_BASE_URL: &str = "http://localhost:11434";

/// Normalize a user-supplied Ollama base: default when blank, prepend
/// `http://` when schemeless, strip trailing slashes and a `/v1` suffix.
pub fn normalize_ollama_base(value: Option<&str>) -> String {
    let raw = value.map(str::trim).unwrap_or("");
    let base = if raw.is_empty() {
        DEFAULT_OLLAMA_BASE_URL
    } else {
        raw
    };
    let lower = base.to_ascii_lowercase();
    let with_scheme = if lower.starts_with("http://") || lower.starts_with("https://") {
        base.to_string()
    } else {
        format!("http://{base}")
    };
    let trimmed = with_scheme.trim_end_matches('/');
    let trimmed = if trimmed.to_ascii_lowercase().ends_with("/v1") {
        &trimmed[..trimmed.len() - 3]
    } else {
        trimmed
    };
    trimmed.trim_end_matches('/').to_string()
}

/// The OpenAI-compatible base for a local endpoint: normalized base + `/v1`.
pub fn normalize_openai_base(value: Option<&str>) -> String {
    format!("{}/v1", normalize_ollama_base(value))
}

fn models_from_openai_listing(data: &Value) -> Vec<String> {
    data.get("data")
        .and_then(Value::as_array)
        .map(|models| {
            models
                .iter()
                .filter_map(|m| m.get("id").and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn models_from_tags_listing(data: &Value) -> Vec<String> {
    data.get("models")
        .and_then(Value::as_array)
        .map(|models| {
            models
                .iter()
                .filter_map(|m| m.get("name").and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// List installed models, preferring the OpenAI-compatible listing and
/// falling back to Ollama's native `/api/tags`.
pub async fn fetch_local_models(base_url: Option<&str>) -> Result<Vec<String>> {
    let base = normalize_ollama_base(base_url);

    let openai_attempt = async {
        let resp = SHARED_HTTP.get(format!("{base}/v1/models")).send().await?;
        if !resp.status().is_success() {
            return Err(anyhow!("status {}", resp.status()));
        }
        let data: Value = resp.json().await?;
        let models = models_from_openai_listing(&data);
        if models.is_empty() {
            return Err(anyhow!("no models returned"));
        }
        Ok(models)
    };

    match openai_attempt.await {
        Ok(models) => Ok(models),
        Err(first_err) => {
            tracing::debug!("OpenAI-style listing failed ({first_err}), trying /api/tags");
            let resp = SHARED_HTTP.get(format!("{base}/api/tags")).send().await?;
            if !resp.status().is_success() {
                return Err(anyhow!(
                    "Ollama models not available at {base}: status {}",
                    resp.status()
                ));
            }
            let data: Value = resp.json().await?;
            let models = models_from_tags_listing(&data);
            if models.is_empty() {
                return Err(anyhow!("Ollama returned no models"));
            }
            Ok(models)
        }
    }
}

/// Extract the most recent status line from an ND-JSON pull progress body.
fn last_pull_status(body: &str) -> Option<String> {
    for line in body.lines().rev() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Ok(obj) = serde_json::from_str::<Value>(line) {
            if let Some(status) = obj.get("status").and_then(Value::as_str) {
                return Some(status.to_string());
            }
            if let Some(error) = obj.get("error").and_then(Value::as_str) {
                return Some(error.to_string());
            }
        }
    }
    None
}

/// Ask Ollama to download a model; returns the last reported status.
pub async fn pull_local_model(base_url: Option<&str>, name: &str) -> Result<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(anyhow!("model name is required"));
    }
    let base = normalize_ollama_base(base_url);
    let resp = SHARED_HTTP
        .post(format!("{base}/api/pull"))
        .json(&serde_json::json!({ "name": name }))
        .send()
        .await?;
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    if !status.is_success() {
        return Err(anyhow!(
            "Ollama download failed: {}",
            if body.trim().is_empty() {
                status.to_string()
            } else {
                body.chars().take(200).collect()
            }
        ));
    }
    Ok(last_pull_status(&body).unwrap_or_else(|| "Download started".to_string()))
}
