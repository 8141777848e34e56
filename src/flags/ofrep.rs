//! OpenFeature Remote Evaluation Protocol (OFREP) provider.
//!
//! `POST {base}/ofrep/v1/evaluate/flags/{flag}` with an empty evaluation
//! context; a success body carries the flag `value`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{FlagError, FlagProvider};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EvaluationResponse {
    value: Option<Value>,
    error_code: Option<String>,
    error_details: Option<String>,
}

/// Remote flag provider speaking OFREP over HTTP.
pub struct OfrepFlagProvider {
    client: Client,
    base_url: String,
}

impl OfrepFlagProvider {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, FlagError> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn evaluation_url(&self, flag: &str) -> String {
        format!("{}/ofrep/v1/evaluate/flags/{}", self.base_url, flag)
    }
}

fn parse_evaluation(flag: &str, body: EvaluationResponse) -> Result<bool, FlagError> {
    if let Some(code) = body.error_code {
        return Err(match code.as_str() {
            "FLAG_NOT_FOUND" => FlagError::NotFound(flag.to_string()),
            _ => FlagError::Provider(format!(
                "{}: {}",
                code,
                body.error_details.unwrap_or_default()
            )),
        });
    }

    match body.value {
        Some(Value::Bool(value)) => Ok(value),
        Some(other) => Err(FlagError::TypeMismatch {
            flag: flag.to_string(),
            value: other.to_string(),
        }),
        None => Err(FlagError::Provider(format!("No value for '{}'", flag))),
    }
}

#[async_trait]
impl FlagProvider for OfrepFlagProvider {
    async fn evaluate_bool(&self, flag: &str) -> Result<bool, FlagError> {
        let response = self
            .client
            .post(self.evaluation_url(flag))
            .json(&json!({ "context": {} }))
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(FlagError::NotFound(flag.to_string()));
        }

        let body: EvaluationResponse = response.json().await?;
        if !status.is_success() && body.error_code.is_none() {
            return Err(FlagError::Provider(format!("HTTP {}", status)));
        }

        parse_evaluation(flag, body)
    }
}
