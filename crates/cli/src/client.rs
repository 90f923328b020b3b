//! API client for the prediction service

use anyhow::{Context, Result};
use reqwest::{Client, Response, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use url::Url;

/// API client for the prediction service
pub struct ApiClient {
    client: Client,
    base_url: Url,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = Url::parse(base_url).context("Invalid API URL")?;

        Ok(Self { client, base_url })
    }

    /// Make a GET request
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to send request")?;

        parse_response(response).await
    }

    /// GET a health endpoint whose body is meaningful on 503 as well
    pub async fn get_status<T: DeserializeOwned>(&self, path: &str) -> Result<(StatusCode, T)> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to send request")?;

        let status = response.status();
        if !status.is_success() && status != StatusCode::SERVICE_UNAVAILABLE {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("API error ({}): {}", status, body);
        }

        let body = response.json().await.context("Failed to parse response")?;
        Ok((status, body))
    }

    /// Make a POST request with JSON body
    pub async fn post<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .context("Failed to send request")?;

        parse_response(response).await
    }
}

async fn parse_response<T: DeserializeOwned>(response: Response) -> Result<T> {
    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        match serde_json::from_str::<ErrorResponse>(&body) {
            Ok(err) => anyhow::bail!("API error ({}, {}): {}", status, err.kind, err.error),
            Err(_) => anyhow::bail!("API error ({}): {}", status, body),
        }
    }

    response.json().await.context("Failed to parse response")
}

// API response types

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractInfo {
    pub version: String,
    pub impute_columns: Vec<String>,
    pub scale_columns: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classifier: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub kind: String,
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use dayoff_core::PredictionResult;

    #[tokio::test]
    async fn test_post_parses_prediction() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/predict")
            .match_header("content-type", "application/json")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"station":"Taipei","probability":0.87,"imputed_columns":["RH"],
                    "contract_version":"dayoff-features/v1","classifier":"onnx"}"#,
            )
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let result: PredictionResult = client
            .post("/v1/predict", &serde_json::json!({"station": "Taipei"}))
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(result.station, "Taipei");
        assert_eq!(result.probability, 0.87);
        assert_eq!(result.imputed_columns, vec!["RH".to_string()]);
        assert!(result.observed_at.is_none());
    }

    #[tokio::test]
    async fn test_error_body_is_surfaced() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/predict")
            .with_status(422)
            .with_header("content-type", "application/json")
            .with_body(r#"{"kind":"contract_violation","error":"missing columns [lat]"}"#)
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let err = client
            .post::<PredictionResult, _>("/v1/predict", &serde_json::json!({}))
            .await
            .unwrap_err()
            .to_string();

        assert!(err.contains("422"));
        assert!(err.contains("contract_violation"));
        assert!(err.contains("lat"));
    }

    #[tokio::test]
    async fn test_get_status_accepts_unavailable() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/readyz")
            .with_status(503)
            .with_header("content-type", "application/json")
            .with_body(r#"{"ready":false,"reason":"Pipeline artifacts not loaded"}"#)
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let (status, body): (StatusCode, serde_json::Value) =
            client.get_status("/readyz").await.unwrap();

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["ready"], false);
    }

    #[tokio::test]
    async fn test_get_rejects_plain_text_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/v1/contract")
            .with_status(404)
            .with_body("not found")
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let err = client.get::<ContractInfo>("/v1/contract").await.unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn test_invalid_url_is_rejected() {
        assert!(ApiClient::new("not a url").is_err());
    }
}
