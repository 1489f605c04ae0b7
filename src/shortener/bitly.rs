use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::app::{FeedcastError, Result};
use crate::shortener::Shortener;

#[derive(Serialize)]
struct ShortenRequest<'a> {
    long_url: &'a str,
}

#[derive(Deserialize)]
struct ShortenResponse {
    link: String,
}

/// Bitly v4 client.
pub struct BitlyShortener {
    client: Client,
    api_base: String,
    token: String,
}

impl BitlyShortener {
    pub fn new(api_base: impl Into<String>, token: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }
}

#[async_trait]
impl Shortener for BitlyShortener {
    async fn shorten(&self, url: &str) -> Result<String> {
        let response = self
            .client
            .post(format!("{}/shorten", self.api_base))
            .bearer_auth(&self.token)
            .json(&ShortenRequest { long_url: url })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FeedcastError::Other(format!(
                "Bitly returned {}: {}",
                status, body
            )));
        }

        let body: ShortenResponse = response.json().await?;
        Ok(body.link)
    }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;

    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::{json, Value};

    use super::*;

    async fn spawn(router: Router) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        addr
    }

    #[tokio::test]
    async fn test_shorten() {
        let router = Router::new().route(
            "/v4/shorten",
            post(|headers: HeaderMap, Json(body): Json<Value>| async move {
                assert_eq!(headers["authorization"], "Bearer secret");
                assert_eq!(body["long_url"], "https://example.com/a");
                Json(json!({ "link": "https://bit.ly/xyz" }))
            }),
        );
        let addr = spawn(router).await;

        let shortener =
            BitlyShortener::new(format!("http://{}/v4", addr), "secret", Duration::from_secs(5))
                .unwrap();
        assert_eq!(
            shortener.shorten("https://example.com/a").await.unwrap(),
            "https://bit.ly/xyz"
        );
    }

    #[tokio::test]
    async fn test_error_status() {
        let router = Router::new().route(
            "/v4/shorten",
            post(|| async { (StatusCode::FORBIDDEN, "FORBIDDEN") }),
        );
        let addr = spawn(router).await;

        let shortener =
            BitlyShortener::new(format!("http://{}/v4", addr), "bad", Duration::from_secs(5))
                .unwrap();
        assert!(shortener.shorten("https://example.com/a").await.is_err());
    }
}
