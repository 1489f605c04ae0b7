//! One-time OAuth2 authorization-code flow for WordPress.com.
//!
//! The flow is: open [`OAuthClient::authorization_url`] in a browser, catch
//! the redirect with [`OAuthClient::wait_for_code`] on a local port, then
//! trade the code for a bearer token with [`OAuthClient::exchange_code`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Query, State};
use axum::response::Html;
use axum::routing::get;
use axum::Router;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::{debug, info};
use url::Url;

use crate::app::{FeedcastError, Result};
use crate::config::WordPressConfig;
use crate::publisher::form_body;

pub const DEFAULT_CALLBACK_TIMEOUT: Duration = Duration::from_secs(120);

const SCOPE: &str = "posts media";

/// Host of the redirect URI. The callback listener binds the same name so
/// the browser reaches it whichever address `localhost` resolves to first.
const REDIRECT_HOST: &str = "localhost";

const SUCCESS_PAGE: &str = "<html><body style='font-family: sans-serif; text-align: center; padding: 50px;'>\
<h1>Authorization successful</h1><p>You can close this window now.</p></body></html>";

const FAILURE_PAGE: &str = "<html><body style='font-family: sans-serif; text-align: center; padding: 50px;'>\
<h1>Authorization failed</h1><p>No authorization code received. Please try again.</p></body></html>";

#[derive(Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
}

/// First callback wins; later requests find the slot empty.
type CodeSlot = Arc<Mutex<Option<oneshot::Sender<Option<String>>>>>;

pub struct OAuthClient {
    client: Client,
    oauth_base: String,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
}

impl OAuthClient {
    pub fn wordpress(config: &WordPressConfig, port: u16, timeout: Duration) -> Result<Self> {
        if config.client_id.is_empty() || config.client_secret.is_empty() {
            return Err(FeedcastError::Auth(
                "wordpress.client_id and wordpress.client_secret must be set".into(),
            ));
        }

        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            oauth_base: config.oauth_base.trim_end_matches('/').to_string(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            redirect_uri: format!("http://{}:{}", REDIRECT_HOST, port),
        })
    }

    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    pub fn authorization_url(&self) -> Result<Url> {
        let url = Url::parse_with_params(
            &format!("{}/authorize", self.oauth_base),
            &[
                ("client_id", self.client_id.as_str()),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("response_type", "code"),
                ("scope", SCOPE),
            ],
        )?;
        Ok(url)
    }

    /// Bind the local listener the redirect URI points at.
    pub async fn bind_callback(port: u16) -> Result<TcpListener> {
        let listener = TcpListener::bind((REDIRECT_HOST, port)).await?;
        debug!("Callback listener on {}", listener.local_addr()?);
        Ok(listener)
    }

    /// Serve the redirect target until one callback arrives or `timeout`
    /// elapses. The listener is shut down either way.
    pub async fn wait_for_code(listener: TcpListener, timeout: Duration) -> Result<String> {
        let (code_tx, code_rx) = oneshot::channel();
        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let slot: CodeSlot = Arc::new(Mutex::new(Some(code_tx)));

        let app = Router::new().route("/", get(callback)).with_state(slot);
        let server = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = stop_rx.await;
                })
                .await
        });

        let outcome = tokio::time::timeout(timeout, code_rx).await;

        let _ = stop_tx.send(());
        if tokio::time::timeout(Duration::from_secs(2), server).await.is_err() {
            debug!("Callback listener did not shut down in time");
        }

        match outcome {
            Ok(Ok(Some(code))) => Ok(code),
            Ok(Ok(None)) => Err(FeedcastError::Auth(
                "callback did not include an authorization code".into(),
            )),
            Ok(Err(_)) => Err(FeedcastError::Auth("callback listener stopped".into())),
            Err(_) => Err(FeedcastError::Auth(format!(
                "no authorization callback within {}s",
                timeout.as_secs()
            ))),
        }
    }

    pub async fn exchange_code(&self, code: &str) -> Result<String> {
        let body = form_body(&[
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("code", code),
            ("grant_type", "authorization_code"),
            ("redirect_uri", self.redirect_uri.as_str()),
        ]);

        let response = self
            .client
            .post(format!("{}/token", self.oauth_base))
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(FeedcastError::Auth(format!(
                "token exchange failed with status {}: {}",
                status.as_u16(),
                text
            )));
        }

        let token: TokenResponse = response.json().await?;
        let token = token
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| FeedcastError::Auth("token response without access_token".into()))?;

        info!("Authorization successful");
        Ok(token)
    }
}

async fn callback(
    State(slot): State<CodeSlot>,
    Query(params): Query<HashMap<String, String>>,
) -> Html<&'static str> {
    let code = params.get("code").filter(|c| !c.is_empty()).cloned();
    let page = if code.is_some() {
        SUCCESS_PAGE
    } else {
        FAILURE_PAGE
    };

    let sender = slot.lock().ok().and_then(|mut s| s.take());
    if let Some(tx) = sender {
        let _ = tx.send(code);
    }

    Html(page)
}
