use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use crate::app::Result;
use crate::config::WordPressConfig;
use crate::publisher::{
    ensure_success, id_string, EncodedImage, MediaHandle, Platform, PostDraft, PublishErrorKind,
};

#[derive(Deserialize)]
struct MediaResponse {
    #[serde(default)]
    media: Vec<MediaItem>,
}

#[derive(Deserialize)]
struct MediaItem {
    #[serde(rename = "ID")]
    id: Value,
    #[serde(rename = "URL")]
    url: Option<String>,
}

#[derive(Deserialize)]
struct PostResponse {
    #[serde(rename = "URL")]
    url: Option<String>,
}

/// WordPress.com REST v1.1: upload to the media library, then create a
/// published post with the upload as featured image.
pub struct WordPressPlatform {
    client: Client,
    site_api: String,
    token: Option<String>,
}

impl WordPressPlatform {
    pub fn new(config: &WordPressConfig, token: Option<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            site_api: format!(
                "{}/sites/{}",
                config.api_base.trim_end_matches('/'),
                config.site_host()
            ),
            token: token.filter(|t| !t.trim().is_empty()),
        })
    }

    fn token(&self) -> std::result::Result<&str, PublishErrorKind> {
        self.token.as_deref().ok_or(PublishErrorKind::Unauthenticated)
    }
}

#[async_trait]
impl Platform for WordPressPlatform {
    fn name(&self) -> &str {
        "wordpress"
    }

    fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    fn requires_image(&self) -> bool {
        false
    }

    async fn upload_media(
        &self,
        image: &EncodedImage,
    ) -> std::result::Result<MediaHandle, PublishErrorKind> {
        let part = Part::bytes(image.bytes.clone())
            .file_name(image.file_name)
            .mime_str(image.content_type)?;
        let form = Form::new().part("media[]", part);

        let response = self
            .client
            .post(format!("{}/media/new", self.site_api))
            .bearer_auth(self.token()?)
            .multipart(form)
            .send()
            .await?;
        let body: MediaResponse = ensure_success(response).await?.json().await?;

        let item = body
            .media
            .into_iter()
            .next()
            .ok_or_else(|| PublishErrorKind::InvalidResponse("no media in upload response".into()))?;
        let id = id_string(&item.id)
            .ok_or_else(|| PublishErrorKind::InvalidResponse("media without ID".into()))?;

        info!(
            "Image uploaded to WordPress: {}",
            item.url.as_deref().unwrap_or(&id)
        );
        Ok(MediaHandle::Id(id))
    }

    async fn publish(
        &self,
        draft: &PostDraft<'_>,
        media: Option<&MediaHandle>,
    ) -> std::result::Result<String, PublishErrorKind> {
        let mut post = json!({
            "title": draft.title,
            "content": draft.body,
            "status": "publish",
        });
        if let Some(MediaHandle::Id(id)) = media {
            post["featured_image"] = Value::String(id.clone());
        }

        let response = self
            .client
            .post(format!("{}/posts/new", self.site_api))
            .bearer_auth(self.token()?)
            .json(&post)
            .send()
            .await?;
        let body: PostResponse = ensure_success(response).await?.json().await?;

        body.url
            .filter(|u| !u.is_empty())
            .ok_or_else(|| PublishErrorKind::InvalidResponse("post without URL".into()))
    }
}
