use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::info;

use crate::app::Result;
use crate::config::InstagramConfig;
use crate::publisher::{
    ensure_success, form_body, id_string, EncodedImage, MediaHandle, Platform, PostDraft,
    PublishErrorKind,
};

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

#[derive(Deserialize)]
struct ImgurResponse {
    #[serde(default)]
    success: bool,
    data: Option<ImgurImage>,
}

#[derive(Deserialize)]
struct ImgurImage {
    link: Option<String>,
}

#[derive(Deserialize)]
struct GraphResponse {
    id: Option<Value>,
}

/// Instagram Graph API. The image is hosted on Imgur first because the
/// Graph API only accepts image URLs; publishing is a container creation
/// followed by `media_publish`.
pub struct InstagramPlatform {
    client: Client,
    graph_base: String,
    imgur_base: String,
    user_id: String,
    access_token: Option<String>,
    imgur_client_id: String,
}

impl InstagramPlatform {
    pub fn new(config: &InstagramConfig, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            graph_base: config.graph_base.trim_end_matches('/').to_string(),
            imgur_base: config.imgur_base.trim_end_matches('/').to_string(),
            user_id: config.user_id.clone(),
            access_token: config
                .access_token
                .clone()
                .filter(|t| !t.trim().is_empty()),
            imgur_client_id: config.imgur_client_id.clone(),
        })
    }

    fn token(&self) -> std::result::Result<&str, PublishErrorKind> {
        self.access_token
            .as_deref()
            .ok_or(PublishErrorKind::Unauthenticated)
    }

    async fn graph_post(
        &self,
        endpoint: &str,
        fields: &[(&str, &str)],
    ) -> std::result::Result<String, PublishErrorKind> {
        let response = self
            .client
            .post(format!("{}/{}/{}", self.graph_base, self.user_id, endpoint))
            .header(CONTENT_TYPE, FORM_CONTENT_TYPE)
            .body(form_body(fields))
            .send()
            .await?;
        let body: GraphResponse = ensure_success(response).await?.json().await?;

        body.id
            .as_ref()
            .and_then(id_string)
            .ok_or_else(|| PublishErrorKind::InvalidResponse(format!("{} returned no id", endpoint)))
    }
}

#[async_trait]
impl Platform for InstagramPlatform {
    fn name(&self) -> &str {
        "instagram"
    }

    fn is_authenticated(&self) -> bool {
        self.access_token.is_some() && !self.imgur_client_id.is_empty()
    }

    fn requires_image(&self) -> bool {
        true
    }

    async fn upload_media(
        &self,
        image: &EncodedImage,
    ) -> std::result::Result<MediaHandle, PublishErrorKind> {
        let part = Part::bytes(image.bytes.clone())
            .file_name(image.file_name)
            .mime_str(image.content_type)?;

        let response = self
            .client
            .post(format!("{}/image", self.imgur_base))
            .header("Authorization", format!("Client-ID {}", self.imgur_client_id))
            .multipart(Form::new().part("image", part))
            .send()
            .await?;
        let body: ImgurResponse = ensure_success(response).await?.json().await?;

        let link = body
            .data
            .and_then(|d| d.link)
            .filter(|link| body.success && !link.is_empty())
            .ok_or_else(|| PublishErrorKind::InvalidResponse("Imgur upload unsuccessful".into()))?;

        info!("Image uploaded to Imgur: {}", link);
        Ok(MediaHandle::Url(link))
    }

    async fn publish(
        &self,
        draft: &PostDraft<'_>,
        media: Option<&MediaHandle>,
    ) -> std::result::Result<String, PublishErrorKind> {
        let token = self.token()?;
        let image_url = match media {
            Some(MediaHandle::Url(url)) => url,
            _ => {
                return Err(PublishErrorKind::InvalidResponse(
                    "Instagram needs a hosted image URL".into(),
                ))
            }
        };

        let container = self
            .graph_post(
                "media",
                &[
                    ("image_url", image_url.as_str()),
                    ("caption", draft.body),
                    ("access_token", token),
                ],
            )
            .await?;
        info!("Instagram media container created: {}", container);

        self.graph_post(
            "media_publish",
            &[("creation_id", container.as_str()), ("access_token", token)],
        )
        .await
    }
}
