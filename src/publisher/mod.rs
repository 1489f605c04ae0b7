//! Publishing to the target platform.
//!
//! # Architecture
//!
//! ```text
//! RenderedContent → Publisher (state machine) → Platform adapter → external id
//! ```
//!
//! [`Publisher`] owns the step order and failure rules; a [`Platform`]
//! only knows how to talk to one service:
//!
//! - [`WordPressPlatform`]: WordPress.com REST API, bearer token
//! - [`InstagramPlatform`]: Imgur for hosting, Graph API container + publish
//!
//! One-time authorization for WordPress lives in [`oauth`]; the resulting
//! token is cached by [`TokenCache`].

mod instagram;
pub mod oauth;
mod token;
mod wordpress;

pub use instagram::InstagramPlatform;
pub use oauth::OAuthClient;
pub use token::TokenCache;
pub use wordpress::WordPressPlatform;

use std::fmt;

use async_trait::async_trait;
use image::RgbImage;
use tracing::{debug, info, warn};

use crate::render::{encode_jpeg, RenderError, RenderedContent};

/// Where a publish attempt is, or where it stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishStage {
    Unauthenticated,
    Authenticated,
    MediaUploading,
    MediaUploaded,
    Publishing,
    Published,
    Failed,
}

impl fmt::Display for PublishStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PublishStage::Unauthenticated => "authentication",
            PublishStage::Authenticated => "authenticated",
            PublishStage::MediaUploading => "media upload",
            PublishStage::MediaUploaded => "media uploaded",
            PublishStage::Publishing => "publish",
            PublishStage::Published => "published",
            PublishStage::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PublishErrorKind {
    #[error("no valid credential")]
    Unauthenticated,

    #[error("entry has no image and {0} requires one")]
    MissingImage(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("unexpected response: {0}")]
    InvalidResponse(String),

    #[error(transparent)]
    Encode(#[from] RenderError),
}

/// A failed publish attempt and the stage it failed in.
#[derive(Debug, thiserror::Error)]
#[error("{stage} failed: {kind}")]
pub struct PublishError {
    pub stage: PublishStage,
    #[source]
    pub kind: PublishErrorKind,
}

/// Opaque reference to uploaded media.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaHandle {
    Id(String),
    Url(String),
}

#[derive(Debug, Clone)]
pub struct EncodedImage {
    pub bytes: Vec<u8>,
    pub file_name: &'static str,
    pub content_type: &'static str,
}

impl EncodedImage {
    pub fn jpeg(img: &RgbImage) -> Result<Self, RenderError> {
        Ok(Self {
            bytes: encode_jpeg(img)?,
            file_name: "image.jpg",
            content_type: "image/jpeg",
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PostDraft<'a> {
    pub title: &'a str,
    pub body: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishResult {
    pub success: bool,
    /// Post URL or post id
    pub external_id: Option<String>,
}

#[async_trait]
pub trait Platform: Send + Sync {
    fn name(&self) -> &str;

    /// Whether a credential is held. Checked before any network call.
    fn is_authenticated(&self) -> bool;

    /// Entries without an image are skipped instead of posted as text.
    fn requires_image(&self) -> bool;

    /// Exactly one upload call.
    async fn upload_media(&self, image: &EncodedImage) -> Result<MediaHandle, PublishErrorKind>;

    /// Create the post and return its durable identifier.
    async fn publish(
        &self,
        draft: &PostDraft<'_>,
        media: Option<&MediaHandle>,
    ) -> Result<String, PublishErrorKind>;
}

/// Tracks one attempt through the stages.
struct Attempt<'a> {
    platform: &'a str,
    stage: PublishStage,
}

impl<'a> Attempt<'a> {
    fn new(platform: &'a str) -> Self {
        Self {
            platform,
            stage: PublishStage::Unauthenticated,
        }
    }

    fn advance(&mut self, next: PublishStage) {
        debug!("{}: {} -> {}", self.platform, self.stage, next);
        self.stage = next;
    }

    fn fail(&self, kind: PublishErrorKind) -> PublishError {
        debug!("{}: {} -> {}", self.platform, self.stage, PublishStage::Failed);
        PublishError {
            stage: self.stage,
            kind,
        }
    }
}

/// Drives a [`Platform`] through auth check, optional media upload and
/// publish. Any failure aborts the attempt; nothing is retried here.
pub struct Publisher {
    platform: Box<dyn Platform>,
}

impl Publisher {
    pub fn new(platform: Box<dyn Platform>) -> Self {
        Self { platform }
    }

    pub fn platform_name(&self) -> &str {
        self.platform.name()
    }

    pub fn requires_image(&self) -> bool {
        self.platform.requires_image()
    }

    pub fn is_authenticated(&self) -> bool {
        self.platform.is_authenticated()
    }

    pub async fn publish(&self, content: &RenderedContent) -> Result<PublishResult, PublishError> {
        let mut attempt = Attempt::new(self.platform.name());

        if !self.platform.is_authenticated() {
            let err = attempt.fail(PublishErrorKind::Unauthenticated);
            warn!("Not publishing to {}: no valid credential", self.platform.name());
            return Err(err);
        }
        attempt.advance(PublishStage::Authenticated);

        let media = match &content.image {
            Some(img) => {
                attempt.advance(PublishStage::MediaUploading);
                let encoded = EncodedImage::jpeg(img).map_err(|e| attempt.fail(e.into()))?;
                let handle = self
                    .platform
                    .upload_media(&encoded)
                    .await
                    .map_err(|e| attempt.fail(e))?;
                attempt.advance(PublishStage::MediaUploaded);
                Some(handle)
            }
            None if self.platform.requires_image() => {
                return Err(attempt.fail(PublishErrorKind::MissingImage(
                    self.platform.name().to_string(),
                )));
            }
            None => None,
        };

        attempt.advance(PublishStage::Publishing);
        let draft = PostDraft {
            title: &content.title,
            body: &content.body,
        };
        let external_id = self
            .platform
            .publish(&draft, media.as_ref())
            .await
            .map_err(|e| attempt.fail(e))?;
        attempt.advance(PublishStage::Published);

        info!("Published to {}: {}", self.platform.name(), external_id);
        Ok(PublishResult {
            success: true,
            external_id: Some(external_id),
        })
    }
}

/// Pass successful responses through; turn anything else into `Rejected`.
pub(crate) async fn ensure_success(
    response: reqwest::Response,
) -> Result<reqwest::Response, PublishErrorKind> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(PublishErrorKind::Rejected {
        status: status.as_u16(),
        body,
    })
}

/// `application/x-www-form-urlencoded` body.
pub(crate) fn form_body(pairs: &[(&str, &str)]) -> String {
    url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(pairs.iter().copied())
        .finish()
}

/// Ids arrive as numbers from some APIs and strings from others.
pub(crate) fn id_string(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::{Arc, Mutex};

    use serde_json::json;

    use super::*;

    /// Records calls and fails on demand.
    pub(crate) struct FakePlatform {
        pub(crate) authenticated: bool,
        pub(crate) requires_image: bool,
        pub(crate) fail_upload: bool,
        pub(crate) fail_publish: bool,
        pub(crate) calls: Mutex<Vec<String>>,
    }

    impl Default for FakePlatform {
        fn default() -> Self {
            Self {
                authenticated: true,
                requires_image: false,
                fail_upload: false,
                fail_publish: false,
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Platform for FakePlatform {
        fn name(&self) -> &str {
            "fake"
        }

        fn is_authenticated(&self) -> bool {
            self.authenticated
        }

        fn requires_image(&self) -> bool {
            self.requires_image
        }

        async fn upload_media(&self, image: &EncodedImage) -> Result<MediaHandle, PublishErrorKind> {
            self.calls.lock().unwrap().push("upload".into());
            assert_eq!(image.content_type, "image/jpeg");
            if self.fail_upload {
                return Err(PublishErrorKind::Rejected {
                    status: 500,
                    body: "upload broke".into(),
                });
            }
            Ok(MediaHandle::Id("m-1".into()))
        }

        async fn publish(
            &self,
            draft: &PostDraft<'_>,
            media: Option<&MediaHandle>,
        ) -> Result<String, PublishErrorKind> {
            self.calls.lock().unwrap().push(format!(
                "publish:{}:{}",
                draft.title,
                media.map(|m| format!("{:?}", m)).unwrap_or_default()
            ));
            if self.fail_publish {
                return Err(PublishErrorKind::InvalidResponse("no id".into()));
            }
            Ok(format!("https://blog.example.com/{}", draft.title))
        }
    }

    fn content(with_image: bool) -> RenderedContent {
        RenderedContent {
            title: "post".into(),
            body: "<p>body</p>".into(),
            image: with_image.then(|| RgbImage::new(8, 8)),
        }
    }

    fn calls(platform: &FakePlatform) -> Vec<String> {
        platform.calls.lock().unwrap().clone()
    }

    #[tokio::test]
    async fn test_full_sequence_with_image() {
        let platform = Arc::new(FakePlatform::default());
        let publisher = Publisher::new(Box::new(SharedPlatform(platform.clone())));

        let result = publisher.publish(&content(true)).await.unwrap();
        assert!(result.success);
        assert_eq!(result.external_id.as_deref(), Some("https://blog.example.com/post"));
        assert_eq!(
            calls(&platform),
            vec!["upload".to_string(), "publish:post:Id(\"m-1\")".to_string()]
        );
    }

    #[tokio::test]
    async fn test_text_only_when_image_optional() {
        let platform = Arc::new(FakePlatform::default());
        let publisher = Publisher::new(Box::new(SharedPlatform(platform.clone())));

        publisher.publish(&content(false)).await.unwrap();
        assert_eq!(calls(&platform), vec!["publish:post:".to_string()]);
    }

    #[tokio::test]
    async fn test_unauthenticated_makes_no_calls() {
        let platform = Arc::new(FakePlatform {
            authenticated: false,
            ..Default::default()
        });
        let publisher = Publisher::new(Box::new(SharedPlatform(platform.clone())));

        let err = publisher.publish(&content(true)).await.unwrap_err();
        assert_eq!(err.stage, PublishStage::Unauthenticated);
        assert!(matches!(err.kind, PublishErrorKind::Unauthenticated));
        assert!(calls(&platform).is_empty());
    }

    #[tokio::test]
    async fn test_upload_failure_stops_before_publish() {
        let platform = Arc::new(FakePlatform {
            fail_upload: true,
            ..Default::default()
        });
        let publisher = Publisher::new(Box::new(SharedPlatform(platform.clone())));

        let err = publisher.publish(&content(true)).await.unwrap_err();
        assert_eq!(err.stage, PublishStage::MediaUploading);
        assert_eq!(calls(&platform), vec!["upload".to_string()]);
    }

    #[tokio::test]
    async fn test_publish_failure_after_upload() {
        let platform = Arc::new(FakePlatform {
            fail_publish: true,
            ..Default::default()
        });
        let publisher = Publisher::new(Box::new(SharedPlatform(platform.clone())));

        let err = publisher.publish(&content(true)).await.unwrap_err();
        assert_eq!(err.stage, PublishStage::Publishing);
        assert_eq!(calls(&platform).len(), 2);
    }

    #[tokio::test]
    async fn test_missing_required_image() {
        let platform = Arc::new(FakePlatform {
            requires_image: true,
            ..Default::default()
        });
        let publisher = Publisher::new(Box::new(SharedPlatform(platform.clone())));

        let err = publisher.publish(&content(false)).await.unwrap_err();
        assert!(matches!(err.kind, PublishErrorKind::MissingImage(_)));
        assert_eq!(err.stage, PublishStage::Authenticated);
        assert!(calls(&platform).is_empty());
    }

    #[test]
    fn test_id_string() {
        assert_eq!(id_string(&json!(42)), Some("42".into()));
        assert_eq!(id_string(&json!("17890")), Some("17890".into()));
        assert_eq!(id_string(&json!("")), None);
        assert_eq!(id_string(&json!(null)), None);
    }

    #[test]
    fn test_form_body() {
        assert_eq!(
            form_body(&[("caption", "a b&c"), ("access_token", "t")]),
            "caption=a+b%26c&access_token=t"
        );
    }

    /// Lets a test keep a handle on the fake after boxing it.
    pub(crate) struct SharedPlatform(pub(crate) Arc<FakePlatform>);

    #[async_trait]
    impl Platform for SharedPlatform {
        fn name(&self) -> &str {
            self.0.name()
        }

        fn is_authenticated(&self) -> bool {
            self.0.is_authenticated()
        }

        fn requires_image(&self) -> bool {
            self.0.requires_image()
        }

        async fn upload_media(&self, image: &EncodedImage) -> Result<MediaHandle, PublishErrorKind> {
            self.0.upload_media(image).await
        }

        async fn publish(
            &self,
            draft: &PostDraft<'_>,
            media: Option<&MediaHandle>,
        ) -> Result<String, PublishErrorKind> {
            self.0.publish(draft, media).await
        }
    }
}
