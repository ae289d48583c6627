use std::sync::Arc;

use crate::error::PosterError;
use crate::models::{PostResult, SessionKey, StagedImage};
use crate::services::auth_flow::AuthFlow;
use crate::services::metrics;
use crate::services::provider_client::ProviderClient;

/// Publishes posts on behalf of an authorized session.
pub struct Poster {
    provider: Arc<ProviderClient>,
    auth: Arc<AuthFlow>,
}

impl Poster {
    pub fn new(provider: Arc<ProviderClient>, auth: Arc<AuthFlow>) -> Self {
        Self { provider, auth }
    }

    /// Post `caption` (and `image`, if any) with the session's access token.
    ///
    /// Fails with [`PosterError::NotAuthenticated`] before any network call
    /// when the session holds no token.
    #[tracing::instrument(skip_all, fields(session = %session, has_image = image.is_some()))]
    pub async fn post(
        &self,
        session: &SessionKey,
        caption: &str,
        image: Option<StagedImage>,
    ) -> Result<PostResult, PosterError> {
        let token = match self.auth.access_token(session).await {
            Ok(token) => token,
            Err(e) => {
                metrics::record_post("web", e.kind());
                return Err(e);
            }
        };

        let result = self.publish(&token.access_token, caption, image).await;
        metrics::record_post(
            "web",
            match &result {
                Ok(_) => "success",
                Err(e) => e.kind(),
            },
        );
        result
    }

    /// Upload the image (if any), then create the post.
    ///
    /// A failed upload ends the attempt; the caption is never posted alone.
    /// `image` is dropped, and its temporary file deleted, before this returns.
    pub async fn publish(
        &self,
        access_token: &str,
        caption: &str,
        image: Option<StagedImage>,
    ) -> Result<PostResult, PosterError> {
        let media_id = match image {
            Some(image) => {
                let uploaded = self.provider.upload_media(access_token, &image).await;
                drop(image);
                Some(uploaded?)
            }
            None => None,
        };

        let created = self
            .provider
            .create_post(access_token, caption, media_id.as_deref())
            .await?;

        let result = PostResult(created);
        tracing::info!(post_id = ?result.post_id(), "Post created");
        Ok(result)
    }
}
