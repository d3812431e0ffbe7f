//! Graph API read calls
//!
//! `list_posts` issues one `/me/media` request, then one `/{id}/children`
//! request per carousel album. The children requests run concurrently and a
//! failed expansion only empties that album's children. Items of a media type
//! this service does not serve are skipped.

use futures_util::future::join_all;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::media::{MediaChild, MediaType, Page, Post, RawMedia, RawMediaType};

/// Fields requested for each listed media item
pub const MEDIA_FIELDS: &str = "id,caption,media_type,media_url,permalink,timestamp,username";

/// Fields requested for each carousel child
pub const CHILD_FIELDS: &str = "id,media_type,media_url";

/// Number of posts listed when not configured
pub const DEFAULT_POST_LIMIT: u32 = 12;

/// Read client for the Graph API.
#[derive(Clone)]
pub struct GraphClient {
    http: reqwest::Client,
    base_url: String,
}

impl GraphClient {
    /// `base_url` is the Graph API root, e.g. `https://graph.instagram.com`.
    pub fn new(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { http, base_url }
    }

    /// List the `limit` most recent posts, carousels expanded.
    ///
    /// Fails only when the listing call itself fails.
    pub async fn list_posts(&self, token: &str, limit: u32) -> Result<Vec<Post>> {
        let url = format!("{}/me/media", self.base_url);
        let limit = limit.to_string();
        let page: Page<RawMedia> = self
            .get_json(
                &url,
                &[
                    ("fields", MEDIA_FIELDS),
                    ("access_token", token),
                    ("limit", limit.as_str()),
                ],
            )
            .await?;

        debug!(items = page.data.len(), "listed media");

        let items = page
            .data
            .into_iter()
            .filter_map(|item| match item.media_type {
                RawMediaType::Known(media_type) => Some((media_type, item)),
                RawMediaType::Unknown(ref name) => {
                    warn!(post_id = %item.id, media_type = %name, "skipping unsupported media type");
                    metrics::counter!("feed_unsupported_media_total").increment(1);
                    None
                }
            });

        let posts =
            join_all(items.map(|(media_type, item)| self.expand(token, media_type, item))).await;
        Ok(posts)
    }

    /// Fetch the slides of a carousel album.
    pub async fn fetch_children(&self, token: &str, media_id: &str) -> Result<Vec<MediaChild>> {
        let url = format!("{}/{media_id}/children", self.base_url);
        let page: Page<MediaChild> = self
            .get_json(&url, &[("fields", CHILD_FIELDS), ("access_token", token)])
            .await?;
        Ok(page.data)
    }

    async fn expand(&self, token: &str, media_type: MediaType, item: RawMedia) -> Post {
        if media_type != MediaType::CarouselAlbum {
            return item.into_post(media_type, None);
        }

        match self.fetch_children(token, &item.id).await {
            Ok(children) => item.into_post(media_type, Some(children)),
            Err(e) => {
                warn!(post_id = %item.id, error = %e, "failed to fetch carousel children");
                metrics::counter!("feed_carousel_expansion_failures_total").increment(1);
                item.into_post(media_type, None)
            }
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str, query: &[(&str, &str)]) -> Result<T> {
        let response = self
            .http
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|e| Error::Http(e.without_url().to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| String::from("<no body>"));
            return Err(Error::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|e| Error::Payload(e.without_url().to_string()))
    }
}
