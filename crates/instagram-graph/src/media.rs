//! Media types served to the gallery
//!
//! A `Post` carries either a single `media_url` (IMAGE, VIDEO) or an ordered
//! list of `children` (CAROUSEL_ALBUM), never both. The choice is encoded in
//! `PostMedia`, which also produces the `media_type` field on the wire:
//!
//! ```json
//! {"id":"1","caption":"","media_type":"IMAGE","media_url":"https://...",
//!  "permalink":"https://...","timestamp":"2025-01-15T10:30:00+0000","username":"detailer"}
//! ```

use serde::{Deserialize, Serialize};

/// Graph API `media_type` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MediaType {
    Image,
    Video,
    CarouselAlbum,
}

/// One slide of a carousel album.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaChild {
    pub id: String,
    pub media_type: MediaType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_url: Option<String>,
}

/// Media payload of a post, tagged by `media_type`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "media_type")]
pub enum PostMedia {
    #[serde(rename = "IMAGE")]
    Image { media_url: String },
    #[serde(rename = "VIDEO")]
    Video { media_url: String },
    #[serde(rename = "CAROUSEL_ALBUM")]
    CarouselAlbum { children: Vec<MediaChild> },
}

/// A post as returned by `/api/instagram`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Post {
    pub id: String,
    /// Empty when the post has no caption
    pub caption: String,
    #[serde(flatten)]
    pub media: PostMedia,
    pub permalink: String,
    pub timestamp: String,
    pub username: String,
}

impl Post {
    pub fn media_type(&self) -> MediaType {
        match self.media {
            PostMedia::Image { .. } => MediaType::Image,
            PostMedia::Video { .. } => MediaType::Video,
            PostMedia::CarouselAlbum { .. } => MediaType::CarouselAlbum,
        }
    }

    /// Media URL of a single-media post; `None` for carousels.
    pub fn media_url(&self) -> Option<&str> {
        match &self.media {
            PostMedia::Image { media_url } | PostMedia::Video { media_url } => Some(media_url),
            PostMedia::CarouselAlbum { .. } => None,
        }
    }

    /// Slides of a carousel; `None` for single-media posts.
    pub fn children(&self) -> Option<&[MediaChild]> {
        match &self.media {
            PostMedia::CarouselAlbum { children } => Some(children),
            _ => None,
        }
    }
}

/// Envelope of Graph API list responses: `{"data": [...], "paging": {...}}`.
#[derive(Debug, Deserialize)]
pub(crate) struct Page<T> {
    #[serde(default = "Vec::new")]
    pub data: Vec<T>,
}

/// `media_type` of a listed item. Types this service does not serve are kept
/// by name so the item can be skipped without failing the listing.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub(crate) enum RawMediaType {
    Known(MediaType),
    Unknown(String),
}

/// A `/me/media` item as returned upstream.
#[derive(Debug, Deserialize)]
pub(crate) struct RawMedia {
    pub id: String,
    #[serde(default)]
    pub caption: Option<String>,
    pub media_type: RawMediaType,
    #[serde(default)]
    pub media_url: Option<String>,
    #[serde(default)]
    pub permalink: String,
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub username: String,
}

impl RawMedia {
    /// Build the served post as `media_type`. `children` is only used for
    /// carousels, where `None` (expansion not available) becomes an empty list.
    pub(crate) fn into_post(
        self,
        media_type: MediaType,
        children: Option<Vec<MediaChild>>,
    ) -> Post {
        let media = match media_type {
            MediaType::Image => PostMedia::Image {
                media_url: self.media_url.unwrap_or_default(),
            },
            MediaType::Video => PostMedia::Video {
                media_url: self.media_url.unwrap_or_default(),
            },
            MediaType::CarouselAlbum => PostMedia::CarouselAlbum {
                children: children.unwrap_or_default(),
            },
        };
        Post {
            id: self.id,
            caption: self.caption.unwrap_or_default(),
            media,
            permalink: self.permalink,
            timestamp: self.timestamp,
            username: self.username,
        }
    }
}
