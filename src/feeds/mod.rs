//! Reading the configured feeds.
//!
//! - [`fetcher`] downloads feed documents, conditionally on the watermark
//! - [`parser`] turns a document into a [`Feed`]
//! - [`selector`] picks the posts that are newer than the watermark

mod fetcher;
mod parser;
mod selector;

use chrono::{DateTime, Utc};

pub use fetcher::{FeedClient, FetchError};
pub use parser::{parse, ParseError};
pub use selector::{decode_html_entities, select_new_posts};

/// A parsed feed. Items keep the order of the source document.
#[derive(Debug, Clone, PartialEq)]
pub struct Feed {
    pub title: Option<String>,
    pub items: Vec<FeedItem>,
}

/// One entry of a feed, as it appears in the source. Also used for the posts
/// handed to a mailout, after their titles have been decoded.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct FeedItem {
    pub title: String,
    pub link: String,
    /// `None` when the feed gave no date or one that could not be parsed.
    pub published: Option<DateTime<Utc>>,
}
