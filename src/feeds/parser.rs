use feed_rs::parser;

use super::{Feed, FeedItem};

#[derive(thiserror::Error, Debug)]
#[error("Failed to parse feed: {0}")]
pub struct ParseError(#[from] parser::ParseFeedError);

/// Parses an RSS, Atom or JSON feed document.
pub fn parse(raw: &str) -> Result<Feed, ParseError> {
    let feed = parser::parse(raw.as_bytes())?;

    let items = feed
        .entries
        .into_iter()
        .map(|entry| FeedItem {
            title: entry.title.map(|t| t.content).unwrap_or_default(),
            link: entry
                .links
                .into_iter()
                .next()
                .map(|l| l.href)
                .unwrap_or_default(),
            published: entry.published.or(entry.updated),
        })
        .collect();

    Ok(Feed {
        title: feed.title.map(|t| t.content),
        items,
    })
}
