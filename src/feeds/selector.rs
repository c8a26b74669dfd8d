use chrono::{DateTime, Utc};
use quick_xml::escape::{resolve_html5_entity, unescape_with};
use std::borrow::Cow;

use super::{Feed, FeedItem};

// Longest HTML5 entity name is 31 characters, plus '&' and ';'.
const MAX_REFERENCE_LEN: usize = 33;

/// Returns every item published strictly after `since`, with decoded titles.
///
/// Feeds are walked in the given order and items in document order; nothing is
/// sorted or deduplicated. Items without a publish time are never new.
pub fn select_new_posts(feeds: &[Feed], since: DateTime<Utc>) -> Vec<FeedItem> {
    feeds
        .iter()
        .flat_map(|feed| feed.items.iter())
        .filter(|item| matches!(item.published, Some(published) if published > since))
        .map(|item| FeedItem {
            title: decode_html_entities(&item.title).into_owned(),
            link: item.link.clone(),
            published: item.published,
        })
        .collect()
}

/// Replaces HTML character references (`&amp;`, `&hellip;`, `&#8217;`,
/// `&#x2014;`) with the characters they stand for.
///
/// References that do not resolve, and bare ampersands, are kept as they are.
pub fn decode_html_entities(raw: &str) -> Cow<'_, str> {
    if !raw.contains('&') {
        return Cow::Borrowed(raw);
    }

    let mut decoded = String::with_capacity(raw.len());
    let mut rest = raw;

    while let Some(start) = rest.find('&') {
        decoded.push_str(&rest[..start]);
        let candidate = &rest[start..];

        let resolved = reference_end(candidate).and_then(|end| {
            unescape_with(&candidate[..=end], resolve_html5_entity)
                .ok()
                .map(|text| (end, text))
        });

        match resolved {
            Some((end, text)) => {
                decoded.push_str(&text);
                rest = &candidate[end + 1..];
            }
            None => {
                decoded.push('&');
                rest = &candidate[1..];
            }
        }
    }

    decoded.push_str(rest);
    Cow::Owned(decoded)
}

/// Byte offset of the `;` closing the reference that starts `candidate`.
fn reference_end(candidate: &str) -> Option<usize> {
    candidate
        .char_indices()
        .skip(1)
        .take(MAX_REFERENCE_LEN)
        .find_map(|(i, c)| match c {
            ';' => Some(Some(i)),
            c if c.is_ascii_alphanumeric() || c == '#' => None,
            _ => Some(None),
        })
        .flatten()
}
