use feed_rs::model::{Entry, Feed as ParsedFeed, Link};
use feed_rs::parser;
use thiserror::Error;

use crate::storage::{FeedMetadata, RawPost};
use crate::util::strip_control_chars;

/// Title given to entries that carry none
const UNTITLED: &str = "Untitled";

#[derive(Debug, Error)]
pub enum ExtractionError {
    /// Content is not a feed document feed-rs understands
    #[error("Parse error: {0}")]
    Parse(String),
    /// An entry has neither an id nor a link to identify it by
    #[error("Entry {index} (\"{title}\") has no id or link")]
    MissingIdentity { index: usize, title: String },
}

/// Turns feed document bytes into metadata and posts.
pub trait Extractor: Send + Sync + 'static {
    fn extract_metadata(&self, bytes: &[u8]) -> Result<FeedMetadata, ExtractionError>;

    fn extract_posts(&self, bytes: &[u8]) -> Result<Vec<RawPost>, ExtractionError>;

    /// Both halves at once. Implementations may override this to parse once.
    fn extract(&self, bytes: &[u8]) -> Result<(FeedMetadata, Vec<RawPost>), ExtractionError> {
        Ok((self.extract_metadata(bytes)?, self.extract_posts(bytes)?))
    }
}

/// [`Extractor`] for RSS 0.9x/1.0/2.0, Atom and JSON Feed via `feed-rs`
#[derive(Debug, Clone, Copy, Default)]
pub struct FeedRsExtractor;

impl FeedRsExtractor {
    fn parse(bytes: &[u8]) -> Result<ParsedFeed, ExtractionError> {
        // feed-rs would otherwise invent ids (link hash or random UUID) for
        // entries without one; an empty id lets `raw_post` fall back to the link
        parser::Builder::new()
            .id_generator(|_, _, _| String::new())
            .build()
            .parse(bytes)
            .map_err(|e| ExtractionError::Parse(e.to_string()))
    }
}

impl Extractor for FeedRsExtractor {
    fn extract_metadata(&self, bytes: &[u8]) -> Result<FeedMetadata, ExtractionError> {
        Ok(metadata_of(&Self::parse(bytes)?))
    }

    fn extract_posts(&self, bytes: &[u8]) -> Result<Vec<RawPost>, ExtractionError> {
        posts_of(Self::parse(bytes)?)
    }

    fn extract(&self, bytes: &[u8]) -> Result<(FeedMetadata, Vec<RawPost>), ExtractionError> {
        let feed = Self::parse(bytes)?;
        let metadata = metadata_of(&feed);
        Ok((metadata, posts_of(feed)?))
    }
}

fn clean(s: &str) -> String {
    strip_control_chars(s).trim().to_string()
}

fn metadata_of(feed: &ParsedFeed) -> FeedMetadata {
    let title = feed
        .title
        .as_ref()
        .map(|t| clean(&t.content))
        .unwrap_or_default();

    // Channel-level author first, then whoever wrote the first entry
    let author = feed
        .authors
        .iter()
        .chain(feed.entries.iter().flat_map(|e| e.authors.iter()))
        .map(|p| clean(&p.name))
        .find(|name| !name.is_empty())
        .unwrap_or_default();

    let website_url = website_link(&feed.links)
        .map(|l| l.href.trim().to_string())
        .unwrap_or_default();

    FeedMetadata {
        title,
        author,
        website_url,
    }
}

/// The link pointing at the website rather than at the feed itself
fn website_link(links: &[Link]) -> Option<&Link> {
    links
        .iter()
        .find(|l| l.rel.as_deref() == Some("alternate"))
        .or_else(|| {
            links
                .iter()
                .find(|l| !matches!(l.rel.as_deref(), Some("self") | Some("hub")))
        })
}

fn posts_of(feed: ParsedFeed) -> Result<Vec<RawPost>, ExtractionError> {
    feed.entries
        .into_iter()
        .enumerate()
        .map(|(index, entry)| raw_post(index, entry))
        .collect()
}

fn raw_post(index: usize, entry: Entry) -> Result<RawPost, ExtractionError> {
    let url = entry
        .links
        .iter()
        .find(|l| l.rel.as_deref() != Some("self"))
        .or(entry.links.first())
        .map(|l| l.href.trim().to_string())
        .filter(|href| !href.is_empty());

    let title = entry
        .title
        .map(|t| clean(&t.content))
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| UNTITLED.to_string());

    let key = match entry.id.trim() {
        "" => url.clone().ok_or_else(|| ExtractionError::MissingIdentity {
            index,
            title: title.clone(),
        })?,
        id => id.to_string(),
    };

    let content = entry
        .content
        .and_then(|c| c.body)
        .or_else(|| entry.summary.map(|s| s.content))
        .map(|body| strip_control_chars(&body).into_owned());

    let published = entry.published.or(entry.updated).map(|dt| dt.timestamp());

    Ok(RawPost {
        key,
        title,
        content,
        url,
        published,
    })
}
