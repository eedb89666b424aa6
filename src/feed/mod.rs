//! Adapters around the network and the feed wire format.
//!
//! - [`fetcher`] - HTTP retrieval with timeout, retry and size limits
//! - [`extractor`] - RSS/Atom/JSON Feed parsing via `feed-rs`
//!
//! Both are traits so the synchronization pipeline can be driven by fakes in
//! tests and by other transports later.

mod extractor;
mod fetcher;

pub use extractor::{ExtractionError, Extractor, FeedRsExtractor};
pub use fetcher::{FetchError, FetchOptions, Fetcher, HttpFetcher};
