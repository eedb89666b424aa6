use std::collections::HashMap;

use crate::storage::{Post, RawPost};

/// Result of reconciling a freshly extracted post list with the stored one
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Merge {
    /// Full replacement post set for the feed, in incoming order
    pub posts: Vec<Post>,
    /// Distinct incoming keys that were not stored before
    pub new_count: usize,
}

/// Compute the next stored post set of `feed_id`.
///
/// Posts are matched on their identity key. A matched post keeps its stored
/// `id`, `feed_id` and `first_seen` and takes every other field from the
/// incoming version. Unmatched incoming posts are new (`id = None`,
/// `first_seen = now`). Stored posts absent from `incoming` are not carried
/// over.
///
/// When `incoming` repeats a key, the last occurrence provides the payload and
/// the post stays at the position of the first occurrence.
pub fn merge(feed_id: i64, existing: &[Post], incoming: Vec<RawPost>, now: i64) -> Merge {
    let stored: HashMap<&str, &Post> = existing.iter().map(|p| (p.key.as_str(), p)).collect();

    let mut positions: HashMap<String, usize> = HashMap::with_capacity(incoming.len());
    let mut posts: Vec<Post> = Vec::with_capacity(incoming.len());
    let mut new_count = 0;

    for raw in incoming {
        let previous = stored.get(raw.key.as_str());
        let post = Post {
            id: previous.and_then(|p| p.id),
            feed_id,
            first_seen: previous.map_or(now, |p| p.first_seen),
            key: raw.key,
            title: raw.title,
            content: raw.content,
            url: raw.url,
            published: raw.published,
        };

        match positions.get(&post.key) {
            Some(&index) => posts[index] = post,
            None => {
                if previous.is_none() {
                    new_count += 1;
                }
                positions.insert(post.key.clone(), posts.len());
                posts.push(post);
            }
        }
    }

    Merge { posts, new_count }
}
