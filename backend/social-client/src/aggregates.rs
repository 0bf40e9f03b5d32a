//! Post aggregates
//!
//! A post is cached in several places: under its own key and inside every
//! list of posts that contains it. Each aggregate field has exactly one
//! function that updates all of them; mutation sites call these and nothing
//! else.

use crate::error::ClientResult;
use crate::models::Post;
use query_cache::{CacheKey, Pages, QueryCache, WriteSource};
use uuid::Uuid;

/// Keys a post is cached under: its own key, then each list of posts holding it
pub fn post_cache_keys(cache: &QueryCache, post_id: Uuid) -> ClientResult<Vec<String>> {
    let mut keys = vec![CacheKey::post(post_id)];
    keys.extend(lists_containing(cache, post_id)?);
    Ok(keys)
}

fn lists_containing(cache: &QueryCache, post_id: Uuid) -> ClientResult<Vec<String>> {
    let mut keys = Vec::new();
    for key in cache.keys_with_prefix(&CacheKey::post_lists_prefix()) {
        let contains = cache
            .get::<Pages<Post>>(&key)?
            .is_some_and(|pages| pages.contains(|p| p.id == post_id));
        if contains {
            keys.push(key);
        }
    }
    Ok(keys)
}

/// Add `delta` to a post's comment count everywhere it is cached, floored at zero
pub fn adjust_comment_count(cache: &QueryCache, post_id: Uuid, delta: i64) -> ClientResult<()> {
    update_post(cache, post_id, |post| {
        post.comment_count = (post.comment_count + delta).max(0);
    })
}

/// Add `delta` to a post's like count and set the viewer's like flag when given
pub fn adjust_post_likes(
    cache: &QueryCache,
    post_id: Uuid,
    delta: i64,
    viewer_has_liked: Option<bool>,
) -> ClientResult<()> {
    update_post(cache, post_id, |post| {
        post.like_count = (post.like_count + delta).max(0);
        if let Some(liked) = viewer_has_liked {
            post.viewer_has_liked = liked;
        }
    })
}

fn update_post<F>(cache: &QueryCache, post_id: Uuid, apply: F) -> ClientResult<()>
where
    F: Fn(&mut Post),
{
    cache.update::<Post, _>(&CacheKey::post(post_id), WriteSource::Optimistic, |post| {
        apply(post)
    })?;

    for key in lists_containing(cache, post_id)? {
        cache.update::<Pages<Post>, _>(&key, WriteSource::Optimistic, |pages| {
            if let Some(post) = pages.find_mut(|p| p.id == post_id) {
                apply(post);
            }
        })?;
    }
    Ok(())
}
