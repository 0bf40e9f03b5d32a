//! Comment nesting
//!
//! Flat comment rows become a reply forest in one pass: every row is indexed
//! by id, then linked under its parent or, when the parent is missing (not
//! loaded yet, deleted, or on another page), kept as a root.

use crate::models::{Comment, CommentId};
use std::collections::{HashMap, HashSet};

/// Comment with its direct replies
#[derive(Debug, Clone, PartialEq)]
pub struct CommentNode {
    pub comment: Comment,
    pub replies: Vec<CommentNode>,
}

impl CommentNode {
    /// This comment plus every reply below it
    pub fn total(&self) -> usize {
        1 + self.replies.iter().map(CommentNode::total).sum::<usize>()
    }
}

/// Comment at a display depth
#[derive(Debug, Clone, PartialEq)]
pub struct ThreadEntry {
    pub depth: usize,
    pub comment: Comment,
}

/// Build the reply forest, keeping input order among siblings
pub fn build_thread(comments: Vec<Comment>) -> Vec<CommentNode> {
    let index: HashMap<CommentId, usize> = comments
        .iter()
        .enumerate()
        .map(|(i, c)| (c.id.clone(), i))
        .collect();

    let mut children: Vec<Vec<usize>> = vec![Vec::new(); comments.len()];
    let mut roots = Vec::new();
    for (i, comment) in comments.iter().enumerate() {
        match comment.parent_comment_id.as_ref().and_then(|p| index.get(p)) {
            Some(&parent) if parent != i => children[parent].push(i),
            _ => roots.push(i),
        }
    }

    let mut slots: Vec<Option<Comment>> = comments.into_iter().map(Some).collect();
    let mut placed = HashSet::new();
    let mut forest: Vec<CommentNode> = roots
        .into_iter()
        .filter_map(|i| assemble(i, &children, &mut slots, &mut placed))
        .collect();

    // Rows on a parent cycle are unreachable from any root; surface them as roots
    for i in 0..slots.len() {
        if let Some(node) = assemble(i, &children, &mut slots, &mut placed) {
            forest.push(node);
        }
    }
    forest
}

fn assemble(
    i: usize,
    children: &[Vec<usize>],
    slots: &mut [Option<Comment>],
    placed: &mut HashSet<usize>,
) -> Option<CommentNode> {
    if !placed.insert(i) {
        return None;
    }
    let comment = slots[i].take()?;
    let replies = children[i]
        .iter()
        .filter_map(|&child| assemble(child, children, slots, placed))
        .collect();
    Some(CommentNode { comment, replies })
}

/// Depth-first listing with depth capped at `max_depth`
///
/// Replies deeper than the cap are shown at the cap, in thread order.
pub fn flatten_thread(nodes: &[CommentNode], max_depth: usize) -> Vec<ThreadEntry> {
    let mut out = Vec::new();
    for node in nodes {
        push_entries(node, 0, max_depth, &mut out);
    }
    out
}

fn push_entries(node: &CommentNode, depth: usize, max_depth: usize, out: &mut Vec<ThreadEntry>) {
    out.push(ThreadEntry {
        depth: depth.min(max_depth),
        comment: node.comment.clone(),
    });
    for reply in &node.replies {
        push_entries(reply, depth + 1, max_depth, out);
    }
}
