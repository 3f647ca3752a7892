//! Nesting of flat comment records into reply trees, plus optimistic edits.
//!
//! Storage keeps comments flat with an optional `parent_id`. Readers get a
//! tree: every comment sits in its parent's `replies`, and a comment whose
//! parent is not in the input stays at the root. Removing a comment removes
//! its whole subtree, matching the cascade in storage.

use std::collections::{HashMap, HashSet};

use tracing::warn;

use crate::db::{Database, now_stamp};
use crate::error::Result;
use crate::models::{Comment, CommentNode};
use crate::validate;

/// Nest a flat list into reply trees. Input order is kept among siblings.
pub fn build_tree(comments: Vec<Comment>) -> Vec<CommentNode> {
    let ids: HashSet<i64> = comments.iter().map(|c| c.id).collect();
    let mut children: HashMap<i64, Vec<Comment>> = HashMap::new();
    let mut roots = Vec::new();

    for comment in comments {
        match comment.parent_id {
            Some(parent) if ids.contains(&parent) && parent != comment.id => {
                children.entry(parent).or_default().push(comment)
            }
            _ => roots.push(comment),
        }
    }

    let mut tree: Vec<CommentNode> = roots
        .into_iter()
        .map(|root| attach(root, &mut children))
        .collect();

    // Whatever is left is only reachable through a parent cycle.
    // Promote the earliest of each leftover group to the root.
    while let Some(&parent) = children.keys().min() {
        let mut stranded = children.remove(&parent).unwrap_or_default();
        let first = stranded.remove(0);
        warn!(comment_id = first.id, "Comment parent cycle, promoting to root");
        if !stranded.is_empty() {
            children.insert(parent, stranded);
        }
        tree.push(attach(first, &mut children));
    }

    tree
}

fn attach(comment: Comment, children: &mut HashMap<i64, Vec<Comment>>) -> CommentNode {
    let replies = children
        .remove(&comment.id)
        .unwrap_or_default()
        .into_iter()
        .map(|child| attach(child, children))
        .collect();
    CommentNode { comment, replies }
}

/// In-memory reply tree with local insert/edit/remove.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommentTree {
    roots: Vec<CommentNode>,
}

impl CommentTree {
    pub fn from_flat(comments: Vec<Comment>) -> Self {
        Self {
            roots: build_tree(comments),
        }
    }

    pub fn roots(&self) -> &[CommentNode] {
        &self.roots
    }

    pub fn len(&self) -> usize {
        fn count(nodes: &[CommentNode]) -> usize {
            nodes.iter().map(|n| 1 + count(&n.replies)).sum()
        }
        count(&self.roots)
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    pub fn find(&self, id: i64) -> Option<&CommentNode> {
        fn walk(nodes: &[CommentNode], id: i64) -> Option<&CommentNode> {
            nodes.iter().find_map(|n| {
                if n.comment.id == id {
                    Some(n)
                } else {
                    walk(&n.replies, id)
                }
            })
        }
        walk(&self.roots, id)
    }

    fn find_mut(&mut self, id: i64) -> Option<&mut CommentNode> {
        fn walk(nodes: &mut [CommentNode], id: i64) -> Option<&mut CommentNode> {
            for node in nodes {
                if node.comment.id == id {
                    return Some(node);
                }
                if let Some(found) = walk(&mut node.replies, id) {
                    return Some(found);
                }
            }
            None
        }
        walk(&mut self.roots, id)
    }

    /// Append a node under its parent, or at the root when the parent is unknown.
    pub fn insert(&mut self, node: CommentNode) {
        match node.comment.parent_id.and_then(|p| self.find_mut(p)) {
            Some(parent) => parent.replies.push(node),
            None => self.roots.push(node),
        }
    }

    pub fn edit(&mut self, id: i64, text: &str) -> Option<String> {
        let node = self.find_mut(id)?;
        node.comment.updated_at = now_stamp();
        Some(std::mem::replace(&mut node.comment.text, text.to_string()))
    }

    /// Detach a comment together with all of its replies.
    pub fn remove(&mut self, id: i64) -> Option<CommentNode> {
        fn take(nodes: &mut Vec<CommentNode>, id: i64) -> Option<CommentNode> {
            if let Some(pos) = nodes.iter().position(|n| n.comment.id == id) {
                return Some(nodes.remove(pos));
            }
            nodes.iter_mut().find_map(|n| take(&mut n.replies, id))
        }
        take(&mut self.roots, id)
    }

    /// Swap a provisional id for the stored comment once persisted.
    fn replace(&mut self, provisional: i64, stored: Comment) {
        if let Some(node) = self.find_mut(provisional) {
            node.comment = stored;
        }
    }

    /// Put a removed subtree back where it was.
    fn restore(&mut self, node: CommentNode, position: Option<(Option<i64>, usize)>) {
        let Some((parent, index)) = position else {
            self.insert(node);
            return;
        };
        let siblings = match parent.and_then(|p| self.find_mut(p)) {
            Some(parent) => &mut parent.replies,
            None => &mut self.roots,
        };
        let index = index.min(siblings.len());
        siblings.insert(index, node);
    }

    fn position_of(&self, id: i64) -> Option<(Option<i64>, usize)> {
        fn walk(nodes: &[CommentNode], parent: Option<i64>, id: i64) -> Option<(Option<i64>, usize)> {
            for (index, node) in nodes.iter().enumerate() {
                if node.comment.id == id {
                    return Some((parent, index));
                }
                if let Some(found) = walk(&node.replies, Some(node.comment.id), id) {
                    return Some(found);
                }
            }
            None
        }
        walk(&self.roots, None, id)
    }
}

/// A listing's comments, updated locally first and then persisted.
/// A failed write rolls the local change back.
pub struct CommentThread {
    listing_id: i64,
    tree: CommentTree,
    next_provisional: i64,
}

impl CommentThread {
    pub fn load(db: &Database, listing_id: i64) -> Result<Self> {
        Ok(Self {
            listing_id,
            tree: CommentTree::from_flat(db.list_comments(listing_id)?),
            next_provisional: -1,
        })
    }

    pub fn tree(&self) -> &CommentTree {
        &self.tree
    }

    pub fn post(
        &mut self,
        db: &Database,
        author_id: i64,
        author_name: &str,
        text: &str,
        parent_id: Option<i64>,
    ) -> Result<Comment> {
        let text = validate::comment_text(text)?;

        let provisional = self.next_provisional;
        self.next_provisional -= 1;
        let now = now_stamp();
        self.tree.insert(CommentNode {
            comment: Comment {
                id: provisional,
                listing_id: self.listing_id,
                author_id,
                author_name: author_name.to_string(),
                text: text.clone(),
                parent_id,
                created_at: now.clone(),
                updated_at: now,
            },
            replies: Vec::new(),
        });

        match db.insert_comment(self.listing_id, author_id, &text, parent_id) {
            Ok(stored) => {
                self.tree.replace(provisional, stored.clone());
                Ok(stored)
            }
            Err(e) => {
                self.tree.remove(provisional);
                Err(e)
            }
        }
    }

    pub fn edit(&mut self, db: &Database, author_id: i64, id: i64, text: &str) -> Result<Comment> {
        let text = validate::comment_text(text)?;
        let previous = self.tree.find(id).map(|n| n.comment.clone());
        self.tree.edit(id, &text);

        match db.update_comment_text(author_id, id, &text) {
            Ok(stored) => {
                self.tree.replace(id, stored.clone());
                Ok(stored)
            }
            Err(e) => {
                if let Some(previous) = previous {
                    self.tree.replace(id, previous);
                }
                Err(e)
            }
        }
    }

    /// Remove a comment and its replies. Returns how many comments went away.
    pub fn delete(&mut self, db: &Database, author_id: i64, id: i64) -> Result<usize> {
        let position = self.tree.position_of(id);
        let removed = self.tree.remove(id);

        match db.delete_comment(author_id, id) {
            Ok(count) => Ok(count),
            Err(e) => {
                if let Some(node) = removed {
                    self.tree.restore(node, position);
                }
                Err(e)
            }
        }
    }
}
