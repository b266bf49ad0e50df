//! Materialized path maintenance for hierarchical content
//!
//! Pages and categories store their full URL path alongside their parent
//! reference. When a node is renamed or moved, its path and the path of every
//! descendant must be recomputed. The functions here work on plain snapshots
//! of a table and produce a list of changes; callers validate the plan and
//! then write it in a single transaction.

use std::collections::{HashMap, HashSet};

/// Maximum slug length
pub const MAX_SLUG_LEN: usize = 100;

/// Snapshot of one hierarchical row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeNode {
    pub id: i64,
    pub parent_id: Option<i64>,
    pub slug: String,
    pub path: String,
}

/// A planned path update for one row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathChange {
    pub id: i64,
    pub old_path: String,
    pub new_path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HierarchyError {
    #[error("Node not found: {0}")]
    NodeNotFound(i64),

    #[error("Parent not found: {0}")]
    ParentNotFound(i64),

    /// The new parent is the node itself or one of its descendants
    #[error("Node {node_id} cannot be moved below itself or its descendant {parent_id}")]
    Cycle { node_id: i64, parent_id: i64 },
}

/// Path for a node with the given parent path and slug
pub fn compute_path(parent_path: Option<&str>, slug: &str) -> String {
    match parent_path {
        Some(parent) => format!("{}/{}", parent.trim_end_matches('/'), slug),
        None => format!("/{}", slug),
    }
}

/// True when making `new_parent_id` the parent of `node_id` would close a loop
pub fn would_create_cycle(nodes: &[TreeNode], node_id: i64, new_parent_id: Option<i64>) -> bool {
    let Some(mut current) = new_parent_id else {
        return false;
    };

    let parents: HashMap<i64, Option<i64>> = nodes.iter().map(|n| (n.id, n.parent_id)).collect();
    let mut seen = HashSet::new();

    loop {
        if current == node_id {
            return true;
        }
        // Existing data already loops; refuse rather than spin.
        if !seen.insert(current) {
            return true;
        }
        match parents.get(&current).copied().flatten() {
            Some(parent) => current = parent,
            None => return false,
        }
    }
}

/// IDs of every descendant of `node_id`, depth-first
pub fn descendant_ids(nodes: &[TreeNode], node_id: i64) -> Vec<i64> {
    let children = children_index(nodes);
    let mut result = Vec::new();
    let mut stack = vec![node_id];
    let mut seen = HashSet::from([node_id]);

    while let Some(id) = stack.pop() {
        if let Some(kids) = children.get(&Some(id)) {
            for kid in kids.iter().rev() {
                if seen.insert(kid.id) {
                    result.push(kid.id);
                    stack.push(kid.id);
                }
            }
        }
    }

    result
}

/// Plan the path updates caused by giving `node_id` a new parent and slug.
///
/// Returns one entry for each row whose path actually changes: the node
/// itself first, then its descendants depth-first. Descendant paths are
/// rebuilt from their own slugs, not by string prefix replacement.
pub fn plan_cascade(
    nodes: &[TreeNode],
    node_id: i64,
    new_parent_id: Option<i64>,
    new_slug: &str,
) -> Result<Vec<PathChange>, HierarchyError> {
    let by_id: HashMap<i64, &TreeNode> = nodes.iter().map(|n| (n.id, n)).collect();

    let node = by_id
        .get(&node_id)
        .ok_or(HierarchyError::NodeNotFound(node_id))?;

    let parent_path = match new_parent_id {
        Some(parent_id) => {
            let parent = by_id
                .get(&parent_id)
                .ok_or(HierarchyError::ParentNotFound(parent_id))?;
            if would_create_cycle(nodes, node_id, Some(parent_id)) {
                return Err(HierarchyError::Cycle { node_id, parent_id });
            }
            Some(parent.path.as_str())
        }
        None => None,
    };

    let new_path = compute_path(parent_path, new_slug);
    let mut changes = Vec::new();
    if new_path != node.path {
        changes.push(PathChange {
            id: node.id,
            old_path: node.path.clone(),
            new_path: new_path.clone(),
        });
    }

    let children = children_index(nodes);
    let mut stack: Vec<(i64, String)> = vec![(node_id, new_path)];
    let mut seen = HashSet::from([node_id]);

    while let Some((id, path)) = stack.pop() {
        let Some(kids) = children.get(&Some(id)) else {
            continue;
        };
        for kid in kids.iter().rev() {
            if !seen.insert(kid.id) {
                continue;
            }
            let kid_path = compute_path(Some(path.as_str()), &kid.slug);
            if kid_path != kid.path {
                changes.push(PathChange {
                    id: kid.id,
                    old_path: kid.path.clone(),
                    new_path: kid_path.clone(),
                });
            }
            stack.push((kid.id, kid_path));
        }
    }

    Ok(changes)
}

/// Plan path updates for leaf rows hanging off moved nodes.
///
/// `leaves` carry the owning node in `parent_id`; each leaf whose owner has a
/// change gets `owner.new_path + "/" + leaf.slug`.
pub fn plan_leaf_cascade(leaves: &[TreeNode], changes: &[PathChange]) -> Vec<PathChange> {
    let moved: HashMap<i64, &str> = changes
        .iter()
        .map(|c| (c.id, c.new_path.as_str()))
        .collect();

    leaves
        .iter()
        .filter_map(|leaf| {
            let owner_path = moved.get(&leaf.parent_id?)?;
            let new_path = compute_path(Some(*owner_path), &leaf.slug);
            (new_path != leaf.path).then(|| PathChange {
                id: leaf.id,
                old_path: leaf.path.clone(),
                new_path,
            })
        })
        .collect()
}

/// First planned path that is already taken by a row outside the plan
pub fn find_path_conflict<'a>(nodes: &[TreeNode], changes: &'a [PathChange]) -> Option<&'a PathChange> {
    let moving: HashSet<i64> = changes.iter().map(|c| c.id).collect();
    let taken: HashSet<&str> = nodes
        .iter()
        .filter(|n| !moving.contains(&n.id))
        .map(|n| n.path.as_str())
        .collect();

    let mut planned = HashSet::new();
    changes
        .iter()
        .find(|c| taken.contains(c.new_path.as_str()) || !planned.insert(c.new_path.as_str()))
}

/// Validate a URL slug: lowercase ASCII letters, digits and single hyphens
pub fn validate_slug(slug: &str) -> Result<(), String> {
    if slug.is_empty() {
        return Err("Slug får inte vara tom".to_string());
    }
    if slug.len() > MAX_SLUG_LEN {
        return Err(format!("Slug får vara högst {} tecken", MAX_SLUG_LEN));
    }
    if !slug
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return Err("Slug får bara innehålla a-z, 0-9 och bindestreck".to_string());
    }
    if slug.starts_with('-') || slug.ends_with('-') || slug.contains("--") {
        return Err("Slug får inte börja eller sluta med bindestreck eller ha två i rad".to_string());
    }
    Ok(())
}

/// Turn a title into a slug, transliterating Swedish characters
pub fn slugify(text: &str) -> String {
    let mut result = String::new();
    let mut prev_hyphen = true;

    for c in text.chars().flat_map(char::to_lowercase) {
        let mapped = match c {
            'å' | 'ä' | 'á' | 'à' => 'a',
            'ö' | 'ø' | 'ó' => 'o',
            'é' | 'è' | 'ë' => 'e',
            'ü' | 'ú' => 'u',
            c if c.is_ascii_alphanumeric() => c,
            _ => '-',
        };

        if mapped == '-' {
            if !prev_hyphen {
                result.push('-');
                prev_hyphen = true;
            }
        } else {
            result.push(mapped);
            prev_hyphen = false;
        }
    }

    let mut slug = result.trim_end_matches('-').to_string();
    if slug.len() > MAX_SLUG_LEN {
        slug.truncate(MAX_SLUG_LEN);
        slug = slug.trim_end_matches('-').to_string();
    }
    slug
}

fn children_index(nodes: &[TreeNode]) -> HashMap<Option<i64>, Vec<&TreeNode>> {
    let mut index: HashMap<Option<i64>, Vec<&TreeNode>> = HashMap::new();
    for node in nodes {
        index.entry(node.parent_id).or_default().push(node);
    }
    for kids in index.values_mut() {
        kids.sort_by_key(|n| n.id);
    }
    index
}
