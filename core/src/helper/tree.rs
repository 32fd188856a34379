//! Eager-load path specifications and the nested tree they normalize to.

use std::fmt;

use crate::error::Result;
use crate::relation::Relation;

/// Constraint applied to a relation query before it runs.
pub type Constraint = Box<dyn Fn(&mut Relation<'_>) -> Result<()>>;

/// A flat list of dotted relation paths, each with optional constraints.
///
/// ```ignore
/// EagerLoad::from("posts.comments")
///     .constrain("posts", |posts| {
///         posts.r#where("published", 1);
///         Ok(())
///     });
/// ```
#[derive(Default)]
pub struct EagerLoad {
    paths: Vec<(String, Option<Constraint>)>,
}

impl EagerLoad {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a dotted path.
    #[must_use]
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.paths.push((path.into(), None));
        self
    }

    #[must_use]
    pub fn paths<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.paths
            .extend(paths.into_iter().map(|path| (path.into(), None)));
        self
    }

    /// Adds a dotted path whose last relation is constrained by `f`.
    #[must_use]
    pub fn constrain<F>(mut self, path: impl Into<String>, f: F) -> Self
    where
        F: Fn(&mut Relation<'_>) -> Result<()> + 'static,
    {
        self.paths.push((path.into(), Some(Box::new(f))));
        self
    }

    pub fn extend(&mut self, other: EagerLoad) {
        self.paths.extend(other.paths);
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn into_tree(self) -> EagerTree {
        EagerTree::build(self)
    }
}

impl fmt::Debug for EagerLoad {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.paths.iter().map(|(path, c)| (path, c.is_some())))
            .finish()
    }
}

impl From<&str> for EagerLoad {
    fn from(path: &str) -> Self {
        EagerLoad::new().path(path)
    }
}

impl From<String> for EagerLoad {
    fn from(path: String) -> Self {
        EagerLoad::new().path(path)
    }
}

impl<const N: usize> From<[&str; N]> for EagerLoad {
    fn from(paths: [&str; N]) -> Self {
        EagerLoad::new().paths(paths)
    }
}

impl From<Vec<&str>> for EagerLoad {
    fn from(paths: Vec<&str>) -> Self {
        EagerLoad::new().paths(paths)
    }
}

impl From<&[&str]> for EagerLoad {
    fn from(paths: &[&str]) -> Self {
        EagerLoad::new().paths(paths.iter().copied())
    }
}

// =============================================================================
// Tree
// =============================================================================

/// One relation name with the constraints registered for it and its
/// nested relations.
pub struct EagerNode {
    pub name: String,
    pub constraints: Vec<Constraint>,
    pub children: Vec<EagerNode>,
}

impl EagerNode {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            constraints: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Applies every constraint registered for this node.
    pub fn apply(&self, relation: &mut Relation<'_>) -> Result<()> {
        for constraint in &self.constraints {
            constraint(relation)?;
        }
        Ok(())
    }
}

impl fmt::Debug for EagerNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EagerNode")
            .field("name", &self.name)
            .field("constraints", &self.constraints.len())
            .field("children", &self.children)
            .finish()
    }
}

/// Relation paths merged segment by segment; siblings keep first-seen
/// order and repeated paths merge their constraints.
#[derive(Debug, Default)]
pub struct EagerTree {
    pub roots: Vec<EagerNode>,
}

impl EagerTree {
    pub fn build(load: EagerLoad) -> Self {
        let mut tree = EagerTree::default();
        for (path, constraint) in load.paths {
            let segments: Vec<&str> = path
                .split('.')
                .map(str::trim)
                .filter(|segment| !segment.is_empty())
                .collect();
            insert(&mut tree.roots, &segments, constraint);
        }
        tree
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// Every path in the tree, parents before children.
    pub fn paths(&self) -> Vec<String> {
        fn walk(nodes: &[EagerNode], prefix: &str, out: &mut Vec<String>) {
            for node in nodes {
                let path = if prefix.is_empty() {
                    node.name.clone()
                } else {
                    format!("{prefix}.{}", node.name)
                };
                out.push(path.clone());
                walk(&node.children, &path, out);
            }
        }
        let mut out = Vec::new();
        walk(&self.roots, "", &mut out);
        out
    }
}

fn insert(level: &mut Vec<EagerNode>, segments: &[&str], constraint: Option<Constraint>) {
    let Some((name, rest)) = segments.split_first() else {
        return;
    };
    let index = match level.iter().position(|node| node.name == *name) {
        Some(index) => index,
        None => {
            level.push(EagerNode::new(name));
            level.len() - 1
        }
    };
    let node = &mut level[index];
    if rest.is_empty() {
        node.constraints.extend(constraint);
    } else {
        insert(&mut node.children, rest, constraint);
    }
}
