//! Canonical addresses of locations inside a value graph.
//!
//! A path renders as `root` followed by one accessor per component:
//!
//! | Component | Rendering | Example |
//! |-----------|-----------|---------|
//! | `Index(n)` | `[n]` | `root[3]` |
//! | `Key(v)` | `[repr(v)]` | `root['name']`, `root[2]` |
//! | `Attribute(a)` | `.a` | `root.owner.email` |
//! | `Member(v)` | `[repr(v)]` | `root[5]` |

use std::fmt;

use super::value::Value;

/// One step from a container to a child.
#[derive(Debug, Clone, PartialEq)]
pub enum PathComponent {
    /// Sequence position.
    Index(usize),
    /// Mapping key.
    Key(Value),
    /// Record field.
    Attribute(String),
    /// Set membership marker.
    Member(Value),
}

impl PathComponent {
    /// Accessor text appended to the parent path.
    pub fn accessor(&self) -> String {
        match self {
            Self::Index(i) => format!("[{i}]"),
            Self::Key(key) | Self::Member(key) => format!("[{}]", key.repr()),
            Self::Attribute(name) => format!(".{name}"),
        }
    }
}

/// Location inside a value graph, relative to its root.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Path(Vec<PathComponent>);

impl Path {
    /// The root location.
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// Build from components.
    pub fn from_components(components: Vec<PathComponent>) -> Self {
        Self(components)
    }

    /// Components from the root outwards.
    pub fn components(&self) -> &[PathComponent] {
        &self.0
    }

    /// Extend this path in place.
    pub fn push(&mut self, component: PathComponent) {
        self.0.push(component);
    }

    /// Remove the last component.
    pub fn pop(&mut self) -> Option<PathComponent> {
        self.0.pop()
    }

    /// A new path one step below this one.
    pub fn child(&self, component: PathComponent) -> Self {
        let mut components = self.0.clone();
        components.push(component);
        Self(components)
    }

    /// The enclosing container's path, `None` at the root.
    pub fn parent(&self) -> Option<Self> {
        match self.0.split_last() {
            Some((_, rest)) => Some(Self(rest.to_vec())),
            None => None,
        }
    }

    /// Last component, `None` at the root.
    pub fn last(&self) -> Option<&PathComponent> {
        self.0.last()
    }

    /// Number of components.
    pub fn depth(&self) -> usize {
        self.0.len()
    }

    /// True at the root.
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("root")?;
        for component in &self.0 {
            f.write_str(&component.accessor())?;
        }
        Ok(())
    }
}

impl From<Vec<PathComponent>> for Path {
    fn from(components: Vec<PathComponent>) -> Self {
        Self(components)
    }
}
