//! Terse object strings: `a,b(c,d),e`
//!
//! Used by the `fields` and `expand` query parameters to describe a tree of
//! property names.

use crate::core::error::RequestError;
use indexmap::IndexMap;

/// A tree of property names; leaves have no children
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TerseTree {
    children: IndexMap<String, TerseTree>,
}

impl TerseTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a terse object string
    ///
    /// ```rust,ignore
    /// let tree = TerseTree::parse("id,friends(name,email)")?;
    /// assert!(tree.child("friends").unwrap().contains("email"));
    /// ```
    pub fn parse(input: &str) -> Result<Self, RequestError> {
        let invalid = || RequestError::InvalidTerseString {
            input: input.to_string(),
        };

        // stack of (name under which the node hangs in its parent, node)
        let mut stack: Vec<(String, TerseTree)> = vec![(String::new(), TerseTree::new())];
        let mut name = String::new();

        for ch in input.chars() {
            match ch {
                ',' => {
                    let current = &mut stack.last_mut().ok_or_else(invalid)?.1;
                    current.add_leaf(&name);
                    name.clear();
                }
                '(' => {
                    let opened = std::mem::take(&mut name);
                    stack.push((opened.trim().to_string(), TerseTree::new()));
                }
                ')' => {
                    let (key, mut node) = stack.pop().ok_or_else(invalid)?;
                    node.add_leaf(&name);
                    name.clear();
                    let parent = &mut stack.last_mut().ok_or_else(invalid)?.1;
                    parent.merge_child(key, node);
                }
                other => name.push(other),
            }
        }

        if stack.len() != 1 {
            return Err(invalid());
        }
        let (_, mut root) = stack.pop().ok_or_else(invalid)?;
        root.add_leaf(&name);
        Ok(root)
    }

    fn add_leaf(&mut self, name: &str) {
        let name = name.trim();
        if !name.is_empty() && !self.children.contains_key(name) {
            self.children.insert(name.to_string(), TerseTree::new());
        }
    }

    fn merge_child(&mut self, name: String, node: TerseTree) {
        match self.children.get_mut(&name) {
            Some(existing) => existing.merge(node),
            None => {
                self.children.insert(name, node);
            }
        }
    }

    /// Merge another tree into this one
    pub fn merge(&mut self, other: TerseTree) {
        for (name, node) in other.children {
            self.merge_child(name, node);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.children.contains_key(name)
    }

    pub fn child(&self, name: &str) -> Option<&TerseTree> {
        self.children.get(name)
    }

    pub fn children(&self) -> impl Iterator<Item = (&String, &TerseTree)> {
        self.children.iter()
    }

    /// Every path in the tree joined by `/`, parents before their children
    pub fn lookup(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_paths("", &mut out);
        out
    }

    fn collect_paths(&self, prefix: &str, out: &mut Vec<String>) {
        for (name, node) in &self.children {
            let path = if prefix.is_empty() {
                name.clone()
            } else {
                format!("{}/{}", prefix, name)
            };
            out.push(path.clone());
            node.collect_paths(&path, out);
        }
    }
}
