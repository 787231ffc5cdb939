//! The compiler input: a forest of nodes as produced by the parser (or read from json),
//! and the tags that can be attached to nodes and instructions.

use serde::{Deserialize, Serialize};

use std::fmt;

use super::{Address, OpCode, Params, SchemaError, Value, UNRESOLVED};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    #[serde(rename = "type")]
    pub op: OpCode,
    #[serde(default)]
    pub params: Params,
    #[serde(default)]
    pub body: Vec<Node>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub tags: Vec<Tag>,
}

fn null_as_empty<'de, D, T>(d: D) -> Result<Vec<T>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(d)?.unwrap_or_default())
}

impl Node {
    pub fn new(op: impl Into<OpCode>) -> Self {
        Self {
            op: op.into(),
            params: Params::new(),
            body: vec![],
            tags: vec![],
        }
    }

    pub fn with_id(self, id: &str) -> Self {
        self.with_param("id", id)
    }

    pub fn with_param(mut self, key: &str, val: impl Into<Value>) -> Self {
        self.params.insert(key.into(), val.into());
        self
    }

    pub fn with_body(mut self, body: Vec<Node>) -> Self {
        self.body = body;
        self
    }

    pub fn with_tags(mut self, tags: Vec<Tag>) -> Self {
        self.tags = tags;
        self
    }

    /// the node id is its `id` param, if that is a string
    pub fn id(&self) -> Option<&str> {
        self.params.get("id").and_then(Value::as_str)
    }

    /// number of instructions this node compiles to
    pub fn span(&self) -> usize {
        1 + self.body.iter().map(Node::span).sum::<usize>()
    }

    /// only hashtags define a name, a reference merely points at one
    pub fn has_tag_root(&self, name: &str) -> bool {
        self.tags
            .iter()
            .any(|t| t.kind == TagKind::Hashtag && strip_sigil(&t.root) == name)
    }

    /// whether `name` is this node's id or one of its hashtag roots
    pub fn answers_to(&self, name: &str) -> bool {
        self.id().map(strip_sigil) == Some(name) || self.has_tag_root(name)
    }

    /// reads a forest from json. A single node object is accepted as a forest of one
    pub fn forest_from_json(src: &str) -> Result<Vec<Node>, SchemaError> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Forest {
            Many(Vec<Node>),
            One(Box<Node>),
        }
        Ok(match serde_json::from_str(src)? {
            Forest::Many(nodes) => nodes,
            Forest::One(node) => vec![*node],
        })
    }
}

/// names in tags and ids may carry their sigil, it is not part of the name
pub fn strip_sigil(name: &str) -> &str {
    name.strip_prefix(&['@', '#'][..]).unwrap_or(name)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TagKind {
    /// `#name`, declares a symbol and is resolved leniently
    Hashtag,
    /// `@a::b`, must point to something reachable at compile time
    Reference,
}

/// A symbolic marker on a node. `segments` always starts with the root segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound(deserialize = "S: Deserialize<'de>"))]
pub struct Tag<S = String> {
    pub root: S,
    pub kind: TagKind,
    #[serde(default)]
    pub segments: Vec<Segment<S>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(default = "unresolved")]
    pub address: Address,
}

fn unresolved() -> Address {
    UNRESOLVED
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Segment<S = String> {
    Name(S),
    Nested(Box<Tag<S>>),
}

impl<S> Segment<S> {
    /// the name used for lookups, a nested tag is looked up by its root
    pub fn name(&self) -> &S {
        match self {
            Segment::Name(n) => n,
            Segment::Nested(t) => &t.root,
        }
    }
}

impl Tag {
    pub fn hashtag(root: &str) -> Self {
        Self::new(TagKind::Hashtag, &[root])
    }

    pub fn reference(path: &[&str]) -> Self {
        Self::new(TagKind::Reference, path)
    }

    fn new(kind: TagKind, path: &[&str]) -> Self {
        Self {
            root: path.first().copied().unwrap_or_default().into(),
            kind,
            segments: path.iter().map(|s| Segment::Name((*s).into())).collect(),
            original: None,
            target: None,
            address: UNRESOLVED,
        }
    }

    /// the segment names without sigils, nested tags contribute their root
    pub fn path(&self) -> Vec<&str> {
        let mut path: Vec<&str> = self
            .segments
            .iter()
            .map(|s| strip_sigil(s.name()))
            .collect();
        if path.is_empty() {
            path.push(strip_sigil(&self.root));
        }
        path
    }
}

impl<S> Tag<S> {
    pub fn is_resolved(&self) -> bool {
        self.address >= 0
    }

    /// converts the root and every segment name with `f`. Structural fields are kept
    pub fn try_map_text<T, E>(self, f: &mut impl FnMut(S) -> Result<T, E>) -> Result<Tag<T>, E> {
        Ok(Tag {
            root: f(self.root)?,
            kind: self.kind,
            segments: self
                .segments
                .into_iter()
                .map(|s| {
                    Ok(match s {
                        Segment::Name(n) => Segment::Name(f(n)?),
                        Segment::Nested(t) => Segment::Nested(Box::new(t.try_map_text(f)?)),
                    })
                })
                .collect::<Result<_, E>>()?,
            original: self.original,
            target: self.target,
            address: self.address,
        })
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            TagKind::Hashtag => write!(f, "#{}", self.path().join("::")),
            TagKind::Reference => write!(f, "@{}", self.path().join("::")),
        }
    }
}
