//! Compile time check of `@` references against the node forest, before it is flattened.

use crate::core::{strip_sigil, Node};

/// where a reference path stopped resolving
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unreachable {
    pub segment: String,
    pub container: String,
}

/// whether `path` leads to a node in `forest`
pub fn verify(path: &[&str], forest: &[Node]) -> bool {
    locate(path, forest).is_ok()
}

/// Follows `path` through the forest. The first segment may match anywhere (depth first),
/// every further segment must be a tag root of the current node or name one of its
/// direct children.
pub fn locate<'a>(path: &[&str], forest: &'a [Node]) -> Result<&'a Node, Unreachable> {
    let (first, rest) = match path.split_first() {
        Some(split) => split,
        None => {
            return Err(Unreachable {
                segment: String::new(),
                container: "<forest>".into(),
            })
        }
    };
    let first = strip_sigil(first);
    let mut current = find_node_deep(forest, first).ok_or_else(|| Unreachable {
        segment: first.into(),
        container: "<forest>".into(),
    })?;

    for segment in rest.iter().map(|s| strip_sigil(s)) {
        if current.has_tag_root(segment) {
            continue;
        }
        current = current
            .body
            .iter()
            .find(|n| n.answers_to(segment))
            .ok_or_else(|| Unreachable {
                segment: segment.into(),
                container: current.id().unwrap_or("unnamed node").into(),
            })?;
    }
    Ok(current)
}

fn find_node_deep<'a>(nodes: &'a [Node], name: &str) -> Option<&'a Node> {
    for node in nodes {
        if node.answers_to(name) {
            return Some(node);
        }
        if let Some(found) = find_node_deep(&node.body, name) {
            return Some(found);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{OpCode, Tag};

    fn forest() -> Vec<Node> {
        vec![Node::new(OpCode::Concept)
            .with_id("Core")
            .with_tags(vec![Tag::hashtag("System")])
            .with_body(vec![
                Node::new(OpCode::Entity).with_id("Wade").with_body(vec![
                    Node::new(OpCode::Fragment).with_id("Meta")
                ]),
                Node::new(OpCode::Asset).with_id("Gear"),
            ])]
    }

    #[test]
    fn paths_follow_children_and_tags() {
        let f = forest();
        assert!(verify(&["Core"], &f));
        assert!(verify(&["Core", "Wade", "Meta"], &f));
        assert!(verify(&["Core", "System", "Gear"], &f));
        assert!(verify(&["@Wade", "#Meta"], &f));
        assert!(verify(&["Meta"], &f));
    }

    #[test]
    fn unreachable_names_the_container() {
        let f = forest();
        let err = locate(&["Core", "Meta"], &f).unwrap_err();
        assert_eq!(
            err,
            Unreachable {
                segment: "Meta".into(),
                container: "Core".into()
            }
        );
        assert!(!verify(&["Logan"], &f));
        assert!(!verify(&[], &f));
    }
}
