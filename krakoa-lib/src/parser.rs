//! Turns script source into the node forest the compiler consumes.
//!
//! ```text
//! 🧠("Core") 🔑[#System] {
//!     📌("Armor", value: 5);
//! };
//! ➔ 👤("Wade") { 🔗("Inheritance") 🔑[@Core::Armor]; }
//! ```
//!
//! The first positional argument of an element becomes its `id` when it is a string or a
//! bare word, further positional arguments are collected under `args`. A trigger
//! `[origin] ➔ [🔑[..]] element` becomes a ➔ node with the element as its only child.

use pest::error::{Error as PestError, LineColLocation};
use pest::Parser;
use pest_derive::Parser;
use thiserror::Error;

use crate::core::*;

#[derive(Parser)]
#[grammar = "grammar.pest"]
struct KrakoaParser;

pub type Pair<'a> = pest::iterators::Pair<'a, Rule>;
pub type Pairs<'a> = pest::iterators::Pairs<'a, Rule>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{line}:{column}: {message}")]
pub struct SyntaxError {
    pub line: usize,
    pub column: usize,
    pub message: String,
}

impl From<PestError<Rule>> for SyntaxError {
    fn from(e: PestError<Rule>) -> Self {
        let (line, column) = match e.line_col {
            LineColLocation::Pos(pos) => pos,
            LineColLocation::Span(start, _) => start,
        };
        SyntaxError {
            line,
            column,
            message: e.variant.message().into_owned(),
        }
    }
}

impl SyntaxError {
    fn at(pair: &Pair, message: String) -> Self {
        let (line, column) = pair.line_col();
        SyntaxError {
            line,
            column,
            message,
        }
    }
}

pub type ParseResult<T> = Result<T, SyntaxError>;

pub fn parse(src: &str) -> ParseResult<Vec<Node>> {
    let file = KrakoaParser::parse(Rule::file, src)?
        .next()
        .ok_or_else(|| SyntaxError {
            line: 1,
            column: 1,
            message: "empty parse".into(),
        })?;
    parse_nodes(file.into_inner())
}

/// collects all node pairs, skipping separators and EOI
fn parse_nodes(pairs: Pairs) -> ParseResult<Vec<Node>> {
    pairs
        .filter(|p| p.as_rule() == Rule::node)
        .map(parse_node)
        .collect()
}

fn parse_node(pair: Pair) -> ParseResult<Node> {
    let child = get_single_child(pair.into_inner());
    match child.as_rule() {
        Rule::trigger => parse_trigger(child),
        Rule::element => parse_element(child),
        _ => unreachable!(),
    }
}

fn parse_trigger(pair: Pair) -> ParseResult<Node> {
    let mut trigger = Node::new(OpCode::Trigger);
    for child in pair.into_inner() {
        match child.as_rule() {
            Rule::origin => {
                let mut origin = Node::new(OpCode::Unknown(String::new()));
                for p in child.into_inner() {
                    match p.as_rule() {
                        Rule::glyph => origin.op = OpCode::from_glyph(p.as_str()),
                        Rule::args => parse_args(p, &mut origin)?,
                        _ => unreachable!(),
                    }
                }
                if let Some(id) = origin.id() {
                    trigger.params.insert("from".into(), Value::str(id));
                }
            }
            Rule::arrow => {}
            Rule::tag_list => trigger.tags = parse_tag_list(child)?,
            Rule::element => {
                let element = parse_element(child)?;
                if let Some(id) = element.id() {
                    trigger.params.insert("to".into(), Value::str(id));
                }
                trigger.body.push(element);
            }
            _ => unreachable!(),
        }
    }
    Ok(trigger)
}

fn parse_element(pair: Pair) -> ParseResult<Node> {
    let mut node = Node::new(OpCode::Unknown(String::new()));
    for child in pair.into_inner() {
        match child.as_rule() {
            Rule::glyph => node.op = OpCode::from_glyph(child.as_str()),
            Rule::args => parse_args(child, &mut node)?,
            Rule::tag_list => node.tags = parse_tag_list(child)?,
            Rule::body => node.body = parse_nodes(child.into_inner())?,
            _ => unreachable!(),
        }
    }
    Ok(node)
}

fn parse_args(pair: Pair, node: &mut Node) -> ParseResult<()> {
    let mut positional = vec![];
    for arg in pair.into_inner() {
        let child = get_single_child(arg.into_inner());
        match child.as_rule() {
            Rule::pair => {
                let (key, val) = parse_pair(child)?;
                node.params.insert(key, val);
            }
            Rule::value => positional.push(parse_value(child)?),
            _ => unreachable!(),
        }
    }
    let mut positional = positional.into_iter();
    if let Some(first) = positional.next() {
        if matches!(first, Value::Text(_)) && !node.params.contains_key("id") {
            node.params.insert("id".into(), first);
        } else {
            node.params.insert("args".into(), Value::List(vec![first]));
        }
    }
    let rest: Vec<Value> = positional.collect();
    if !rest.is_empty() {
        match node.params.get_mut("args") {
            Some(Value::List(args)) => args.extend(rest),
            _ => {
                node.params.insert("args".into(), Value::List(rest));
            }
        }
    }
    Ok(())
}

fn parse_pair(pair: Pair) -> ParseResult<(String, Value)> {
    let mut inner = pair.into_inner();
    match (inner.next(), inner.next()) {
        (Some(key), Some(val)) => {
            let key_child = get_single_child(key.into_inner());
            let key = match key_child.as_rule() {
                Rule::string => parse_string(key_child),
                Rule::ident => key_child.as_str().to_owned(),
                _ => unreachable!(),
            };
            Ok((key, parse_value(val)?))
        }
        _ => unreachable!(),
    }
}

fn parse_value(pair: Pair) -> ParseResult<Value> {
    let child = get_single_child(pair.into_inner());
    Ok(match child.as_rule() {
        Rule::lambda => {
            let code = get_single_child(child.into_inner());
            Value::Lambda(Lambda::new(code.as_str().trim()))
        }
        Rule::string => Value::Text(parse_string(child)),
        Rule::number => {
            let x = child
                .as_str()
                .parse::<f64>()
                .map_err(|e| SyntaxError::at(&child, format!("invalid number: {}", e)))?;
            Value::number(x)
        }
        Rule::boolean => Value::Bool(child.as_str() == "true"),
        Rule::null => Value::Null,
        Rule::list => Value::List(child.into_inner().map(parse_value).collect::<Result<_, _>>()?),
        Rule::map => Value::Map(child.into_inner().map(parse_pair).collect::<Result<_, _>>()?),
        Rule::word => Value::Text(child.as_str().to_owned()),
        _ => unreachable!(),
    })
}

/// the string pair is `"` inner `"`, this unescapes inner
fn parse_string(pair: Pair) -> String {
    let raw = get_single_child(pair.into_inner());
    let mut res = String::with_capacity(raw.as_str().len());
    let mut chars = raw.as_str().chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            res.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => res.push('\n'),
            Some('t') => res.push('\t'),
            Some('r') => res.push('\r'),
            Some(other) => res.push(other),
            None => res.push('\\'),
        }
    }
    res
}

fn parse_tag_list(pair: Pair) -> ParseResult<Vec<Tag>> {
    pair.into_inner().map(parse_tag).collect()
}

fn parse_tag(pair: Pair) -> ParseResult<Tag> {
    let child = get_single_child(pair.into_inner());
    let kind = match child.as_rule() {
        Rule::hashtag | Rule::bare_tag => TagKind::Hashtag,
        Rule::reference => TagKind::Reference,
        _ => unreachable!(),
    };
    let path = get_single_child(child.into_inner());
    let segments: Vec<Segment> = path.into_inner().map(parse_segment).collect();
    let root = segments
        .first()
        .map(|s| s.name().clone())
        .unwrap_or_default();
    Ok(Tag {
        root,
        kind,
        segments,
        original: None,
        target: None,
        address: UNRESOLVED,
    })
}

fn parse_segment(pair: Pair) -> Segment {
    let child = get_single_child(pair.into_inner());
    match child.as_rule() {
        Rule::nested => Segment::Nested(Box::new(Tag::hashtag(&parse_name(
            get_single_child(child.into_inner()),
        )))),
        Rule::name => Segment::Name(parse_name(child)),
        _ => unreachable!(),
    }
}

fn parse_name(pair: Pair) -> String {
    let child = get_single_child(pair.into_inner());
    match child.as_rule() {
        Rule::string => parse_string(child),
        Rule::bare_name => child.as_str().to_owned(),
        _ => unreachable!(),
    }
}

fn get_single_child(p: Pairs) -> Pair {
    let children: Vec<Pair> = p.collect();
    assert!(
        children.len() == 1,
        "get_single_child found {} children in {:#?}",
        children.len(),
        children
    );
    children[0].clone()
}
