//! Evaluator for the expressions inside `λ(...)`.
//!
//! The language is a small, side effect free subset of javascript expressions:
//! literals, `ctx.name` / `ctx["name"]` / bare names, member and index access, `!` and
//! unary `-`, arithmetic, comparisons (loose and strict), `&&`, `||`, `??` and the
//! ternary. A leading `return` and a trailing `;` are accepted.
//!
//! Names are looked up through a [`FrameView`]. Context objects (maps with a `__type`)
//! take part in arithmetic and comparisons through their `value` entry, and
//! `ctx.Tags.X` is `false` for tags that were never absorbed.
//!
//! Results are `Option<Value>`, `None` being javascripts `undefined`.

use once_cell::sync::Lazy;
use pest::pratt_parser::{Assoc, Op, PrattParser};
use pest::Parser;
use pest_derive::Parser;
use thiserror::Error;
use tracing::{trace, warn};

use std::cmp::Ordering;

use super::frame::{FrameView, TAGS_KEY};
use crate::core::*;

#[derive(Parser)]
#[grammar = "vm/lambda.pest"]
struct LambdaParser;

type Pair<'a> = pest::iterators::Pair<'a, Rule>;
type Pairs<'a> = pest::iterators::Pairs<'a, Rule>;

#[derive(Error, Debug)]
pub enum LambdaError {
    #[error("could not parse lambda: {0}")]
    Syntax(#[from] Box<pest::error::Error<Rule>>),

    #[error("could not evaluate lambda: {0}")]
    Eval(String),
}

pub type LambdaResult<T> = Result<T, LambdaError>;

static PRATT: Lazy<PrattParser<Rule>> = Lazy::new(|| {
    use Assoc::*;
    use Rule::*;
    PrattParser::new()
        .op(Op::infix(or, Left) | Op::infix(nullish, Left))
        .op(Op::infix(and, Left))
        .op(Op::infix(strict_eq, Left)
            | Op::infix(strict_ne, Left)
            | Op::infix(eq, Left)
            | Op::infix(ne, Left))
        .op(Op::infix(lt, Left) | Op::infix(le, Left) | Op::infix(gt, Left) | Op::infix(ge, Left))
        .op(Op::infix(add, Left) | Op::infix(sub, Left))
        .op(Op::infix(mul, Left) | Op::infix(div, Left) | Op::infix(rem, Left))
        .op(Op::prefix(not) | Op::prefix(neg))
        .op(Op::postfix(member) | Op::postfix(index))
});

/// intermediate result, `ctx` and `ctx.Tags` are not values themselves
enum Operand {
    Ctx,
    Tags,
    Val(Option<Value>),
}

impl Operand {
    fn into_value(self, view: &FrameView) -> Option<Value> {
        match self {
            Operand::Ctx => None,
            Operand::Tags => view.lookup(TAGS_KEY).cloned(),
            Operand::Val(v) => v,
        }
    }
}

/// evaluates `code`, errors are returned
pub fn evaluate(code: &str, view: &FrameView) -> LambdaResult<Option<Value>> {
    let mut pairs = LambdaParser::parse(Rule::program, code).map_err(Box::new)?;
    let program = pairs
        .next()
        .ok_or_else(|| LambdaError::Eval("empty program".into()))?;
    let ternary = program
        .into_inner()
        .find(|p| p.as_rule() == Rule::ternary)
        .ok_or_else(|| LambdaError::Eval("missing expression".into()))?;
    let res = eval_ternary(ternary, view)?.into_value(view);
    trace!(code, result = ?res, "lambda evaluated");
    Ok(res)
}

/// evaluates `code`, logging errors and turning them into undefined
pub fn evaluate_or_undefined(code: &str, view: &FrameView) -> Option<Value> {
    match evaluate(code, view) {
        Ok(v) => v,
        Err(e) => {
            warn!(code, error = %e, "lambda evaluation failed");
            None
        }
    }
}

fn eval_ternary(pair: Pair, view: &FrameView) -> LambdaResult<Operand> {
    let mut inner = pair.into_inner();
    let cond = match inner.next() {
        Some(binary) => eval_binary(binary.into_inner(), view)?,
        None => return Err(LambdaError::Eval("empty expression".into())),
    };
    match (inner.next(), inner.next()) {
        (Some(then), Some(otherwise)) => {
            if is_truthy(cond.into_value(view).as_ref()) {
                eval_ternary(then, view)
            } else {
                eval_ternary(otherwise, view)
            }
        }
        _ => Ok(cond),
    }
}

fn eval_binary(pairs: Pairs, view: &FrameView) -> LambdaResult<Operand> {
    PRATT
        .map_primary(|p| eval_primary(p, view))
        .map_prefix(|op, rhs| {
            let rhs = rhs?.into_value(view);
            Ok(Operand::Val(Some(match op.as_rule() {
                Rule::not => Value::Bool(!is_truthy(rhs.as_ref())),
                Rule::neg => Value::number(-to_number(rhs.as_ref())),
                _ => unreachable!(),
            })))
        })
        .map_postfix(|lhs, op| {
            let lhs = lhs?;
            match op.as_rule() {
                Rule::member => {
                    let name = op.into_inner().as_str().to_owned();
                    Ok(access(lhs, &Value::Text(name), view))
                }
                Rule::index => {
                    let key = match op.into_inner().next() {
                        Some(t) => eval_ternary(t, view)?.into_value(view),
                        None => None,
                    };
                    Ok(match key {
                        Some(key) => access(lhs, &key, view),
                        None => Operand::Val(None),
                    })
                }
                _ => unreachable!(),
            }
        })
        .map_infix(|lhs, op, rhs| {
            let lhs = lhs?.into_value(view);
            let rhs = rhs?.into_value(view);
            Ok(Operand::Val(binary_op(op.as_rule(), lhs, rhs)))
        })
        .parse(pairs)
}

fn eval_primary(pair: Pair, view: &FrameView) -> LambdaResult<Operand> {
    Ok(match pair.as_rule() {
        Rule::number => Operand::Val(Some(Value::number(
            pair.as_str()
                .parse::<f64>()
                .map_err(|e| LambdaError::Eval(e.to_string()))?,
        ))),
        Rule::string => Operand::Val(Some(Value::Text(unescape(
            pair.into_inner().as_str(),
        )))),
        Rule::boolean => Operand::Val(Some(Value::Bool(pair.as_str() == "true"))),
        Rule::null => Operand::Val(Some(Value::Null)),
        Rule::undefined => Operand::Val(None),
        Rule::ident => match pair.as_str() {
            "ctx" => Operand::Ctx,
            TAGS_KEY => Operand::Tags,
            name => Operand::Val(view.lookup(name).cloned()),
        },
        Rule::ternary => eval_ternary(pair, view)?,
        _ => unreachable!(),
    })
}

fn access(obj: Operand, key: &Value, view: &FrameView) -> Operand {
    let name = key.as_str();
    match obj {
        Operand::Ctx => match name {
            Some(TAGS_KEY) => Operand::Tags,
            Some(name) => Operand::Val(view.lookup(name).cloned()),
            None => Operand::Val(None),
        },
        Operand::Tags => Operand::Val(Some(Value::Bool(
            name.map(|n| view.has_tag(n)).unwrap_or(false),
        ))),
        Operand::Val(v) => Operand::Val(v.and_then(|v| member(&v, key))),
    }
}

fn member(obj: &Value, key: &Value) -> Option<Value> {
    match (obj, key) {
        (Value::Map(m), Value::Text(k)) => m.get(k).cloned(),
        (Value::List(l), Value::Text(k)) if k == "length" => Some(Value::number(l.len() as f64)),
        (Value::Text(s), Value::Text(k)) if k == "length" => {
            Some(Value::number(s.chars().count() as f64))
        }
        (Value::List(l), Value::Number(n)) => index_of(n.0).and_then(|i| l.get(i).cloned()),
        (Value::Text(s), Value::Number(n)) => index_of(n.0)
            .and_then(|i| s.chars().nth(i))
            .map(|c| Value::Text(c.to_string())),
        (Value::Map(m), Value::Number(n)) => m.get(&display(&Value::Number(*n))).cloned(),
        _ => None,
    }
}

fn index_of(x: f64) -> Option<usize> {
    (x >= 0.0 && x.fract() == 0.0).then_some(x as usize)
}

fn unescape(raw: &str) -> String {
    let mut res = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            res.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => res.push('\n'),
            Some('t') => res.push('\t'),
            Some(other) => res.push(other),
            None => res.push('\\'),
        }
    }
    res
}

fn binary_op(op: Rule, lhs: Option<Value>, rhs: Option<Value>) -> Option<Value> {
    use Rule::*;
    match op {
        or => {
            if is_truthy(lhs.as_ref()) {
                lhs
            } else {
                rhs
            }
        }
        and => {
            if is_truthy(lhs.as_ref()) {
                rhs
            } else {
                lhs
            }
        }
        nullish => match lhs {
            None | Some(Value::Null) => rhs,
            _ => lhs,
        },
        eq => Some(Value::Bool(loose_eq(lhs.as_ref(), rhs.as_ref()))),
        ne => Some(Value::Bool(!loose_eq(lhs.as_ref(), rhs.as_ref()))),
        strict_eq => Some(Value::Bool(strict_equal(lhs.as_ref(), rhs.as_ref()))),
        strict_ne => Some(Value::Bool(!strict_equal(lhs.as_ref(), rhs.as_ref()))),
        lt | le | gt | ge => {
            let ord = compare(lhs.as_ref(), rhs.as_ref());
            Some(Value::Bool(match (op, ord) {
                (_, None) => false,
                (lt, Some(o)) => o == Ordering::Less,
                (le, Some(o)) => o != Ordering::Greater,
                (gt, Some(o)) => o == Ordering::Greater,
                (_, Some(o)) => o != Ordering::Less,
            }))
        }
        add => {
            let (l, r) = (unwrap_context(lhs.as_ref()), unwrap_context(rhs.as_ref()));
            if matches!(l, Some(Value::Text(_))) || matches!(r, Some(Value::Text(_))) {
                Some(Value::Text(format!("{}{}", display_opt(l), display_opt(r))))
            } else {
                Some(Value::number(to_number(l) + to_number(r)))
            }
        }
        sub => Some(Value::number(to_number(lhs.as_ref()) - to_number(rhs.as_ref()))),
        mul => Some(Value::number(to_number(lhs.as_ref()) * to_number(rhs.as_ref()))),
        div => Some(Value::number(to_number(lhs.as_ref()) / to_number(rhs.as_ref()))),
        rem => Some(Value::number(to_number(lhs.as_ref()) % to_number(rhs.as_ref()))),
        _ => unreachable!(),
    }
}

/// a context object stands for its `value` entry, everything else for itself
fn unwrap_context(v: Option<&Value>) -> Option<&Value> {
    match v {
        Some(ctx @ Value::Map(m)) if ctx.is_context_object() => m.get("value"),
        other => other,
    }
}

/// javascript truthiness
pub fn is_truthy(v: Option<&Value>) -> bool {
    match v {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.0 != 0.0 && !n.0.is_nan(),
        Some(Value::Text(s)) => !s.is_empty(),
        Some(_) => true,
    }
}

pub fn to_number(v: Option<&Value>) -> f64 {
    match unwrap_context(v) {
        None => f64::NAN,
        Some(Value::Null) => 0.0,
        Some(Value::Bool(b)) => *b as u8 as f64,
        Some(Value::Number(n)) => n.0,
        Some(Value::Text(s)) if s.trim().is_empty() => 0.0,
        Some(Value::Text(s)) => s.trim().parse().unwrap_or(f64::NAN),
        Some(_) => f64::NAN,
    }
}

fn display(v: &Value) -> String {
    v.to_string()
}

fn display_opt(v: Option<&Value>) -> String {
    v.map(display).unwrap_or_else(|| "undefined".into())
}

fn loose_eq(lhs: Option<&Value>, rhs: Option<&Value>) -> bool {
    let (l, r) = (unwrap_context(lhs), unwrap_context(rhs));
    match (l, r) {
        (None | Some(Value::Null), None | Some(Value::Null)) => true,
        (None | Some(Value::Null), _) | (_, None | Some(Value::Null)) => false,
        (Some(Value::Text(a)), Some(Value::Text(b))) => a == b,
        (Some(a), Some(b)) if is_primitive(a) && is_primitive(b) => {
            to_number(Some(a)) == to_number(Some(b))
        }
        (Some(a), Some(b)) => a == b,
    }
}

fn is_primitive(v: &Value) -> bool {
    matches!(v, Value::Number(_) | Value::Bool(_) | Value::Text(_))
}

fn strict_equal(lhs: Option<&Value>, rhs: Option<&Value>) -> bool {
    match (unwrap_context(lhs), unwrap_context(rhs)) {
        (Some(Value::Number(a)), Some(Value::Number(b))) => a.0 == b.0,
        (a, b) => a == b,
    }
}

fn compare(lhs: Option<&Value>, rhs: Option<&Value>) -> Option<Ordering> {
    match (unwrap_context(lhs), unwrap_context(rhs)) {
        (Some(Value::Text(a)), Some(Value::Text(b))) => Some(a.cmp(b)),
        (l, r) => to_number(l).partial_cmp(&to_number(r)),
    }
}
