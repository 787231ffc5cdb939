//! The compiler output. A program is a dense, address indexed list of instructions plus
//! the tables the linker built for it.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use std::collections::BTreeMap;

use super::{OpCode, Params, Tag, TextIdx, TextPool, Value};

/// instruction address. Negative means "nowhere": halt for `next`, unresolved for tags
pub type Address = i64;

pub const UNRESOLVED: Address = -1;

#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("malformed json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("code is not dense, expected address {expected}, found {found}")]
    NotDense { expected: usize, found: usize },

    #[error("instruction {0} has no successor")]
    EmptyNext(usize),

    #[error("{op} at {address} needs exactly 2 successors, found {found}")]
    BranchArity {
        address: usize,
        op: OpCode,
        found: usize,
    },

    #[error("entry {0} is not an address in the program")]
    BadEntry(usize),

    #[error("instruction {address} references text {idx}, but the pool only has {len} entries")]
    DanglingText {
        address: usize,
        idx: usize,
        len: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound(deserialize = "S: Deserialize<'de>"))]
pub struct Instruction<S = String> {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub op: OpCode,
    #[serde(default)]
    pub timestamp: u64,
    #[serde(default)]
    pub params: Params<S>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<Tag<S>>,
    pub next: Vec<Address>,
    /// one past the last address of the body, only set on instructions with a body
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<Address>,
}

impl<S> Instruction<S> {
    pub fn try_map_text<T, E>(
        self,
        f: &mut impl FnMut(S) -> Result<T, E>,
    ) -> Result<Instruction<T>, E> {
        Ok(Instruction {
            id: self.id,
            op: self.op,
            timestamp: self.timestamp,
            params: self
                .params
                .into_iter()
                .map(|(k, v)| Ok((k, v.try_map_text(f)?)))
                .collect::<Result<_, E>>()?,
            tags: self
                .tags
                .into_iter()
                .map(|t| t.try_map_text(f))
                .collect::<Result<_, E>>()?,
            next: self.next,
            end: self.end,
        })
    }

    /// the body range `[address + 1, end)`, empty for leaves
    pub fn body_range(&self, address: usize) -> std::ops::Range<usize> {
        match self.end {
            Some(end) if end > address as Address => address + 1..end as usize,
            _ => address + 1..address + 1,
        }
    }
}

impl Instruction {
    pub fn param(&self, key: &str) -> Option<&Value> {
        self.params.get(key)
    }

    pub fn str_param(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(Value::as_str)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Program {
    pub entry: usize,
    pub symbols: IndexMap<String, usize>,
    pub text: TextPool,
    pub code: BTreeMap<usize, Instruction<TextIdx>>,
}

impl Program {
    /// parses and validates a program
    pub fn from_json(src: &str) -> Result<Program, SchemaError> {
        let prog: Program = serde_json::from_str(src)?;
        prog.validate()?;
        Ok(prog)
    }

    pub fn to_json(&self) -> Result<String, SchemaError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn len(&self) -> usize {
        self.code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    pub fn fetch(&self, address: Address) -> Option<&Instruction<TextIdx>> {
        usize::try_from(address)
            .ok()
            .and_then(|a| self.code.get(&a))
    }

    /// checks the invariants the vm relies on
    pub fn validate(&self) -> Result<(), SchemaError> {
        for (expected, (found, instr)) in self.code.iter().enumerate() {
            if expected != *found {
                return Err(SchemaError::NotDense {
                    expected,
                    found: *found,
                });
            }
            if instr.next.is_empty() {
                return Err(SchemaError::EmptyNext(*found));
            }
            if instr.op.is_branching() && instr.next.len() != 2 {
                return Err(SchemaError::BranchArity {
                    address: *found,
                    op: instr.op.clone(),
                    found: instr.next.len(),
                });
            }
            let len = self.text.len();
            let mut check = |idx: TextIdx| {
                if idx.0 < len {
                    Ok(idx)
                } else {
                    Err(SchemaError::DanglingText {
                        address: *found,
                        idx: idx.0,
                        len,
                    })
                }
            };
            instr.clone().try_map_text(&mut check)?;
        }
        if self.entry >= self.code.len() && !(self.code.is_empty() && self.entry == 0) {
            return Err(SchemaError::BadEntry(self.entry));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(next: Address) -> Instruction<TextIdx> {
        Instruction {
            id: None,
            op: OpCode::State,
            timestamp: 0,
            params: Params::new(),
            tags: vec![],
            next: vec![next],
            end: None,
        }
    }

    #[test]
    fn validate_rejects_holes() {
        let mut prog = Program::default();
        prog.code.insert(0, leaf(2));
        prog.code.insert(2, leaf(-1));
        assert!(matches!(
            prog.validate(),
            Err(SchemaError::NotDense {
                expected: 1,
                found: 2
            })
        ));
    }

    #[test]
    fn validate_checks_branch_arity() {
        let mut prog = Program::default();
        let mut trigger = leaf(-1);
        trigger.op = OpCode::Trigger;
        prog.code.insert(0, trigger);
        assert!(matches!(
            prog.validate(),
            Err(SchemaError::BranchArity { found: 1, .. })
        ));
    }

    #[test]
    fn validate_checks_text_indices() {
        let mut prog = Program::default();
        let mut instr = leaf(-1);
        instr.params.insert("value".into(), Value::Text(TextIdx(4)));
        prog.code.insert(0, instr);
        assert!(matches!(
            prog.validate(),
            Err(SchemaError::DanglingText { idx: 4, .. })
        ));
    }

    #[test]
    fn from_json_reads_string_keys() {
        let src = r#"{
            "entry": 0,
            "symbols": {"S": 0},
            "text": ["S", "x"],
            "code": {"0": {"id": "S", "type": "📌", "timestamp": 0,
                           "params": {"id": 0, "value": {"__num": 5}, "name": 1},
                           "next": [-1]}}
        }"#;
        let prog = Program::from_json(src).unwrap();
        let instr = prog.fetch(0).unwrap();
        assert_eq!(instr.params["value"], Value::number(5.0));
        assert_eq!(instr.params["name"], Value::Text(TextIdx(1)));
        assert!(prog.fetch(-1).is_none());
        assert!(prog.fetch(1).is_none());
    }
}
