//! Frames of the data stack, and the read-only view lambdas are evaluated against.

use serde_json::json;

use std::collections::HashMap;
use std::ops::{Deref, DerefMut};

use crate::core::*;

/// key of the map that collects the hashtag roots absorbed into a frame
pub const TAGS_KEY: &str = "Tags";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frame {
    pub data: Object,
    /// only set on frames pushed by a trigger
    pub scope: Option<TriggerScope>,
    pub communication: Vec<Communication>,
    pub signals: Vec<SignalRecord>,
}

/// bookkeeping of an active trigger
#[derive(Debug, Clone, PartialEq)]
pub struct TriggerScope {
    pub name: String,
    /// address of the trigger instruction
    pub address: usize,
    /// stack index of the enclosing scope frame (or the root frame)
    pub parent: usize,
    /// set as soon as the body pushed a context frame, cleared for every cycle
    pub is_executing: bool,
    pub cycle: Cycle,
    /// per instruction index of the next tag to visit
    pub link_cursors: HashMap<usize, usize>,
    pub excursion: Option<Excursion>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cycle {
    pub count: usize,
    pub maxim: usize,
    pub cur_address: Address,
    pub ret_address: Address,
}

/// a pending jump back: once `target` executed, control resumes at `resume`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Excursion {
    pub target: Address,
    pub resume: Address,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Communication {
    pub timestamp: u64,
    pub target: Value,
    pub message: Value,
    pub channel: Value,
    pub source: usize,
    pub address: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SignalRecord {
    pub timestamp: u64,
    pub name: Value,
    pub payload: Value,
    pub broadcast: bool,
    pub source: usize,
    pub address: usize,
}

impl TriggerScope {
    pub fn new(address: usize, label: Option<&str>, parent: usize, cycle: Cycle) -> Self {
        Self {
            name: format!("__trigger@{}:{}", address, label.unwrap_or("anon")),
            address,
            parent,
            is_executing: false,
            cycle,
            link_cursors: HashMap::new(),
            excursion: None,
        }
    }
}

impl Frame {
    pub fn with_entry(key: impl Into<String>, val: Value) -> Self {
        let mut frame = Self::default();
        frame.data.insert(key.into(), val);
        frame
    }

    pub fn with_scope(scope: TriggerScope) -> Self {
        Self {
            scope: Some(scope),
            ..Self::default()
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    pub fn has_tag(&self, name: &str) -> bool {
        matches!(
            self.data.get(TAGS_KEY).and_then(Value::as_map).and_then(|t| t.get(name)),
            Some(Value::Bool(true))
        )
    }

    pub fn mark_tag(&mut self, name: &str) {
        let tags = self
            .data
            .entry(TAGS_KEY.to_owned())
            .or_insert_with(|| Value::Map(Object::new()));
        if !matches!(tags, Value::Map(_)) {
            *tags = Value::Map(Object::new());
        }
        if let Value::Map(tags) = tags {
            tags.insert(name.to_owned(), Value::Bool(true));
        }
    }

    /// Takes over the data of `child`, overwriting existing keys, and appends its logs.
    /// The child's scope is dropped. `Tags` maps are united instead of replaced.
    pub fn merge(&mut self, child: Frame) {
        for (key, val) in child.data {
            if let (TAGS_KEY, Value::Map(tags)) = (key.as_str(), &val) {
                for name in tags.keys() {
                    self.mark_tag(name);
                }
                continue;
            }
            self.data.insert(key, val);
        }
        self.communication.extend(child.communication);
        self.signals.extend(child.signals);
    }

    /// plain json for display
    pub fn to_json(&self) -> serde_json::Value {
        let data: serde_json::Map<_, _> = self
            .data
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect();
        let mut res = json!({ "data": data });
        if let Some(scope) = &self.scope {
            res["scope"] = json!({
                "name": scope.name,
                "parent": scope.parent,
                "isExecuting": scope.is_executing,
                "cycle": [scope.cycle.count, scope.cycle.maxim],
                "retAddress": scope.cycle.ret_address,
            });
        }
        if !self.communication.is_empty() {
            res["communication"] = self
                .communication
                .iter()
                .map(|c| {
                    json!({
                        "timestamp": c.timestamp,
                        "target": c.target.to_json(),
                        "message": c.message.to_json(),
                        "channel": c.channel.to_json(),
                        "source": c.source,
                        "address": c.address,
                    })
                })
                .collect();
        }
        if !self.signals.is_empty() {
            res["signals"] = self
                .signals
                .iter()
                .map(|s| {
                    json!({
                        "timestamp": s.timestamp,
                        "name": s.name.to_json(),
                        "payload": s.payload.to_json(),
                        "broadcast": s.broadcast,
                        "source": s.source,
                        "address": s.address,
                    })
                })
                .collect();
        }
        res
    }
}

/// type that is used at runtime to represent the data stack. Index 0 is the root frame
#[derive(Debug, Clone, PartialEq)]
pub struct DataStack(Vec<Frame>);

impl DataStack {
    /// a stack holding one empty root frame
    pub fn root() -> Self {
        Self(vec![Frame::default()])
    }

    pub fn top_index(&self) -> usize {
        self.0.len().saturating_sub(1)
    }
}

impl Deref for DataStack {
    type Target = Vec<Frame>;
    fn deref(&self) -> &Vec<Frame> {
        &self.0
    }
}

impl DerefMut for DataStack {
    fn deref_mut(&mut self) -> &mut Vec<Frame> {
        &mut self.0
    }
}

/// What a lambda sees of the stack.
///
/// Names are looked up along the scope chain first: the frame at `bsp`, then its scope
/// parent, as long as parents lie below. After that the whole stack is scanned top down.
#[derive(Debug, Clone, Copy)]
pub struct FrameView<'a> {
    pub frames: &'a [Frame],
    pub bsp: usize,
}

impl<'a> FrameView<'a> {
    pub fn new(frames: &'a [Frame], bsp: usize) -> Self {
        Self { frames, bsp }
    }

    pub fn lookup(&self, name: &str) -> Option<&'a Value> {
        self.find(|f| f.get(name))
    }

    pub fn has_tag(&self, name: &str) -> bool {
        self.find(|f| f.has_tag(name).then_some(&())).is_some()
    }

    fn find<T: ?Sized>(&self, get: impl Fn(&'a Frame) -> Option<&'a T>) -> Option<&'a T> {
        let mut idx = self.bsp;
        while let Some(frame) = self.frames.get(idx) {
            if let Some(found) = get(frame) {
                return Some(found);
            }
            match &frame.scope {
                Some(scope) if scope.parent < idx => idx = scope.parent,
                _ => break,
            }
        }
        self.frames.iter().rev().find_map(get)
    }
}
