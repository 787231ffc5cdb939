//! Second compiler phase: builds the symbol table, resolves tags to addresses and pools
//! all string leaves.

use indexmap::IndexMap;
use tracing::{debug, warn};

use std::collections::BTreeMap;
use std::convert::Infallible;

use crate::core::*;

pub type SymbolTable = IndexMap<String, usize>;

/// links linearized instructions into a program
pub fn link(code: Vec<Instruction>, entry: usize) -> Program {
    let symbols = collect_symbols(&code);
    let code: Vec<Instruction> = code
        .into_iter()
        .map(|mut instr| {
            for tag in instr.tags.iter_mut() {
                resolve_tag(tag, &symbols);
            }
            instr
        })
        .collect();
    let (text, code) = pool(code);
    Program {
        entry,
        symbols,
        text,
        code,
    }
}

/// records ids and hashtag roots in address order. A later address wins
pub fn collect_symbols(code: &[Instruction]) -> SymbolTable {
    let mut symbols = SymbolTable::new();
    for (address, instr) in code.iter().enumerate() {
        if let Some(id) = &instr.id {
            define(&mut symbols, strip_sigil(id), address);
        }
        for tag in &instr.tags {
            collect_hashtags(&mut symbols, tag, address);
        }
    }
    symbols
}

fn collect_hashtags(symbols: &mut SymbolTable, tag: &Tag, address: usize) {
    if tag.kind == TagKind::Hashtag {
        define(symbols, strip_sigil(&tag.root), address);
    }
    for segment in &tag.segments {
        if let Segment::Nested(nested) = segment {
            collect_hashtags(symbols, nested, address);
        }
    }
}

fn define(symbols: &mut SymbolTable, name: &str, address: usize) {
    if let Some(old) = symbols.insert(name.to_owned(), address) {
        if old != address {
            debug!(symbol = name, old, new = address, "symbol redefined");
        }
    }
}

/// walks the segments, keeping the address of the last one that resolves
pub fn resolve_tag(tag: &mut Tag, symbols: &SymbolTable) {
    let mut address = UNRESOLVED;
    for segment in tag.segments.iter_mut() {
        if let Segment::Nested(nested) = segment {
            resolve_tag(nested, symbols);
        }
        if let Some(a) = symbols.get(strip_sigil(segment.name())) {
            address = *a as Address;
        }
    }
    if tag.segments.is_empty() {
        if let Some(a) = symbols.get(strip_sigil(&tag.root)) {
            address = *a as Address;
        }
    }
    let path: Vec<String> = tag.path().into_iter().map(str::to_owned).collect();
    tag.target = path.last().cloned();
    tag.original = Some(match tag.kind {
        TagKind::Hashtag => format!("#{}", strip_sigil(&tag.root)),
        TagKind::Reference => format!("@{}", path.join("::")),
    });
    tag.address = address;
    if address == UNRESOLVED {
        warn!(tag = %tag, "tag could not be resolved");
    }
}

/// replaces every string leaf of params and tags with its index into a fresh pool
pub fn pool(code: Vec<Instruction>) -> (TextPool, BTreeMap<usize, Instruction<TextIdx>>) {
    let mut text = TextPool::new();
    let pooled = code
        .into_iter()
        .enumerate()
        .map(|(address, instr)| {
            let pooled = instr.try_map_text(&mut |s: String| Ok::<_, Infallible>(text.intern(&s)));
            match pooled {
                Ok(instr) => (address, instr),
                Err(never) => match never {},
            }
        })
        .collect();
    (text, pooled)
}
