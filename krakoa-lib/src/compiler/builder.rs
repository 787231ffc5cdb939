use im::Vector;

use crate::core::*;

use super::{resolver, CompilationError, CompileOptions};

/// represents a program while it's being linearized
///
/// Instructions are pushed in depth first pre-order, so the address of an instruction is
/// its index. Since the span of a node is known before its body is compiled, every
/// instruction is pushed complete, nothing is patched afterwards.
#[derive(Debug, Clone)]
pub struct ProgramBuilder<'a> {
    /// the unlinked instructions, indexed by address
    pub code: Vector<Instruction>,
    /// address of the first top level trigger
    pub entry: Option<usize>,
    /// the whole input, reference tags are verified against it
    pub forest: &'a [Node],
    pub options: CompileOptions,
    depth: usize,
}

impl<'a> ProgramBuilder<'a> {
    pub fn new(forest: &'a [Node], options: CompileOptions) -> Self {
        Self {
            code: Vector::new(),
            entry: None,
            forest,
            options,
            depth: 0,
        }
    }

    /// the address the next pushed instruction will get
    pub fn next_address(&self) -> usize {
        self.code.len()
    }

    pub fn is_top_level(&self) -> bool {
        self.depth == 0
    }

    pub fn open_body(&mut self) {
        self.depth += 1;
    }

    pub fn close_body(&mut self) {
        self.depth -= 1;
    }

    /// remembers `address` as entry if it is the first top level trigger
    pub fn offer_entry(&mut self, address: usize) {
        if self.is_top_level() && self.entry.is_none() {
            self.entry = Some(address);
        }
    }

    /// checks every reference tag against the forest, hashtags are taken as they are
    pub fn verified_tags(&self, node: &Node) -> Result<Vec<Tag>, CompilationError> {
        for tag in node.tags.iter().filter(|t| t.kind == TagKind::Reference) {
            if let Err(unreachable) = resolver::locate(&tag.path(), self.forest) {
                return Err(CompilationError::UnreachableReference {
                    path: tag.to_string(),
                    segment: unreachable.segment,
                    container: unreachable.container,
                });
            }
        }
        Ok(node.tags.clone())
    }

    pub fn push(&mut self, instr: Instruction) {
        self.code.push_back(instr);
    }

    pub fn build(self) -> (Vec<Instruction>, usize) {
        (self.code.into_iter().collect(), self.entry.unwrap_or(0))
    }
}
