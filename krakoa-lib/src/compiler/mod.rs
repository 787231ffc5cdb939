//! Compiles a node forest into a [`Program`].
//!
//! 1. linearization: every node becomes one instruction, depth first, with `next`
//!    pointers describing the control flow (see [`Compilable`])
//! 1. linking: symbol table, tag resolution and string pooling (see [`linker`])

use thiserror::Error;
use tracing::debug;

use crate::core::*;

pub mod builder;
pub mod linker;
pub mod resolver;

pub use builder::ProgramBuilder;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompilationError {
    #[error("reference {path} is unreachable: could not find '{segment}' inside '{container}'")]
    UnreachableReference {
        path: String,
        segment: String,
        container: String,
    },
}

pub type CompilationResult = Result<(), CompilationError>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompileOptions {
    /// stamped on every instruction. Zero keeps compilation deterministic
    pub timestamp: u64,
}

pub trait Compilable {
    /// pushes the instructions for `self`. `ret` is where control goes after the last
    /// instruction, `-1` at the top level.
    fn compile(&self, builder: &mut ProgramBuilder, ret: Address) -> CompilationResult;
}

macro_rules! impl_compilable {
    ($t:ty: $self:ident, $builder:ident, $ret:ident => $code:tt) => {
        impl Compilable for $t {
            fn compile(&$self, $builder: &mut ProgramBuilder, $ret: Address) -> CompilationResult {
                $code
            }
        }
    };
}

impl_compilable! { [Node]: self, builder, ret => {
    for (i, node) in self.iter().enumerate() {
        let address = builder.next_address();
        let default_next = if i + 1 < self.len() {
            (address + node.span()) as Address
        } else {
            ret
        };
        node.compile(builder, default_next)?;
    }
    Ok(())
}}

// for a node, `ret` is its default successor
impl_compilable! { Node: self, builder, ret => {
    let address = builder.next_address();
    let body_entry = (address + 1) as Address;
    let has_body = !self.body.is_empty();
    if self.op == OpCode::Trigger {
        builder.offer_entry(address);
    }

    let next = match (&self.op, has_body) {
        (OpCode::Trigger, true) | (OpCode::Anchor, true) => vec![body_entry, ret],
        (OpCode::Trigger, false) => vec![address as Address, ret],
        (OpCode::Anchor, false) => vec![ret, ret],
        (_, true) => vec![body_entry],
        (_, false) => vec![ret],
    };
    let instr = Instruction {
        id: self.id().map(str::to_owned),
        op: self.op.clone(),
        timestamp: builder.options.timestamp,
        params: self.params.clone(),
        tags: builder.verified_tags(self)?,
        next,
        end: has_body.then(|| (address + self.span()) as Address),
    };
    debug!(address, op = %instr.op, next = ?instr.next, "linearized");
    builder.push(instr);

    if has_body {
        let body_ret = if self.op == OpCode::Trigger { address as Address } else { ret };
        builder.open_body();
        self.body.compile(builder, body_ret)?;
        builder.close_body();
    }
    Ok(())
}}

pub fn compile(forest: &[Node]) -> Result<Program, CompilationError> {
    compile_with(forest, CompileOptions::default())
}

pub fn compile_with(forest: &[Node], options: CompileOptions) -> Result<Program, CompilationError> {
    let mut builder = ProgramBuilder::new(forest, options);
    forest.compile(&mut builder, UNRESOLVED)?;
    let (code, entry) = builder.build();
    Ok(linker::link(code, entry))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    fn compiled(src: &str) -> Program {
        compile(&parse(src).unwrap()).unwrap()
    }

    #[test]
    fn test_linearization() {
        let prog = compiled(r#"🧠("C") { 📌("S", value: 5); 👤("E") { 📌("H"); } }; 📦("Box");"#);
        let next: Vec<_> = prog.code.values().map(|i| i.next.clone()).collect();
        assert_eq!(
            next,
            vec![vec![1], vec![2], vec![3], vec![4], vec![-1]]
        );
        assert_eq!(prog.code[&0].end, Some(4));
        assert_eq!(prog.code[&2].end, Some(4));
        assert_eq!(prog.code[&1].end, None);
        assert_eq!(prog.entry, 0);
    }

    #[test]
    fn test_trigger_layout() {
        let prog = compiled(r#"📌("A"); ➔ 👤("Wade") { 📌("Health", value: 100); }; 📌("B");"#);
        assert_eq!(prog.entry, 1);
        assert_eq!(prog.code[&1].next, vec![2, 4]);
        assert_eq!(prog.code[&1].end, Some(4));
        // the body returns into the trigger
        assert_eq!(prog.code[&3].next, vec![1]);
        assert_eq!(prog.code[&4].next, vec![-1]);
    }

    #[test]
    fn test_empty_trigger_and_anchor() {
        let prog = compiled(r#"➔ 🔗("Return"); ⚓("Gate", condition: false);"#);
        // ➔ wraps its element, so it has a body of one
        assert_eq!(prog.code[&0].next, vec![1, 2]);
        assert_eq!(prog.code[&1].next, vec![0]);
        assert_eq!(prog.code[&2].next, vec![-1, -1]);

        let mut lone = Node::new(OpCode::Trigger);
        lone.params.insert("to".into(), Value::str("x"));
        let prog = compile(&[lone]).unwrap();
        assert_eq!(prog.code[&0].next, vec![0, -1]);
    }

    #[test]
    fn test_nested_trigger_returns_to_enclosing_scope() {
        let prog = compiled(r#"➔ 👤("Outer") { ➔ 🧬("Inner") { 🚀("Go"); } }"#);
        // 0 ➔, 1 👤, 2 ➔, 3 🧬, 4 🚀
        assert_eq!(prog.code[&2].next, vec![3, 0]);
        assert_eq!(prog.code[&4].next, vec![2]);
    }

    #[test]
    fn test_unreachable_reference() {
        let forest = parse(r#"🧠("C") { 📌("S"); }; 👤("W") 🔑[@C::Missing];"#).unwrap();
        let err = compile(&forest).unwrap_err();
        assert_eq!(
            err,
            CompilationError::UnreachableReference {
                path: "@C::Missing".into(),
                segment: "Missing".into(),
                container: "C".into(),
            }
        );
    }

    #[test]
    fn test_forward_reference_and_lenient_hashtags() {
        let prog = compiled(r#"👤("W") 🔑[@Later, #Nowhere]; 📌("Later");"#);
        let tags = &prog.code[&0].tags;
        assert_eq!(tags[0].address, 1);
        assert_eq!(tags[0].original.as_deref(), Some("@Later"));
        // a hashtag defines its own root, so it resolves to its carrier
        assert_eq!(tags[1].address, 0);
        assert_eq!(prog.symbols["Nowhere"], 0);
    }

    #[test]
    fn test_timestamp_option() {
        let forest = parse(r#"📌("A");"#).unwrap();
        let prog = compile_with(&forest, CompileOptions { timestamp: 42 }).unwrap();
        assert_eq!(prog.code[&0].timestamp, 42);
    }
}
