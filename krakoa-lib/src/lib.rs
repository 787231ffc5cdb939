//! To execute a script:
//! 1. parse the source into a forest of [`core::Node`]s with [`parser::parse`] (or load
//!    one from json with [`core::Node::forest_from_json`])
//! 1. compile the forest into a [`core::Program`] with [`compiler::compile`]. This
//!    linearizes the tree into addressed instructions, resolves the `#`/`@` tags and
//!    pools every string into the program's text pool
//! 1. create a [`vm::Runtime`] for the program, and step it until it halts:
//!
//!    ```
//!    use krakoa_lib::{compile_source, vm::{Runtime, RunOutcome}};
//!
//!    let program = compile_source(r#"➔ 👤("Wade") { 📌("Health", value: 100); }"#).unwrap();
//!    let mut rt = Runtime::new(program);
//!    assert!(matches!(rt.run(100), RunOutcome::Halted { .. }));
//!    assert!(rt.stack[0].get("Health").is_some());
//!    ```
//!
//! Programs serialize to json ([`core::Program::to_json`]), so compiling and running
//! can happen in different processes.

pub mod compiler;
pub mod config;
pub mod core;
pub mod error;
pub mod parser;
pub mod utils;
pub mod vm;

pub use error::Error;

/// parses and compiles `src` with default options
pub fn compile_source(src: &str) -> Result<crate::core::Program, Error> {
    let forest = parser::parse(src)?;
    Ok(compiler::compile(&forest)?)
}
