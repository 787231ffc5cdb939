//! Loading scripts and programs from disk.

use anyhow::{Context, Result};
use krakoa_lib::compiler::{self, CompileOptions};
use krakoa_lib::core::{Node, Program};
use krakoa_lib::parser;
use krakoa_lib::utils::now_millis;

use std::fs;
use std::path::Path;

/// Compiles a script file. `.json` files are read as a node forest, everything else as
/// source text. Instructions are stamped with the current time.
pub fn compile_file(path: &Path) -> Result<Program> {
    let src = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let is_json = path.extension().map_or(false, |ext| ext == "json");
    compile_str(&src, is_json).with_context(|| format!("compiling {}", path.display()))
}

pub fn compile_str(src: &str, is_json: bool) -> Result<Program> {
    let forest = if is_json {
        Node::forest_from_json(src)?
    } else {
        parser::parse(src)?
    };
    let options = CompileOptions {
        timestamp: now_millis(),
    };
    Ok(compiler::compile_with(&forest, options)?)
}

/// reads the json a `compile` wrote
pub fn load_program(path: &Path) -> Result<Program> {
    let json = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    Program::from_json(&json).with_context(|| format!("loading program {}", path.display()))
}

/// the path argument of `.load`, quotes are optional
pub fn unquote(arg: &str) -> &str {
    arg.trim().trim_matches(|c| c == '\'' || c == '"')
}
