//! the error type that any stage of the pipeline can produce

use thiserror::Error;

use crate::{compiler, parser, vm};

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Syntax(#[from] parser::SyntaxError),

    #[error(transparent)]
    Schema(#[from] crate::core::SchemaError),

    #[error(transparent)]
    Compilation(#[from] compiler::CompilationError),

    #[error(transparent)]
    Runtime(#[from] vm::Error),
}
