//! contains all important data structures

pub mod value;
pub use value::*;

pub mod opcode;
pub use opcode::*;

pub mod text_pool;
pub use text_pool::*;

pub mod node;
pub use node::*;

pub mod program;
pub use program::*;
