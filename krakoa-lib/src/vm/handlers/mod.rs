//! The `exec_` functions, one module per opcode family. Each takes the runtime and the
//! decoded instruction, and either falls through (the runtime advances `ip`) or jumps.

mod absorb;
mod anchor;
mod contextual;
mod link;
mod speech;
mod trigger;

pub use absorb::*;
pub use anchor::*;
pub use contextual::*;
pub use link::*;
pub use speech::*;
pub use trigger::*;
