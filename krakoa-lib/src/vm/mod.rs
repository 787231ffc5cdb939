//! The register machine that executes a [`Program`].
//!
//! The machine has four registers: `ip`, `status`, `esp` (top of the data stack) and `bsp`
//! (the frame of the active trigger scope, or the root frame). Every [`Runtime::step`]
//! fetches the instruction at `ip`, decodes its pooled strings, dispatches it to the
//! `exec_` function for its opcode (see [`handlers`]) and then moves `ip` on, unless the
//! handler jumped itself.

use derive_more::Display;
use thiserror::Error;
use tracing::{debug, error, trace};

use std::collections::HashMap;
use std::result::Result as StdResult;
use std::sync::Arc;

use crate::config::RunConfig;
use crate::core::*;

pub mod frame;
pub mod handlers;
pub mod lambda;

pub use frame::*;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Runtime error: {0}")]
    Runtime(String),

    #[error("Rogue inheritance at {address}: no active trigger scope")]
    RogueInheritance { address: usize },

    #[error("Rogue return at {address}: nothing to return to")]
    RogueReturn { address: usize },

    #[error("{op} at {address} needs an id")]
    MissingId { address: usize, op: OpCode },

    #[error("Unknown link mode '{mode}' at {address}")]
    UnknownMode { address: usize, mode: String },

    #[error("Instruction {address} references text that is not in the pool")]
    DanglingText { address: usize },

    #[error("No instruction at {0}")]
    NoInstruction(Address),
}

pub type Result<T> = StdResult<T, Error>;
pub type ExecResult = Result<()>;

macro_rules! rt_err{
    ($msg:literal $(, $args:expr)*) => { Error::Runtime(format!($msg $(, $args)*)) };
}
pub(crate) use rt_err;

macro_rules! bail{
    ($($err:tt)*) => {
        return Err(Error::$($err)*)
    };
}
pub(crate) use bail;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Status {
    #[display(fmt = "RUNNING")]
    Running,
    #[display(fmt = "HALTED")]
    Halted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Registers {
    pub ip: Address,
    pub status: Status,
    pub esp: usize,
    pub bsp: usize,
}

/// a decoded instruction together with its address
#[derive(Debug, Clone, PartialEq)]
pub struct Fetched {
    pub address: usize,
    pub instr: Instruction,
}

/// how [`Runtime::run`] ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Halted { steps: usize },
    /// `ip` points at no instruction while the machine is still running
    Stalled { steps: usize },
    BudgetExhausted { steps: usize },
}

impl RunOutcome {
    pub fn steps(&self) -> usize {
        match self {
            RunOutcome::Halted { steps }
            | RunOutcome::Stalled { steps }
            | RunOutcome::BudgetExhausted { steps } => *steps,
        }
    }
}

/// a handler for an opcode glyph, registered with [`Runtime::register_plugin`]
pub type Plugin = Arc<dyn Fn(&mut Runtime, &Fetched) -> ExecResult + Send + Sync>;

pub struct Runtime {
    pub program: Arc<Program>,
    pub registers: Registers,
    pub stack: DataStack,
    plugins: HashMap<String, Plugin>,
    /// set by [`Runtime::jump`], reset before every dispatch
    jumped: bool,
}

impl Runtime {
    pub fn new(program: impl Into<Arc<Program>>) -> Self {
        let mut rt = Self {
            program: program.into(),
            registers: Registers {
                ip: 0,
                status: Status::Running,
                esp: 0,
                bsp: 0,
            },
            stack: DataStack::root(),
            plugins: HashMap::new(),
            jumped: false,
        };
        rt.reset();
        rt
    }

    pub fn reset(&mut self) {
        self.registers = Registers {
            ip: self.program.entry as Address,
            status: Status::Running,
            esp: 0,
            bsp: 0,
        };
        self.stack = DataStack::root();
        self.jumped = false;
    }

    /// Registers `handler` for `glyph`. Plugins are consulted before the built in
    /// handlers, so they can also override them.
    pub fn register_plugin(
        &mut self,
        glyph: impl Into<String>,
        handler: impl Fn(&mut Runtime, &Fetched) -> ExecResult + Send + Sync + 'static,
    ) {
        self.plugins.insert(glyph.into(), Arc::new(handler));
    }

    pub fn is_running(&self) -> bool {
        self.registers.status == Status::Running
    }

    pub fn halt(&mut self) {
        self.registers.status = Status::Halted;
    }

    /// sets `ip`, the step will not advance on its own afterwards
    pub fn jump(&mut self, target: Address) {
        self.registers.ip = target;
        self.jumped = true;
    }

    /// fetches and decodes the instruction at `address`
    pub fn decode(&self, address: Address) -> Result<Fetched> {
        let raw = self
            .program
            .fetch(address)
            .ok_or(Error::NoInstruction(address))?;
        let address = address as usize;
        let text = &self.program.text;
        let instr = raw
            .clone()
            .try_map_text(&mut |idx| text.get(idx).map(str::to_owned).ok_or(()))
            .map_err(|_| Error::DanglingText { address })?;
        Ok(Fetched { address, instr })
    }

    pub fn view(&self) -> FrameView {
        FrameView::new(&self.stack, self.registers.bsp)
    }

    /// evaluates lambdas (also inside lists and maps), other values are returned as they
    /// are. `None` is undefined
    pub fn evaluate(&self, val: &Value) -> Option<Value> {
        match val {
            Value::Lambda(l) => lambda::evaluate_or_undefined(&l.code, &self.view()),
            Value::List(elems) => Some(Value::List(
                elems
                    .iter()
                    .map(|e| self.evaluate(e).unwrap_or(Value::Null))
                    .collect(),
            )),
            Value::Map(entries) => Some(Value::Map(
                entries
                    .iter()
                    .filter_map(|(k, v)| Some((k.clone(), self.evaluate(v)?)))
                    .collect(),
            )),
            other => Some(other.clone()),
        }
    }

    /// the trigger scope of the frame at `bsp`
    pub fn active_scope(&self) -> Option<&TriggerScope> {
        self.stack
            .get(self.registers.bsp)
            .and_then(|f| f.scope.as_ref())
    }

    pub fn active_scope_mut(&mut self) -> Option<&mut TriggerScope> {
        let bsp = self.registers.bsp;
        self.stack.get_mut(bsp).and_then(|f| f.scope.as_mut())
    }

    pub fn base_frame_mut(&mut self) -> Result<&mut Frame> {
        let bsp = self.registers.bsp;
        self.stack
            .get_mut(bsp)
            .ok_or_else(|| rt_err!("bsp {} points past the stack", bsp))
    }

    /// Executes one instruction. Returns false, without doing anything, if the machine
    /// is halted or there is no instruction at `ip`.
    pub fn step(&mut self) -> bool {
        if !self.is_running() || self.program.fetch(self.registers.ip).is_none() {
            return false;
        }
        let address = self.registers.ip;
        let fetched = match self.decode(address) {
            Ok(fetched) => fetched,
            Err(e) => {
                error!(address, error = %e, "could not decode instruction");
                // it can't run, but its successor is still known
                let next = self
                    .program
                    .fetch(address)
                    .and_then(|i| i.next.first().copied())
                    .unwrap_or(UNRESOLVED);
                self.advance_to(next);
                return true;
            }
        };

        self.jumped = false;
        debug!(address, op = %fetched.instr.op, id = ?fetched.instr.id, "dispatch");
        let succeeded = match self.dispatch(&fetched) {
            Ok(()) => true,
            Err(e) => {
                error!(address, op = %fetched.instr.op, error = %e, "handler failed");
                false
            }
        };

        if self.jumped {
            if self.program.fetch(self.registers.ip).is_none() {
                trace!(target = self.registers.ip, "jumped out of the program");
                self.halt();
            }
            return true;
        }
        self.after_dispatch(&fetched, succeeded);
        true
    }

    /// steps until the machine halts or stalls, or `budget` steps were executed
    pub fn run(&mut self, budget: usize) -> RunOutcome {
        let mut steps = 0;
        loop {
            if !self.is_running() {
                return RunOutcome::Halted { steps };
            }
            if steps >= budget {
                return RunOutcome::BudgetExhausted { steps };
            }
            if !self.step() {
                return if self.is_running() {
                    RunOutcome::Stalled { steps }
                } else {
                    RunOutcome::Halted { steps }
                };
            }
            steps += 1;
        }
    }

    pub fn run_with(&mut self, config: &RunConfig) -> RunOutcome {
        self.run(config.step_budget)
    }

    fn dispatch(&mut self, fetched: &Fetched) -> ExecResult {
        if let Some(plugin) = self.plugins.get(fetched.instr.op.glyph()).cloned() {
            return plugin(self, fetched);
        }
        use OpCode::*;
        match &fetched.instr.op {
            Fragment | Concept | Entity | Collection | Content | Logic | Asset | State
            | Stance | Time | Shield | Utility | Function | Action | Intent | Authority
            | Alliance | Conflict => handlers::exec_contextual(self, fetched),
            Trigger => handlers::exec_trigger(self, fetched),
            Anchor => handlers::exec_anchor(self, fetched),
            Link => handlers::exec_link(self, fetched),
            Speech => handlers::exec_speech(self, fetched),
            Signal => handlers::exec_signal(self, fetched),
            Unknown(glyph) => {
                debug!(glyph = %glyph, "no handler, skipping");
                Ok(())
            }
        }
    }

    fn after_dispatch(&mut self, fetched: &Fetched, succeeded: bool) {
        let address = fetched.address as Address;

        let resume = self.active_scope_mut().and_then(|scope| {
            match scope.excursion {
                Some(exc) if exc.target == address => {
                    scope.excursion = None;
                    Some(exc.resume)
                }
                _ => None,
            }
        });
        if let Some(resume) = resume {
            trace!(address, resume, "excursion returns");
            self.advance_to(resume);
            return;
        }

        // only a body that ran without error may return early
        let implicit_return = self
            .active_scope()
            .filter(|s| succeeded && s.address as Address == address - 1 && !s.is_executing)
            .map(|s| s.address as Address);
        if let Some(trigger) = implicit_return {
            trace!(address, trigger, "implicit return");
            self.advance_to(trigger);
            return;
        }

        self.advance_to(fetched.instr.next.first().copied().unwrap_or(UNRESOLVED));
    }

    fn advance_to(&mut self, target: Address) {
        self.registers.ip = target;
        if self.program.fetch(target).is_none() {
            self.halt();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::compile;
    use crate::parser::parse;

    fn runtime(src: &str) -> Runtime {
        Runtime::new(compile(&parse(src).unwrap()).unwrap())
    }

    #[test]
    fn test_step_on_halted_machine() {
        let mut rt = runtime(r#"📌("A");"#);
        assert!(rt.step());
        assert_eq!(rt.registers.status, Status::Halted);
        assert!(!rt.step());
        assert_eq!(rt.registers.status.to_string(), "HALTED");
    }

    #[test]
    fn test_empty_program_stalls() {
        let mut rt = Runtime::new(Program::default());
        assert_eq!(rt.run(10), RunOutcome::Stalled { steps: 0 });
    }

    #[test]
    fn test_unknown_opcodes_advance() {
        let mut rt = runtime(r#"🧪("x"); 📌("A");"#);
        assert_eq!(rt.run(10), RunOutcome::Halted { steps: 2 });
        assert!(rt.stack.iter().any(|f| f.get("A").is_some()));
    }

    #[test]
    fn test_plugins_override() {
        let mut rt = runtime(r#"🧪("x"); 📌("A");"#);
        rt.register_plugin("🧪", |rt, f| {
            rt.stack.push(Frame::with_entry("plugin", Value::number(f.address as f64)));
            Ok(())
        });
        rt.register_plugin("📌", |_, _| Ok(()));
        rt.run(10);
        assert_eq!(rt.stack.len(), 2);
        assert_eq!(rt.stack[1].get("plugin"), Some(&Value::number(0.0)));
    }

    #[test]
    fn test_budget() {
        let mut rt = runtime(r#"📌("A"); 📌("B"); 📌("C");"#);
        assert_eq!(rt.run(2), RunOutcome::BudgetExhausted { steps: 2 });
        assert_eq!(rt.registers.ip, 2);
        assert_eq!(rt.run(2), RunOutcome::Halted { steps: 1 });
    }

    #[test]
    fn test_reset() {
        let mut rt = runtime(r#"📌("A"); ➔ 👤("W");"#);
        rt.run(100);
        rt.reset();
        assert_eq!(rt.registers.ip, 1);
        assert_eq!(rt.registers.status, Status::Running);
        assert_eq!(rt.stack.len(), 1);
        assert_eq!((rt.registers.esp, rt.registers.bsp), (0, 0));
    }

    #[test]
    fn test_failing_handler_does_not_halt() {
        // no id, the contextual handler fails, the machine moves on
        let mut rt = runtime(r#"📌(value: 3); 📌("B");"#);
        assert!(rt.step());
        assert_eq!(rt.registers.ip, 1);
        assert_eq!(rt.run(10), RunOutcome::Halted { steps: 1 });
    }

    #[test]
    fn test_failing_body_entry_does_not_return() {
        // 0 ➔, 1 👤 without id, 2 📌, then back to ➔ which exits
        let mut rt = runtime(r#"➔ 👤(mood: "x") { 📌("B"); }"#);
        assert!(rt.step());
        assert!(rt.step());
        assert_eq!(rt.registers.ip, 2);
        assert_eq!(rt.run(100), RunOutcome::Halted { steps: 2 });
    }
}
