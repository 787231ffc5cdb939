//! The interactive console: a step debugger over a [`Runtime`].
//!
//! Lines starting with `.` are commands, anything else is a script snippet that is
//! compiled into a fresh runtime. Input is buffered until its braces are balanced, so
//! snippets can span lines. `:name` aliases expand to glyphs (`:entity` → 👤).

use anyhow::{anyhow, bail, Result};
use crossterm::{cursor, execute, style::Stylize, terminal};
use krakoa_lib::core::Address;
use krakoa_lib::vm::{Runtime, Status};
use once_cell::sync::Lazy;
use rustyline::completion::{Completer, Pair};
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::history::DefaultHistory;
use rustyline::validate::Validator;
use rustyline::{Context, Editor, Helper};
use serde_json::json;

use std::collections::BTreeMap;
use std::io::{stdout, Write};
use std::path::{Path, PathBuf};

use crate::script;

/// instructions shown around `ip`
const WINDOW: usize = 5;

static SNIPPETS: Lazy<BTreeMap<&'static str, &'static str>> = Lazy::new(|| {
    BTreeMap::from([
        (":fragment", "📑"),
        (":concept", "🧠"),
        (":entity", "👤"),
        (":collection", "📦"),
        (":content", "📂"),
        (":logic", "🧬"),
        (":asset", "🔓"),
        (":state", "📌"),
        (":tag", "🔑"),
        (":stance", "🧩"),
        (":time", "⌛"),
        (":shield", "🛡️"),
        (":utility", "🩺"),
        (":function", "💉"),
        (":action", "🚀"),
        (":intent", "🎭"),
        (":link", "🔗"),
        (":authority", "🔱"),
        (":alliance", "🤝"),
        (":conflict", "⚔️"),
        (":trigger", "➔"),
        (":anchor", "⚓"),
        (":signal", "📡"),
        (":speech", "💬"),
    ])
});

#[derive(Debug, Clone, PartialEq)]
pub enum UserCommand {
    Load(PathBuf),
    Step(usize),
    Print,
    Clear,
    Help,
    Exit,
    /// an empty line repeats the last command
    LastCommand,
    Snippet(String),
}

#[derive(Default)]
pub struct Console {
    runtime: Option<Runtime>,
    buffer: String,
    last_cmd: Option<UserCommand>,
}

impl Console {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_script(path: &Path) -> Result<Self> {
        let mut console = Self::new();
        console.runtime = Some(Runtime::new(script::compile_file(path)?));
        Ok(console)
    }

    pub fn runtime(&self) -> Option<&Runtime> {
        self.runtime.as_ref()
    }

    /// Buffers `line`. Returns the command once the buffered input is complete.
    pub fn feed(&mut self, line: &str) -> Result<Option<UserCommand>> {
        self.buffer.push_str(line);
        self.buffer.push('\n');
        if brace_depth(&self.buffer) > 0 {
            return Ok(None);
        }
        let input = std::mem::take(&mut self.buffer);
        parse_line(&input).map(Some)
    }

    pub fn is_buffering(&self) -> bool {
        !self.buffer.is_empty()
    }

    /// Executes `cmd`, writing what it has to say to `out`. Returns false on `.exit`.
    pub fn execute(&mut self, cmd: UserCommand, out: &mut impl Write) -> Result<bool> {
        let cmd = match (cmd, &self.last_cmd) {
            (UserCommand::LastCommand, Some(last)) => last.clone(),
            // nothing to repeat yet
            (UserCommand::LastCommand, None) => return Ok(true),
            (cmd, _) => cmd,
        };
        use UserCommand::*;
        match &cmd {
            Load(path) => {
                let rt = Runtime::new(script::compile_file(path)?);
                writeln!(out, "loaded {} instructions", rt.program.len())?;
                self.runtime = Some(rt);
            }
            Snippet(src) => {
                let rt = Runtime::new(script::compile_str(src, false)?);
                writeln!(
                    out,
                    "compiled {} instructions, .step to execute",
                    rt.program.len()
                )?;
                self.runtime = Some(rt);
            }
            Step(n) => {
                let rt = self.loaded_mut()?;
                for _ in 0..*n {
                    if !rt.step() {
                        break;
                    }
                }
                render_state(rt, out)?;
                if rt.registers.status == Status::Halted {
                    writeln!(out, "{}", "[SYSTEM]: Program execution halted.".yellow())?;
                }
            }
            Print => {
                let rt = self.loaded_mut()?;
                let frames: Vec<_> = rt.stack.iter().map(|f| f.to_json()).collect();
                let state = json!({
                    "registers": {
                        "ip": rt.registers.ip,
                        "status": rt.registers.status.to_string(),
                        "esp": rt.registers.esp,
                        "bsp": rt.registers.bsp,
                    },
                    "stack": frames,
                });
                writeln!(out, "{}", serde_json::to_string_pretty(&state)?)?;
            }
            Clear => {
                execute!(
                    out,
                    terminal::Clear(terminal::ClearType::All),
                    cursor::MoveTo(0, 0)
                )?;
            }
            Help => writeln!(out, "{}", help())?,
            Exit => return Ok(false),
            LastCommand => {}
        }
        self.last_cmd = Some(cmd);
        Ok(true)
    }

    fn loaded_mut(&mut self) -> Result<&mut Runtime> {
        self.runtime
            .as_mut()
            .ok_or_else(|| anyhow!("No program loaded. Use .load <path>"))
    }
}

pub fn parse_line(input: &str) -> Result<UserCommand> {
    use UserCommand::*;
    let input = input.trim();
    if input.is_empty() {
        return Ok(LastCommand);
    }
    if !input.starts_with('.') {
        return Ok(Snippet(expand_aliases(input)));
    }

    let (cmd, arg) = input.split_once(char::is_whitespace).unwrap_or((input, ""));
    match cmd {
        ".load" | ".loa" => {
            let path = script::unquote(arg);
            if path.is_empty() {
                bail!("No program path has been supplied");
            }
            Ok(Load(path.into()))
        }
        ".step" | ".st" => match arg.trim() {
            "" => Ok(Step(1)),
            n => Ok(Step(n.parse()?)),
        },
        ".print" | ".pri" => Ok(Print),
        ".clear" | ".cl" => Ok(Clear),
        ".help" => Ok(Help),
        ".exit" | ".ex" => Ok(Exit),
        other => bail!("Invalid command {}, try .help", other),
    }
}

/// replaces every `:alias` word with its glyph
pub fn expand_aliases(input: &str) -> String {
    let mut res = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(start) = rest.find(':') {
        res.push_str(&rest[..start]);
        let word_len = rest[start + 1..]
            .find(|c: char| !c.is_ascii_alphabetic())
            .unwrap_or(rest.len() - start - 1);
        let word = &rest[start..start + 1 + word_len];
        res.push_str(SNIPPETS.get(word).copied().unwrap_or(word));
        rest = &rest[start + 1 + word_len..];
    }
    res.push_str(rest);
    res
}

/// opened minus closed braces
fn brace_depth(src: &str) -> i64 {
    src.chars().fold(0, |depth, c| match c {
        '{' => depth + 1,
        '}' => depth - 1,
        _ => depth,
    })
}

fn help() -> String {
    let mut lines = vec![
        ".load <path>   compile a script into a new runtime".to_owned(),
        ".step [n]      execute n instructions (default 1) and show the state".to_owned(),
        ".print         print registers and the whole data stack".to_owned(),
        ".clear         clear the screen".to_owned(),
        ".exit          leave the console".to_owned(),
        "<snippet>      compile a snippet into a new runtime".to_owned(),
        "<enter>        repeat the last command".to_owned(),
        String::new(),
        "aliases:".to_owned(),
    ];
    lines.extend(SNIPPETS.iter().map(|(alias, glyph)| format!("  {alias} {glyph}")));
    lines.join("\n")
}

fn render_state(rt: &Runtime, out: &mut impl Write) -> Result<()> {
    let regs = &rt.registers;
    writeln!(
        out,
        "{}",
        format!(
            "[ IP: {} | Status: {} | ESP: {} | BSP: {} | Symbols: {} ]",
            regs.ip,
            regs.status,
            regs.esp,
            regs.bsp,
            rt.program.symbols.len()
        )
        .bold()
    )?;
    let context = rt
        .stack
        .get(regs.esp)
        .filter(|f| !f.data.is_empty())
        .map(|f| serde_json::to_string_pretty(&f.to_json()))
        .transpose()?
        .unwrap_or_else(|| "empty".into());
    writeln!(out, "{}", format!("Context: [ {} ]", context).dark_grey())?;
    writeln!(out)?;
    for line in instruction_window(rt) {
        writeln!(out, "{}", line)?;
    }
    Ok(())
}

/// up to [`WINDOW`] decoded instructions around `ip`, the current one marked
pub fn instruction_window(rt: &Runtime) -> Vec<String> {
    let ip = rt.registers.ip;
    let first = (ip - (WINDOW / 2) as Address).max(0);
    (first..first + WINDOW as Address)
        .filter_map(|addr| rt.decode(addr).ok())
        .map(|f| {
            let pointer = if f.address as Address == ip { "  ==>  " } else { "       " };
            let params: Vec<_> = f
                .instr
                .params
                .iter()
                .filter(|(k, _)| k.as_str() != "id")
                .map(|(k, v)| format!("{k}: {v}"))
                .collect();
            format!(
                "{pointer}{:>3}: {} {} ({}) -> {:?}",
                f.address,
                f.instr.op,
                f.instr.id.as_deref().unwrap_or(""),
                params.join(", "),
                f.instr.next
            )
        })
        .collect()
}

/// completes a `:alias` under the cursor to its glyph
struct AliasHelper;

impl Completer for AliasHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        let start = line[..pos]
            .rfind(char::is_whitespace)
            .map_or(0, |i| i + 1);
        let word = &line[start..pos];
        if !word.starts_with(':') {
            return Ok((start, vec![]));
        }
        let hits = SNIPPETS
            .iter()
            .filter(|(alias, _)| alias.starts_with(word))
            .map(|(alias, glyph)| Pair {
                display: format!("{alias} {glyph}"),
                replacement: (*glyph).to_owned(),
            })
            .collect();
        Ok((start, hits))
    }
}

impl Hinter for AliasHelper {
    type Hint = String;
}
impl Highlighter for AliasHelper {}
impl Validator for AliasHelper {}
impl Helper for AliasHelper {}

pub fn run(script: Option<&Path>) -> Result<()> {
    let mut console = match script {
        Some(path) => Console::with_script(path)?,
        None => Console::new(),
    };
    let mut rl: Editor<AliasHelper, DefaultHistory> = Editor::new()?;
    rl.set_helper(Some(AliasHelper));
    let mut out = stdout();

    writeln!(out, "--- 🧠 KRAKOA CONSOLE --- (.help for help)")?;
    loop {
        let prompt = if console.is_buffering() { "... " } else { ">>> " };
        let line = match rl.readline(prompt) {
            Ok(line) => line,
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => return Ok(()),
            Err(other) => return Err(other.into()),
        };
        if !line.trim().is_empty() {
            let _ = rl.add_history_entry(line.as_str());
        }
        let res = console
            .feed(&line)
            .and_then(|cmd| match cmd {
                Some(cmd) => console.execute(cmd, &mut out),
                None => Ok(true),
            });
        match res {
            Ok(true) => {}
            Ok(false) => return Ok(()),
            Err(e) => eprintln!("Error: {:#}", e),
        }
        out.flush()?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_all(console: &mut Console, lines: &[&str]) -> Vec<UserCommand> {
        lines
            .iter()
            .filter_map(|l| console.feed(l).unwrap())
            .collect()
    }

    #[test]
    fn test_parse_line() {
        use UserCommand::*;
        assert_eq!(parse_line(".step").unwrap(), Step(1));
        assert_eq!(parse_line(".st 3").unwrap(), Step(3));
        assert_eq!(parse_line(".load 'a.kts'").unwrap(), Load("a.kts".into()));
        assert_eq!(parse_line("  ").unwrap(), LastCommand);
        assert_eq!(parse_line(".ex").unwrap(), Exit);
        assert!(parse_line(".load").is_err());
        assert!(parse_line(".fly").is_err());
        assert_eq!(
            parse_line(r#":entity("Wade");"#).unwrap(),
            Snippet(r#"👤("Wade");"#.into())
        );
    }

    #[test]
    fn test_expand_aliases() {
        assert_eq!(
            expand_aliases(r#":trigger :entity("W") { :state("S", value: 1); }"#),
            r#"➔ 👤("W") { 📌("S", value: 1); }"#
        );
        assert_eq!(expand_aliases(":nothing"), ":nothing");
        assert_eq!(expand_aliases("a:"), "a:");
    }

    #[test]
    fn test_multi_line_snippets() {
        let mut console = Console::new();
        let cmds = feed_all(&mut console, &[r#"➔ 👤("Wade") {"#, r#"  📌("Health", value: 100);"#]);
        assert!(cmds.is_empty());
        assert!(console.is_buffering());
        let cmds = feed_all(&mut console, &["}"]);
        assert!(matches!(cmds.as_slice(), [UserCommand::Snippet(_)]));
        assert!(!console.is_buffering());
    }

    #[test]
    fn test_stepping_a_snippet() {
        let mut console = Console::new();
        let mut out = vec![];
        assert!(console.execute(UserCommand::Step(1), &mut out).is_err());

        let snippet = parse_line(r#":trigger :entity("Wade") { :state("Health", value: 100); }"#).unwrap();
        console.execute(snippet, &mut out).unwrap();
        console.execute(UserCommand::Step(2), &mut out).unwrap();
        assert_eq!(console.runtime().unwrap().registers.ip, 2);
        // enter repeats
        console.execute(UserCommand::LastCommand, &mut out).unwrap();
        console.execute(UserCommand::LastCommand, &mut out).unwrap();
        let rt = console.runtime().unwrap();
        assert_eq!(rt.registers.status, Status::Halted);
        assert!(rt.stack[0].get("Health").is_some());

        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("compiled 3 instructions"));
        assert!(text.contains("halted"));
        assert!(!console.execute(UserCommand::Exit, &mut vec![]).unwrap());
    }

    #[test]
    fn test_instruction_window() {
        let mut console = Console::new();
        let snippet = parse_line(r#"📌("A"); 📌("B"); 📌("C"); 📌("D"); 📌("E"); 📌("F"); 📌("G");"#).unwrap();
        console.execute(snippet, &mut vec![]).unwrap();
        console.execute(UserCommand::Step(3), &mut vec![]).unwrap();
        let window = instruction_window(console.runtime().unwrap());
        assert_eq!(window.len(), 5);
        assert!(window[0].contains("1: 📌 B"));
        assert!(window[2].starts_with("  ==>"));
    }
}
