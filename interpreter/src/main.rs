use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use krakoa_lib::config::{RunConfig, DEFAULT_STEP_BUDGET};
use krakoa_lib::vm::{RunOutcome, Runtime};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

mod console;
mod script;
mod watcher;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// number of steps after which a run is cut off
    #[arg(long, global = true, env = "KRAKOA_STEP_BUDGET", default_value_t = DEFAULT_STEP_BUDGET)]
    budget: usize,

    /// log filter, used when RUST_LOG is not set
    #[arg(long, global = true, env = "KRAKOA_LOG", default_value = "warn")]
    log: String,
}

#[derive(Subcommand)]
enum Command {
    /// compile a script and run it
    Run {
        script: PathBuf,

        #[cfg(feature = "dev")]
        #[arg(short = 'a', long)]
        show_ast: bool,

        #[cfg(feature = "dev")]
        #[arg(short = 'p', long)]
        show_program: bool,
    },
    /// compile a script to program json
    Compile {
        script: PathBuf,

        /// where to write the json, stdout if missing
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// run program json written by `compile`
    Exec { program: PathBuf },
    /// interactive step debugger
    Console { script: Option<PathBuf> },
    /// recompile the scripts in a directory whenever they change
    Watch {
        #[arg(default_value = ".")]
        dir: PathBuf,

        /// how long to collect file events before recompiling, in milliseconds
        #[arg(long, default_value_t = 200)]
        debounce: u64,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| cli.log.as_str().into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
    let config = RunConfig {
        step_budget: cli.budget,
    };

    match cli.command {
        #[cfg(feature = "dev")]
        Command::Run {
            script,
            show_ast,
            show_program,
        } => {
            if show_ast {
                let src = fs::read_to_string(&script)?;
                println!("{:#?}", krakoa_lib::parser::parse(&src)?);
                return Ok(());
            }
            let program = script::compile_file(&script)?;
            if show_program {
                println!("{}", program.to_json()?);
                return Ok(());
            }
            run(Runtime::new(program), &config)
        }
        #[cfg(not(feature = "dev"))]
        Command::Run { script } => run(Runtime::new(script::compile_file(&script)?), &config),
        Command::Compile { script, output } => {
            let json = script::compile_file(&script)?.to_json()?;
            match output {
                Some(path) => fs::write(&path, json)
                    .with_context(|| format!("writing {}", path.display()))?,
                None => println!("{}", json),
            }
            Ok(())
        }
        Command::Exec { program } => run(Runtime::new(script::load_program(&program)?), &config),
        Command::Console { script } => console::run(script.as_deref()),
        Command::Watch { dir, debounce } => watcher::run(&dir, Duration::from_millis(debounce)),
    }
}

/// runs to the end and prints the root frame
fn run(mut rt: Runtime, config: &RunConfig) -> Result<()> {
    let outcome = rt.run_with(config);
    println!("{}", serde_json::to_string_pretty(&rt.stack[0].to_json())?);
    match outcome {
        RunOutcome::Halted { steps } => {
            eprintln!("{} after {} steps", rt.registers.status, steps);
            Ok(())
        }
        RunOutcome::Stalled { steps } => {
            eprintln!("stalled at {} after {} steps", rt.registers.ip, steps);
            Ok(())
        }
        RunOutcome::BudgetExhausted { steps } => {
            bail!("step budget exhausted after {} steps, ip = {}", steps, rt.registers.ip)
        }
    }
}
