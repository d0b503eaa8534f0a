//! Command execution.

use crate::Commands;
use colored::Colorize;
use parking_lot::Mutex;
use serde_json::Value;
use statewright_core::{Callback, CallbackContext, Context, FsmError, MachineDefinition};
use statewright_viz::visualize;
use std::sync::Arc;

type Definition = MachineDefinition<String, String>;

/// Executes a command and returns the formatted output.
pub fn execute(
    definition: Definition,
    cmd: Commands,
) -> Result<String, Box<dyn std::error::Error>> {
    match cmd {
        Commands::Events { state } => {
            let machine = definition.build(Vec::new())?;
            if let Some(state) = state {
                machine.set_state(state);
            }
            let current = machine.current();
            let events = machine.available_transitions();
            if events.is_empty() {
                Ok(format!("{} from {}", "No events".yellow(), current.cyan()))
            } else {
                Ok(format!(
                    "{}\n{}",
                    format!("Events from {}", current.cyan()).bold(),
                    events.join("\n")
                ))
            }
        }

        Commands::Run {
            events,
            args,
            keep_going,
            verbose,
        } => {
            let args = match args {
                Some(arg) => match parse_json_arg(&arg)? {
                    Value::Array(values) => values,
                    value => vec![value],
                },
                None => Vec::new(),
            };
            run(definition, &events, args, keep_going, verbose)
        }

        Commands::Render { format, state } => {
            let machine = definition.build(Vec::new())?;
            if let Some(state) = state {
                machine.set_state(state);
            }
            Ok(visualize(&machine, format).trim_end().to_string())
        }

        Commands::Check => {
            let checksum = definition.checksum()?;
            let initial = definition.initial.clone();
            let machine = definition.build(Vec::new())?;
            Ok(format!(
                "{} definition ({} transitions, {} events, {} states, initial: {}, checksum: {})",
                "Valid".green(),
                machine.table().len(),
                machine.all_events().len(),
                machine.all_states().len(),
                initial.cyan(),
                checksum
            ))
        }
    }
}

fn run(
    definition: Definition,
    events: &[String],
    args: Vec<Value>,
    keep_going: bool,
    verbose: bool,
) -> Result<String, Box<dyn std::error::Error>> {
    let trace = Arc::new(Mutex::new(Vec::<String>::new()));
    let callbacks = if verbose { tracing_callbacks(&trace) } else { Vec::new() };
    let machine = definition.build(callbacks)?;
    let ctx = Context::background();

    let mut lines = Vec::new();
    for event in events {
        let from = machine.current();
        let result = machine.event(&ctx, event.clone(), args.clone());

        lines.append(&mut trace.lock());

        match result {
            Ok(()) => lines.push(format!(
                "{} {}: {} -> {}",
                "OK".green(),
                event.cyan(),
                from,
                machine.current()
            )),
            Err(e @ FsmError::NoTransition { .. }) => lines.push(format!(
                "{} {}: {} ({})",
                "Unchanged".yellow(),
                event.cyan(),
                from,
                e
            )),
            Err(e) => {
                lines.push(format!("{} {}: {}", "Rejected".red(), event.cyan(), e));
                if !keep_going {
                    break;
                }
            }
        }
    }
    lines.push(format!("{} {}", "Final state:".bold(), machine.current().cyan()));
    Ok(lines.join("\n"))
}

/// Callbacks that record each phase they observe.
fn tracing_callbacks(trace: &Arc<Mutex<Vec<String>>>) -> Vec<Callback<String, String>> {
    let record = |phase: &'static str| {
        let trace = trace.clone();
        move |cb: &mut CallbackContext<'_, String, String>| {
            let target = match phase {
                "leave" => cb.src(),
                "enter" => cb.dst(),
                _ => cb.event(),
            };
            trace.lock().push(format!("  {} {}", phase.dimmed(), target));
        }
    };
    vec![
        Callback::before_all_events(record("before")),
        Callback::leave_all_states(record("leave")),
        Callback::enter_all_states(record("enter")),
        Callback::after_all_events(record("after")),
    ]
}

/// Parses a JSON argument, or reads it from a file if prefixed with @.
fn parse_json_arg(arg: &str) -> Result<Value, Box<dyn std::error::Error>> {
    if let Some(path) = arg.strip_prefix('@') {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    } else {
        Ok(serde_json::from_str(arg)?)
    }
}
