//! Interactive REPL driving a harness machine.

use crate::harness::parse_send_arg;
use colored::Colorize;
use exo_runtime::Machine;
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::{Config, Editor};
use serde_json::Value;
use tokio::sync::broadcast::error::RecvError;

const HELP_TEXT: &str = r#"
Available commands:
  help                          Show this help

  send <event> [payload]        Dispatch an event (payload is JSON)
  goto <target>                 Transition directly (state, .state, machine.state)

  state                         Show the current state
  store                         Show the store
  done <machine>                Show whether a machine reached a final state
  timers                        Show the number of armed wait timers

  quit, exit                    Exit the REPL
"#;

pub async fn run(machine: Machine<Value>) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", "exo REPL".bold().cyan());
    println!("Started in {}", machine.state().yellow());

    let subscription = machine.subscribe(|snapshot| {
        println!("{} {}", "->".green(), snapshot.state.yellow());
    });

    let mut errors = machine.errors();
    let error_task = tokio::spawn(async move {
        loop {
            match errors.recv().await {
                Ok(err) => println!("{}: {}", "Handler error".red(), err),
                Err(RecvError::Lagged(n)) => {
                    println!("{}: missed {} handler errors", "Warning".yellow(), n)
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    let config = Config::builder()
        .history_ignore_space(true)
        .auto_add_history(true)
        .build();
    let mut rl: Editor<(), DefaultHistory> = Editor::with_config(config)?;

    let history_path = std::env::var("HOME")
        .map(|h| std::path::PathBuf::from(h).join(".exo_history"))
        .unwrap_or_else(|_| ".exo_history".into());
    let _ = rl.load_history(&history_path);

    println!("Type 'help' for available commands.\n");

    loop {
        let prompt = format!("{} ", "exo>".cyan());
        match rl.readline(&prompt) {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                match execute_repl_command(&machine, line).await {
                    Ok(Some(output)) => println!("{}\n", output),
                    Ok(None) => break,
                    Err(e) => println!("{}: {}\n", "Error".red(), e),
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                continue;
            }
            Err(ReadlineError::Eof) => {
                println!("^D");
                break;
            }
            Err(err) => {
                println!("{}: {:?}", "Error".red(), err);
                break;
            }
        }
    }

    let _ = rl.save_history(&history_path);
    subscription.unsubscribe();
    error_task.abort();
    println!("{}", "Bye.".dimmed());

    Ok(())
}

async fn execute_repl_command(
    machine: &Machine<Value>,
    line: &str,
) -> Result<Option<String>, Box<dyn std::error::Error>> {
    let (cmd, rest) = match line.split_once(char::is_whitespace) {
        Some((cmd, rest)) => (cmd.to_lowercase(), rest.trim()),
        None => (line.to_lowercase(), ""),
    };

    match cmd.as_str() {
        "help" | "?" => Ok(Some(HELP_TEXT.to_string())),

        "quit" | "exit" | "q" => Ok(None),

        "send" | "s" => {
            if rest.is_empty() {
                return Ok(Some("Usage: send <event> [payload_json]".to_string()));
            }
            let (event, payload) = match rest.split_once(char::is_whitespace) {
                Some((event, payload)) => (event.to_string(), serde_json::from_str(payload.trim())?),
                None => parse_send_arg(rest)?,
            };
            let changed = machine.send(&event, payload).await?;
            if changed {
                Ok(Some(format!("{} {}", "State".green(), machine.state().yellow())))
            } else {
                Ok(Some(format!("{} ({})", "No change".dimmed(), machine.state())))
            }
        }

        "goto" | "g" => {
            if rest.is_empty() {
                return Ok(Some("Usage: goto <target>".to_string()));
            }
            machine.goto(rest)?;
            Ok(Some(format!("{} {}", "State".green(), machine.state().yellow())))
        }

        "state" => Ok(Some(machine.state().yellow().to_string())),

        "store" => Ok(Some(format_json(&machine.store()))),

        "done" => {
            if rest.is_empty() {
                return Ok(Some("Usage: done <machine>".to_string()));
            }
            match machine.is_done(rest) {
                Some(done) => Ok(Some(done.to_string())),
                None => Ok(Some(format!("{}: {}", "Unknown machine".red(), rest))),
            }
        }

        "timers" => Ok(Some(format!("{} armed", machine.pending_timers()))),

        _ => Ok(Some(format!(
            "{}: {}. Type 'help' for available commands.",
            "Unknown command".red(),
            cmd
        ))),
    }
}

fn format_json(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use exo_runtime::{Callback, MachineOptions};
    use serde_json::json;

    fn machine() -> Machine<Value> {
        Machine::from_source(
            MachineOptions::default(),
            json!({}),
            "main machine m { initial state idle { on:GO ${0} } state running {} }",
            vec![Callback::goto("running")],
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_send_and_state_commands() {
        colored::control::set_override(false);
        let machine = machine();

        let out = execute_repl_command(&machine, "state").await.unwrap();
        assert_eq!(out.as_deref(), Some("m.idle"));

        let out = execute_repl_command(&machine, "send NOPE").await.unwrap();
        assert_eq!(out.as_deref(), Some("No change (m.idle)"));

        let out = execute_repl_command(&machine, "send GO {\"why\": 1}").await.unwrap();
        assert_eq!(out.as_deref(), Some("State m.running"));
    }

    #[tokio::test]
    async fn test_goto_errors_are_returned() {
        let machine = machine();
        let err = execute_repl_command(&machine, "goto nowhere").await.unwrap_err();
        assert!(err.to_string().contains("nowhere"));
    }

    #[tokio::test]
    async fn test_misc_commands() {
        let machine = machine();
        assert_eq!(execute_repl_command(&machine, "quit").await.unwrap(), None);
        assert_eq!(
            execute_repl_command(&machine, "store").await.unwrap().as_deref(),
            Some("{}")
        );
        assert_eq!(
            execute_repl_command(&machine, "done m").await.unwrap().as_deref(),
            Some("false")
        );
        assert_eq!(
            execute_repl_command(&machine, "timers").await.unwrap().as_deref(),
            Some("0 armed")
        );
    }
}
