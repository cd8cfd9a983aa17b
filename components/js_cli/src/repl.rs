//! REPL (Read-Eval-Print Loop) implementation

use crate::error::{CliError, CliResult};
use crate::runtime::Runtime;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

const PROMPT: &str = "> ";
const CONTINUATION_PROMPT: &str = "... ";

/// What the REPL should do after a dot command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Continue,
    Exit,
}

/// Run the interactive REPL
///
/// Each complete entry is evaluated, then the microtask queue is drained.
/// Timers stay queued until a later entry drains them or the session ends.
///
/// # Arguments
/// * `runtime` - The Runtime instance to use for execution
///
/// # Returns
/// `Ok(())` when REPL exits normally
pub fn run_repl(runtime: &Runtime) -> CliResult<()> {
    let mut editor = DefaultEditor::new()
        .map_err(|e| CliError::ReplError(format!("Failed to initialize editor: {}", e)))?;

    println!("jsrt v{}", env!("CARGO_PKG_VERSION"));
    println!("Type .help for commands, .exit or Ctrl-D to quit.");

    let mut line_buffer = String::new();

    loop {
        let in_multiline = !line_buffer.is_empty();
        let prompt = if in_multiline { CONTINUATION_PROMPT } else { PROMPT };

        match editor.readline(prompt) {
            Ok(line) => {
                let trimmed = line.trim();

                if !in_multiline && trimmed.starts_with('.') {
                    if handle_repl_command(trimmed, runtime) == Command::Exit {
                        break;
                    }
                    continue;
                }
                if !in_multiline && trimmed.is_empty() {
                    continue;
                }

                if in_multiline {
                    line_buffer.push('\n');
                }
                line_buffer.push_str(&line);

                if !is_input_complete(&line_buffer) {
                    continue;
                }

                let _ = editor.add_history_entry(&line_buffer);
                match runtime.execute_string(&line_buffer) {
                    Ok(Some(result)) => println!("{}", result),
                    Ok(None) => {}
                    Err(CliError::JsError(e)) => eprintln!("Error: {}", e.message),
                    Err(e) => eprintln!("Error: {}", e),
                }
                line_buffer.clear();
            }
            Err(ReadlineError::Interrupted) => {
                // Ctrl-C
                if in_multiline {
                    line_buffer.clear();
                } else {
                    println!("(To exit, press Ctrl-D or type .exit)");
                }
            }
            Err(ReadlineError::Eof) => {
                // Ctrl-D
                break;
            }
            Err(err) => {
                return Err(CliError::ReplError(format!("Readline error: {}", err)));
            }
        }
    }

    Ok(())
}

/// Handle special REPL commands
fn handle_repl_command(command: &str, runtime: &Runtime) -> Command {
    match command {
        ".help" => {
            println!("REPL Commands:");
            println!("  .help     - Show this help message");
            println!("  .clear    - Clear the screen");
            println!("  .exit     - Exit the REPL");
            Command::Continue
        }
        ".clear" => {
            let _ = runtime.execute_string("console.clear()");
            Command::Continue
        }
        ".exit" => Command::Exit,
        _ => {
            println!("Unknown command: {}", command);
            println!("Type .help for available commands");
            Command::Continue
        }
    }
}

/// Check if the input appears to be complete
///
/// This is a simple heuristic that checks for balanced braces/brackets/parens
/// and closed string literals
fn is_input_complete(input: &str) -> bool {
    let mut brace_count = 0;
    let mut bracket_count = 0;
    let mut paren_count = 0;
    let mut in_string = false;
    let mut string_char = ' ';
    let mut escape_next = false;

    for c in input.chars() {
        if escape_next {
            escape_next = false;
            continue;
        }

        if c == '\\' && in_string {
            escape_next = true;
            continue;
        }

        if !in_string {
            match c {
                '"' | '\'' | '`' => {
                    in_string = true;
                    string_char = c;
                }
                '{' => brace_count += 1,
                '}' => brace_count -= 1,
                '[' => bracket_count += 1,
                ']' => bracket_count -= 1,
                '(' => paren_count += 1,
                ')' => paren_count -= 1,
                _ => {}
            }
        } else if c == string_char {
            in_string = false;
        }
    }

    // Extra closers are complete input: the engine reports the syntax error.
    brace_count <= 0 && bracket_count <= 0 && paren_count <= 0 && !in_string
}
