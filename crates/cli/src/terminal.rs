use anyhow::Result;
use conduit_tool_runtime::{ToolCall, TurnEvent, TurnObserver};
use crossterm::{
    execute,
    style::{Color, Print, ResetColor, SetForegroundColor},
};
use std::io::{self, BufRead, Write};
use tracing::debug;

/// Color scheme for terminal output.
struct Colors;

impl Colors {
    const USER_PROMPT: Color = Color::Green;
    const ASSISTANT_TEXT: Color = Color::Cyan;
    const TOOL_CALL: Color = Color::Yellow;
    const TOOL_RESULT: Color = Color::DarkGreen;
    const ERROR: Color = Color::Red;
    const DIM: Color = Color::DarkGrey;
    const HEADER: Color = Color::Magenta;
}

/// Longest tool result echoed to the terminal.
const MAX_RESULT_DISPLAY: usize = 500;

/// Manages terminal I/O for the interactive REPL.
#[derive(Debug, Default)]
pub struct Terminal;

impl Terminal {
    pub fn new() -> Self {
        Self
    }

    /// Print the startup banner.
    pub fn print_banner(&self, model: &str, tool_names: &[&str]) -> Result<()> {
        let mut stdout = io::stdout();
        execute!(
            stdout,
            SetForegroundColor(Colors::HEADER),
            Print("conduit"),
            ResetColor,
            Print(" - Model + Tool Providers\n"),
            SetForegroundColor(Colors::DIM),
            Print(format!("Model: {} | Tools: {}\n", model, tool_names.len())),
            Print(format!("  {}\n", tool_names.join(", "))),
            Print("Type 'exit' or 'quit' to end.\n"),
            Print("---\n"),
            ResetColor,
        )?;
        stdout.flush()?;
        Ok(())
    }

    /// Read a line of user input with prompt.
    /// Returns None on exit commands and end of input.
    pub fn read_input(&self) -> Result<Option<String>> {
        let mut stdout = io::stdout();
        execute!(
            stdout,
            Print("\n"),
            SetForegroundColor(Colors::USER_PROMPT),
            Print("you> "),
            ResetColor,
        )?;
        stdout.flush()?;

        let mut input = String::new();
        if io::stdin().lock().read_line(&mut input)? == 0 {
            return Ok(None);
        }
        Ok(parse_input(&input))
    }

    /// Show a tool call and ask whether it may run. Anything but y/yes is no.
    pub fn prompt_permission(&self, call: &ToolCall) -> Result<bool> {
        let mut stdout = io::stdout();
        execute!(
            stdout,
            Print("\n"),
            SetForegroundColor(Colors::TOOL_CALL),
            Print(format!("Tool '{}' wants to run with:\n", call.name)),
            ResetColor,
        )?;
        if call.arguments.is_empty() {
            execute!(stdout, SetForegroundColor(Colors::DIM), Print("  (no arguments)\n"), ResetColor)?;
        }
        for (key, value) in &call.arguments {
            execute!(stdout, Print(format!("  {}: {}\n", key, value)))?;
        }
        execute!(
            stdout,
            SetForegroundColor(Colors::USER_PROMPT),
            Print("Allow this tool call? [y/N] "),
            ResetColor,
        )?;
        stdout.flush()?;

        let mut input = String::new();
        io::stdin().lock().read_line(&mut input)?;
        Ok(is_yes(&input))
    }

    /// Display a turn event with appropriate formatting.
    pub fn display_event(&self, event: &TurnEvent) -> Result<()> {
        let mut stdout = io::stdout();
        match event {
            TurnEvent::AssistantText(text) => {
                execute!(
                    stdout,
                    Print("\n"),
                    SetForegroundColor(Colors::ASSISTANT_TEXT),
                    Print("Assistant: "),
                    ResetColor,
                    Print(format!("{}\n", text)),
                )?;
            }
            TurnEvent::ToolRequested { id, name, arguments } => {
                debug!(id = %id, "Tool requested");
                execute!(
                    stdout,
                    SetForegroundColor(Colors::TOOL_CALL),
                    Print(format!("[tool: {}] ", name)),
                    ResetColor,
                    SetForegroundColor(Colors::DIM),
                    Print(format!("{}\n", serde_json::Value::Object(arguments.clone()))),
                    ResetColor,
                )?;
            }
            TurnEvent::ToolRejected { name, .. } => {
                execute!(
                    stdout,
                    SetForegroundColor(Colors::DIM),
                    Print(format!("  [{} rejected]\n", name)),
                    ResetColor,
                )?;
            }
            TurnEvent::ToolResult {
                name,
                content,
                is_error,
                ..
            } => {
                self.display_tool_result(name, content, *is_error)?;
            }
            TurnEvent::ImageSaved { path, mime_type } => {
                execute!(
                    stdout,
                    SetForegroundColor(Colors::TOOL_RESULT),
                    Print(format!("  [{} saved to {}]\n", mime_type, path.display())),
                    ResetColor,
                )?;
            }
            TurnEvent::FollowUpLimitReached { limit } => {
                execute!(
                    stdout,
                    SetForegroundColor(Colors::ERROR),
                    Print(format!(
                        "[stopped after {} follow-up requests; ask again to continue]\n",
                        limit
                    )),
                    ResetColor,
                )?;
            }
        }
        stdout.flush()?;
        Ok(())
    }

    /// Display a tool execution result.
    pub fn display_tool_result(&self, tool_name: &str, content: &str, is_error: bool) -> Result<()> {
        let mut stdout = io::stdout();
        let color = if is_error {
            Colors::ERROR
        } else {
            Colors::TOOL_RESULT
        };
        let label = if is_error { "error" } else { "result" };

        execute!(
            stdout,
            SetForegroundColor(color),
            Print(format!("  [{} {}]: {}\n", tool_name, label, truncate_for_display(content))),
            ResetColor,
        )?;
        stdout.flush()?;
        Ok(())
    }

    /// Print an error message.
    pub fn print_error(&self, msg: &str) -> Result<()> {
        let mut stdout = io::stdout();
        execute!(
            stdout,
            SetForegroundColor(Colors::ERROR),
            Print(format!("Error: {}\n", msg)),
            ResetColor,
        )?;
        stdout.flush()?;
        Ok(())
    }

    /// Print a warning.
    pub fn print_warning(&self, msg: &str) -> Result<()> {
        let mut stdout = io::stdout();
        execute!(
            stdout,
            SetForegroundColor(Colors::TOOL_CALL),
            Print(format!("Warning: {}\n", msg)),
            ResetColor,
        )?;
        stdout.flush()?;
        Ok(())
    }

    /// Print an info message.
    pub fn print_info(&self, msg: &str) -> Result<()> {
        let mut stdout = io::stdout();
        execute!(
            stdout,
            SetForegroundColor(Colors::DIM),
            Print(format!("{}\n", msg)),
            ResetColor,
        )?;
        stdout.flush()?;
        Ok(())
    }
}

impl TurnObserver for Terminal {
    fn on_event(&self, event: &TurnEvent) {
        if let Err(e) = self.display_event(event) {
            debug!(error = %e, "Failed to display turn event");
        }
    }
}

/// Trim a line of input; `None` for exit commands.
fn parse_input(line: &str) -> Option<String> {
    let trimmed = line.trim();
    match trimmed {
        "exit" | "quit" | "/exit" | "/quit" => None,
        _ => Some(trimmed.to_string()),
    }
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}

fn truncate_for_display(content: &str) -> String {
    match content.char_indices().nth(MAX_RESULT_DISPLAY) {
        Some((idx, _)) => format!("{}... ({} chars total)", &content[..idx], content.chars().count()),
        None => content.to_string(),
    }
}
