//! Command handler for REPL built-in commands
//!
//! Commands start with `/` and adjust the per-query overrides used for
//! every following question.

use colored::*;

use crate::cli::QueryOverrides;

/// REPL command types
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Help,
    /// Restrict to a guest, or clear the filter with no argument
    Guest { name: Option<String> },
    Alpha { value: Option<f32> },
    TopK { value: Option<usize> },
    Limit { value: Option<usize> },
    Temperature { value: Option<f32> },
    Settings,
    Sources { enable: bool },
    Reset,
    Clear,
    Exit,
    Unknown { input: String },
}

/// Check if input is a command
pub fn is_command(input: &str) -> bool {
    input.trim_start().starts_with('/')
}

/// Command handler for parsing and executing REPL commands
pub struct CommandHandler {
    show_sources: bool,
}

impl CommandHandler {
    /// Create new command handler
    pub fn new() -> Self {
        CommandHandler { show_sources: false }
    }

    /// Parse input string into a command
    pub fn parse(&self, input: &str) -> Command {
        let trimmed = input.trim();

        let Some(body) = trimmed.strip_prefix('/') else {
            return Command::Unknown { input: input.to_string() };
        };

        let (name, rest) = match body.split_once(char::is_whitespace) {
            Some((name, rest)) => (name, rest.trim()),
            None => (body, ""),
        };
        let arg = (!rest.is_empty()).then_some(rest);

        match name.to_lowercase().as_str() {
            "help" | "h" => Command::Help,
            "exit" | "quit" | "q" => Command::Exit,
            "guest" => Command::Guest {
                name: arg.map(str::to_string),
            },
            "alpha" => Command::Alpha {
                value: arg.and_then(|s| s.parse().ok()),
            },
            "topk" | "top_k" | "top-k" => Command::TopK {
                value: arg.and_then(|s| s.parse().ok()),
            },
            "limit" => Command::Limit {
                value: arg.and_then(|s| s.parse().ok()),
            },
            "temp" | "temperature" => Command::Temperature {
                value: arg.and_then(|s| s.parse().ok()),
            },
            "settings" | "status" => Command::Settings,
            "sources" => {
                let enable = arg
                    .map(|s| matches!(s.to_lowercase().as_str(), "on" | "1" | "true"))
                    .unwrap_or(true);
                Command::Sources { enable }
            }
            "reset" => Command::Reset,
            "clear" | "cls" => Command::Clear,
            _ => Command::Unknown { input: input.to_string() },
        }
    }

    /// Execute a command against the session overrides
    ///
    /// Returns true if REPL should continue, false if should exit
    pub fn execute(&mut self, command: Command, overrides: &mut QueryOverrides) -> bool {
        match command {
            Command::Help => {
                self.show_help();
            }
            Command::Exit => {
                println!("{}", "Goodbye!".green());
                return false;
            }
            Command::Guest { name } => {
                match &name {
                    Some(guest) => println!("{}", format!("Searching only episodes with {}", guest).cyan()),
                    None => println!("{}", "Guest filter cleared".cyan()),
                }
                overrides.guest = name;
            }
            Command::Alpha { value } => match value {
                Some(alpha) if (0.0..=1.0).contains(&alpha) => {
                    overrides.alpha = Some(alpha);
                    println!("{}", format!("alpha = {}", alpha).cyan());
                }
                _ => println!("{}", "Usage: /alpha <0.0..1.0>".red()),
            },
            Command::TopK { value } => match value {
                Some(top_k) if top_k > 0 => {
                    overrides.top_k = Some(top_k);
                    println!("{}", format!("top_k = {}", top_k).cyan());
                }
                _ => println!("{}", "Usage: /topk <n ≥ 1>".red()),
            },
            Command::Limit { value } => match value {
                Some(limit) if limit > 0 => {
                    overrides.limit = Some(limit);
                    println!("{}", format!("limit = {}", limit).cyan());
                }
                _ => println!("{}", "Usage: /limit <n ≥ 1>".red()),
            },
            Command::Temperature { value } => match value {
                Some(temperature) if (0.0..=2.0).contains(&temperature) => {
                    overrides.temperature = Some(temperature);
                    println!("{}", format!("temperature = {}", temperature).cyan());
                }
                _ => println!("{}", "Usage: /temp <0.0..2.0>".red()),
            },
            Command::Settings => {
                self.show_settings(overrides);
            }
            Command::Sources { enable } => {
                self.show_sources = enable;
                let status = if enable { "shown" } else { "hidden" };
                println!("{}", format!("Source passages {}", status).cyan());
            }
            Command::Reset => {
                *overrides = QueryOverrides::default();
                println!("{}", "Overrides cleared. Using configured defaults.".yellow());
            }
            Command::Clear => {
                print!("\x1B[2J\x1B[1;1H");
            }
            Command::Unknown { input } => {
                println!("{}", format!("Unknown command: {}", input).red());
                println!("Type {} for available commands", "/help".cyan());
            }
        }
        true
    }

    /// Whether citation passages are printed in full
    pub fn show_sources(&self) -> bool {
        self.show_sources
    }

    fn show_help(&self) {
        println!("\n{}", "Available Commands:".bold().cyan());
        println!("  {}  Search only episodes with a guest (no name clears)", "/guest [name]".green());
        println!("  {}  Hybrid weighting, 0 keyword .. 1 vector", "/alpha <x>   ".green());
        println!("  {}  Hits kept after reranking", "/topk <n>    ".green());
        println!("  {}  Hits retrieved before reranking", "/limit <n>   ".green());
        println!("  {}  Sampling temperature", "/temp <x>    ".green());
        println!("  {}  Show current overrides", "/settings    ".green());
        println!("  {}  Print source passages under citations", "/sources [on|off]".green());
        println!("  {}  Clear all overrides", "/reset       ".green());
        println!("  {}  Clear the screen", "/clear       ".green());
        println!("  {}  Leave the REPL", "/exit        ".green());
        println!();
    }

    fn show_settings(&self, overrides: &QueryOverrides) {
        let show = |value: Option<String>| value.unwrap_or_else(|| "default".to_string());

        println!("\n{}", "Current Settings:".bold().cyan());
        println!("  guest:       {}", show(overrides.guest.clone()));
        println!("  alpha:       {}", show(overrides.alpha.map(|v| v.to_string())));
        println!("  top_k:       {}", show(overrides.top_k.map(|v| v.to_string())));
        println!("  limit:       {}", show(overrides.limit.map(|v| v.to_string())));
        println!("  temperature: {}", show(overrides.temperature.map(|v| v.to_string())));
        println!("  sources:     {}", if self.show_sources { "shown" } else { "hidden" });
        println!();
    }
}

impl Default for CommandHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_command() {
        assert!(is_command("/help"));
        assert!(is_command("  /exit"));
        assert!(!is_command("what is discipline?"));
    }

    #[test]
    fn test_parse_basic_commands() {
        let handler = CommandHandler::new();
        assert_eq!(handler.parse("/help"), Command::Help);
        assert_eq!(handler.parse("/q"), Command::Exit);
        assert_eq!(handler.parse("/settings"), Command::Settings);
        assert_eq!(handler.parse("/cls"), Command::Clear);
    }

    #[test]
    fn test_parse_guest_keeps_spaces() {
        let handler = CommandHandler::new();
        assert_eq!(
            handler.parse("/guest  Jane  Doe "),
            Command::Guest {
                name: Some("Jane  Doe".to_string())
            }
        );
        assert_eq!(handler.parse("/guest"), Command::Guest { name: None });
    }

    #[test]
    fn test_parse_numeric_arguments() {
        let handler = CommandHandler::new();
        assert_eq!(handler.parse("/alpha 0.7"), Command::Alpha { value: Some(0.7) });
        assert_eq!(handler.parse("/topk 5"), Command::TopK { value: Some(5) });
        assert_eq!(handler.parse("/topk five"), Command::TopK { value: None });
        assert_eq!(handler.parse("/sources off"), Command::Sources { enable: false });
    }

    #[test]
    fn test_parse_unknown() {
        let handler = CommandHandler::new();
        assert!(matches!(handler.parse("/frobnicate"), Command::Unknown { .. }));
        assert!(matches!(handler.parse("plain text"), Command::Unknown { .. }));
    }

    #[test]
    fn test_execute_updates_overrides() {
        let mut handler = CommandHandler::new();
        let mut overrides = QueryOverrides::default();

        assert!(handler.execute(Command::Guest { name: Some("Jane".to_string()) }, &mut overrides));
        assert!(handler.execute(Command::Alpha { value: Some(0.25) }, &mut overrides));
        assert!(handler.execute(Command::TopK { value: Some(4) }, &mut overrides));

        assert_eq!(overrides.guest.as_deref(), Some("Jane"));
        assert_eq!(overrides.alpha, Some(0.25));
        assert_eq!(overrides.top_k, Some(4));
    }

    #[test]
    fn test_execute_rejects_out_of_range() {
        let mut handler = CommandHandler::new();
        let mut overrides = QueryOverrides::default();

        handler.execute(Command::Alpha { value: Some(1.5) }, &mut overrides);
        handler.execute(Command::TopK { value: Some(0) }, &mut overrides);
        assert_eq!(overrides, QueryOverrides::default());
    }

    #[test]
    fn test_reset_and_exit() {
        let mut handler = CommandHandler::new();
        let mut overrides = QueryOverrides {
            limit: Some(20),
            ..Default::default()
        };

        assert!(handler.execute(Command::Reset, &mut overrides));
        assert_eq!(overrides, QueryOverrides::default());
        assert!(!handler.execute(Command::Exit, &mut overrides));
    }

    #[test]
    fn test_sources_toggle() {
        let mut handler = CommandHandler::new();
        let mut overrides = QueryOverrides::default();
        handler.execute(Command::Sources { enable: true }, &mut overrides);
        assert!(handler.show_sources());
    }
}
