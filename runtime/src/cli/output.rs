//! Process-wide output mode for command results.

use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, Default)]
struct OutputMode {
    json: bool,
    quiet: bool,
}

static MODE: OnceLock<OutputMode> = OnceLock::new();

/// Set the output mode. Later calls are ignored.
pub fn init(json: bool, quiet: bool) {
    let _ = MODE.set(OutputMode { json, quiet });
}

fn mode() -> OutputMode {
    MODE.get().copied().unwrap_or_default()
}

/// Results are printed as JSON.
pub fn is_json() -> bool {
    mode().json
}

/// Only results and errors are printed.
pub fn is_quiet() -> bool {
    mode().quiet
}

/// Pretty-print `value` to stdout.
pub fn print_json(value: &serde_json::Value) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{text}"),
        Err(_) => println!("{value}"),
    }
}
