//! Common utility functions for the simulation tool.
//!
//! This module contains:
//! - Logger initialization
//! - Output path validation
//! - User input prompts for interactive parameter entry

use std::error::Error;
use std::fmt::Display;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Initialize the logger with the specified configuration.
///
/// # Arguments
/// * `log_level` - Log level string (off, error, warn, info, debug, trace)
/// * `log_file` - Optional path to log file (logs to stderr if None)
///
/// # Errors
/// Returns an error if the log file cannot be opened or logger initialization fails.
pub fn init_logger(log_level: &str, log_file: Option<&PathBuf>) -> Result<(), Box<dyn Error>> {
    let level = log_level.parse::<log::LevelFilter>().unwrap_or_else(|_| {
        eprintln!("Invalid log level '{}', defaulting to 'info'", log_level);
        log::LevelFilter::Info
    });

    let mut builder = env_logger::Builder::new();
    builder.filter_level(level);
    builder.format(|buf, record| {
        writeln!(
            buf,
            "{} [{}] {} - {}",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
            record.level(),
            record.target(),
            record.args()
        )
    });

    if let Some(log_path) = log_file {
        if let Some(parent) = log_path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let target = Box::new(
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(log_path)?,
        );
        builder.target(env_logger::Target::Pipe(target));
    }

    builder.try_init()?;
    Ok(())
}

/// Make sure the output directory exists, creating it (and its parents) if needed.
///
/// # Errors
/// Returns an error if the path exists but is not a directory, or if directory creation fails.
pub fn validate_output_path(output: &Path) -> Result<(), Box<dyn Error>> {
    if output.exists() && !output.is_dir() {
        return Err(format!("Output path '{}' is not a directory.", output.display()).into());
    }
    if !output.exists() {
        std::fs::create_dir_all(output)?;
    }
    Ok(())
}

// ============================================================================
// User Input Utilities
// ============================================================================

/// What the user typed at a prompt.
#[derive(Debug, PartialEq)]
pub enum UserInput {
    /// Empty line: keep the default.
    Default,
    Quit,
    Value(String),
}

/// Classify a raw input line.
pub fn classify_input(line: &str) -> UserInput {
    let input = line.trim();
    if input.eq_ignore_ascii_case("q") {
        UserInput::Quit
    } else if input.is_empty() {
        UserInput::Default
    } else {
        UserInput::Value(input.to_string())
    }
}

/// Read a line from stdin.
///
/// # Returns
/// - `None` if the user presses Enter without typing anything
/// - `Some(String)` with the trimmed input otherwise
///
/// Exits the process if the user enters 'q' or 'Q'.
pub fn read_user_input() -> io::Result<Option<String>> {
    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    match classify_input(&input) {
        UserInput::Quit => std::process::exit(0),
        UserInput::Default => Ok(None),
        UserInput::Value(value) => Ok(Some(value)),
    }
}

/// Parse `input` and check it lies within `[min_val, max_val]`.
pub fn parse_in_range<T>(input: &str, min_val: T, max_val: T) -> Result<T, String>
where
    T: FromStr + PartialOrd + Display,
{
    match input.parse::<T>() {
        Ok(val) if val >= min_val && val <= max_val => Ok(val),
        Ok(_) => Err(format!(
            "Error: Value must be between {} and {}.",
            min_val, max_val
        )),
        Err(_) => Err("Error: Please enter a valid number.".to_string()),
    }
}

/// Prompt for a value with a default and range validation.
///
/// Keeps asking until the user presses Enter (default) or types a valid value.
pub fn prompt_with_default<T>(prompt_text: &str, default: T, min_val: T, max_val: T) -> io::Result<T>
where
    T: FromStr + PartialOrd + Display + Copy,
{
    loop {
        println!(
            "{} (press Enter for {}, or 'q' to quit):",
            prompt_text, default
        );
        match read_user_input()? {
            None => return Ok(default),
            Some(input) => match parse_in_range(&input, min_val, max_val) {
                Ok(val) => return Ok(val),
                Err(message) => println!("{message}\n"),
            },
        }
    }
}

/// Prompt for the output directory, falling back to `default`.
pub fn prompt_output_path(default: &Path) -> io::Result<PathBuf> {
    println!(
        "Output directory (press Enter for {}, or 'q' to quit):",
        default.display()
    );
    Ok(read_user_input()?
        .map(PathBuf::from)
        .unwrap_or_else(|| default.to_path_buf()))
}
