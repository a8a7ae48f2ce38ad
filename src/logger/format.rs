//! Log formatting and output with ANSI colors
//!
//! Handles colorized console output with tag and level formatting and
//! broken-pipe-safe printing for piped commands.

use super::levels::LogLevel;
use super::tags::LogTag;
use chrono::Local;
use colored::*;
use std::io::{stdout, ErrorKind, Write};

/// Format widths for alignment
const TAG_WIDTH: usize = 10;

/// Format and output a log message
pub fn format_and_log(tag: LogTag, level: LogLevel, message: &str) {
    let time = Local::now().format("%H:%M:%S").to_string();
    let prefix = format!("{} ", time).dimmed().to_string();

    let tag_str = format_tag(&tag);
    let level_str = format_level(level);

    let line = format!("{}[{}] [{}] {}", prefix, tag_str, level_str, message);
    print_stdout_safe(&line);
}

fn format_tag(tag: &LogTag) -> String {
    let padded = format!("{:<width$}", tag.as_str(), width = TAG_WIDTH);
    match tag {
        LogTag::Cache => padded.cyan().to_string(),
        LogTag::Fetch => padded.blue().to_string(),
        LogTag::Market => padded.magenta().to_string(),
        LogTag::Source => padded.purple().to_string(),
        LogTag::Aggregator => padded.green().to_string(),
        LogTag::Rpc => padded.yellow().to_string(),
        LogTag::Registry => padded.white().to_string(),
        LogTag::Config => padded.white().to_string(),
    }
}

fn format_level(level: LogLevel) -> String {
    match level {
        LogLevel::Error => level.as_str().red().bold().to_string(),
        LogLevel::Warning => level.as_str().yellow().to_string(),
        LogLevel::Info => level.as_str().normal().to_string(),
        LogLevel::Debug => level.as_str().dimmed().to_string(),
        LogLevel::Verbose => level.as_str().dimmed().to_string(),
    }
}

/// Print to stdout, swallowing broken pipe errors so piping into
/// `head` or a closed pager does not panic the process.
fn print_stdout_safe(line: &str) {
    let mut out = stdout();
    if let Err(e) = writeln!(out, "{}", line) {
        if e.kind() != ErrorKind::BrokenPipe {
            eprintln!("{}", line);
        }
    }
    let _ = out.flush();
}
