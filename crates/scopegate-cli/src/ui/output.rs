//! Formatted output utilities.
//!
//! Status messages go to stderr; stdout carries only command data.

use console::{Style, style};

/// Print a success message with checkmark.
pub fn success(msg: &str) {
    eprintln!("{} {}", style("✓").green().bold(), msg);
}

/// Print an error message with X.
pub fn error(msg: &str) {
    eprintln!("{} {}", style("✗").red().bold(), msg);
}

/// Print a warning message.
pub fn warning(msg: &str) {
    eprintln!("{} {}", style("⚠").yellow().bold(), msg);
}

/// Print an info message.
pub fn info(msg: &str) {
    eprintln!("{} {}", style("ℹ").blue().bold(), msg);
}

/// Print a header/section title.
pub fn header(msg: &str) {
    eprintln!("\n{}", style(msg).bold().underlined());
}

/// Print a key-value pair.
pub fn kv(key: &str, value: &str) {
    eprintln!("  {}: {}", style(key).bold(), value);
}

/// Print a table row.
pub fn table_row(cols: &[(&str, usize)]) {
    for (text, width) in cols {
        print!("{text:width$}");
    }
    println!();
}

/// Result of one validation check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckStatus {
    Ok,
    Error,
}

/// Print one validation check.
pub fn check(name: &str, status: CheckStatus, detail: Option<&str>) {
    let (icon, status_style, text) = match status {
        CheckStatus::Ok => (style("✓").green(), Style::new().green(), "OK"),
        CheckStatus::Error => (style("✗").red(), Style::new().red(), "ERROR"),
    };

    eprint!("  {icon} {name}: {}", status_style.apply_to(text));
    if let Some(d) = detail {
        eprint!(" - {}", style(d).dim());
    }
    eprintln!();
}
