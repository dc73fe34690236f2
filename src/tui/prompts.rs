//! Status lines and prompts shared by every command

use colored::Colorize;

/// Display a section header
pub fn section_header(title: &str) {
    println!();
    println!("{}", "─".repeat(60).dimmed());
    println!("{}", title.cyan().bold());
    println!("{}", "─".repeat(60).dimmed());
}

pub fn success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

pub fn info(message: &str) {
    println!("{} {}", "→".cyan(), message);
}

pub fn warning(message: &str) {
    println!("{} {}", "!".yellow().bold(), message);
}

pub fn error(message: &str) {
    println!("{} {}", "✗".red().bold(), message);
}

/// `label: value` line under a section header
pub fn field(label: &str, value: impl std::fmt::Display) {
    println!("  {:<22} {}", format!("{}:", label).dimmed(), value);
}
