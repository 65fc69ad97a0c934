//! Terminal output formatting

use colored::*;
use serde_json::Value as JsonValue;

pub fn print_success(message: &str) {
    println!("{} {}", "✓".bright_green().bold(), message);
}

/// Errors and notices go to stderr so stdout stays script output only
pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".bright_red().bold(), message.bright_red());
}

pub fn print_warning(message: &str) {
    eprintln!("{} {}", "⚠".bright_yellow().bold(), message.bright_yellow());
}

pub fn print_info(message: &str) {
    eprintln!("{} {}", "ℹ".bright_blue().bold(), message);
}

pub fn print_json(data: &JsonValue) {
    match serde_json::to_string_pretty(data) {
        Ok(formatted) => println!("{}", formatted),
        Err(_) => println!("{}", data),
    }
}

/// Print rows under `headers`, each column as wide as its widest cell
pub fn print_table(headers: &[&str], rows: &[Vec<String>]) {
    if rows.is_empty() {
        print_info("Nothing to display");
        return;
    }

    let widths: Vec<usize> = headers
        .iter()
        .enumerate()
        .map(|(column, header)| {
            rows.iter()
                .filter_map(|row| row.get(column))
                .map(|cell| cell.chars().count())
                .chain(std::iter::once(header.len()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let line = |cells: Vec<String>| {
        cells
            .iter()
            .zip(&widths)
            .map(|(cell, width)| format!("{:<width$}", cell, width = *width))
            .collect::<Vec<_>>()
            .join("  ")
            .trim_end()
            .to_string()
    };

    println!("{}", line(headers.iter().map(|h| h.to_string()).collect()).bold());
    for row in rows {
        println!("{}", line(row.clone()));
    }
}
