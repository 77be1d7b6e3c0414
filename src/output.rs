//! Colored terminal output and progress reporting.
//!
//! Coloring is controlled by the `color` configuration key; call
//! [`set_color`] once after loading the config.

use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

static COLOR: AtomicBool = AtomicBool::new(true);

/// Enable or disable ANSI coloring for all subsequent output.
pub fn set_color(enabled: bool) {
    COLOR.store(enabled, Ordering::Relaxed);
}

fn colored() -> bool {
    COLOR.load(Ordering::Relaxed)
}

/// Print an action header.
/// Example: "==> installing zlib"
pub fn action(message: &str) {
    if colored() {
        println!("{} {}", "==>".blue().bold(), message.bold());
    } else {
        println!("==> {message}");
    }
}

/// Print an action with a package counter.
/// Example: "(2/5) building zlib"
pub fn action_numbered(current: usize, total: usize, message: &str) {
    if colored() {
        println!(
            "{} {}",
            format!("({current}/{total})").cyan(),
            message.bold()
        );
    } else {
        println!("({current}/{total}) {message}");
    }
}

/// Print a detail line (dimmed).
/// Example: "     fetched zlib-1.3.tar.gz (cache hit)"
pub fn detail(message: &str) {
    if colored() {
        println!("     {}", message.dimmed());
    } else {
        println!("     {message}");
    }
}

/// Print a success message.
pub fn success(message: &str) {
    if colored() {
        println!("{} {}", "==>".green().bold(), message.green());
    } else {
        println!("==> {message}");
    }
}

/// Print an info message.
pub fn info(message: &str) {
    if colored() {
        println!("{} {}", "::".cyan(), message);
    } else {
        println!(":: {message}");
    }
}

/// Print a warning to stderr. Warnings never abort an operation.
pub fn warning(message: &str) {
    if colored() {
        eprintln!("{} {}", "warning:".yellow().bold(), message.yellow());
    } else {
        eprintln!("warning: {message}");
    }
}

/// Print an error to stderr.
pub fn error(message: &str) {
    if colored() {
        eprintln!("{} {}", "error:".red().bold(), message.red());
    } else {
        eprintln!("error: {message}");
    }
}

/// Print a skip notice (dimmed).
/// Example: "==> zlib already installed, skipping"
pub fn skip(message: &str) {
    if colored() {
        println!("{} {}", "==>".dimmed(), message.dimmed());
    } else {
        println!("==> {message}");
    }
}

/// Print one package line in list output.
/// Example: "zlib 1.3.1"
pub fn list_item(name: &str, version: &str) {
    if version.is_empty() {
        println!("{name}");
    } else if colored() {
        println!("{} {}", name.green(), version.dimmed());
    } else {
        println!("{name} {version}");
    }
}

/// Spinner shown while a child process runs. Hidden when color is off.
pub fn spinner(message: &str) -> ProgressBar {
    if !colored() {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("     {spinner:.cyan} {msg}")
            .unwrap()
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}
