//! UI utilities for pretty printing

use colored::Colorize;
use toldyou_core::{Certificate, PassSummary, Record, Verified};

pub fn print_banner() {
    println!("{}", "=".repeat(60).bright_blue());
    println!("{}", format!("  {}", toldyou_core::version_string()).bright_cyan().bold());
    println!("{}", "  Say it now, prove it later".bright_white());
    println!("{}", "=".repeat(60).bright_blue());
    println!();
}

pub fn print_record(record: &Record, certificate: &Certificate) {
    println!("{} {}", record.created_display().bright_white(), record.id.to_string().dimmed());
    if let Some(username) = &record.username {
        println!("  {} {}", "By:".bright_green(), username);
    }
    println!("  {}", record.text);
    match certificate {
        Certificate::Verified(_) => println!("  {}", certificate.to_string().bright_green()),
        Certificate::Pending => println!("  {}", certificate.to_string().yellow()),
    }
    println!();
}

pub fn print_summary(summary: &PassSummary) {
    println!("{} {}", "Scanned:".bright_green(), summary.scanned);
    println!("{} {}", "Upgraded:".bright_green(), summary.upgraded);
    println!("{} {}", "Still pending:".bright_green(), summary.pending);
    if summary.failed > 0 {
        println!("{} {}", "Failed:".bright_red(), summary.failed);
    }
    if summary.cancelled {
        print_warning("Pass was interrupted");
    }
}

pub fn print_verified(verified: &Verified) {
    print_success(&format!("Verified for user {}: {}", verified.user_id, verified.text));
    println!("  {}", verified.link.bright_cyan());
}

pub fn print_error(msg: &str) {
    println!("{} {}", "✗".bright_red(), msg.red());
}

pub fn print_success(msg: &str) {
    println!("{} {}", "✓".bright_green(), msg.bright_green());
}

pub fn print_info(msg: &str) {
    println!("{} {}", "ℹ".bright_blue(), msg);
}

pub fn print_warning(msg: &str) {
    println!("{} {}", "⚠".bright_yellow(), msg.yellow());
}
