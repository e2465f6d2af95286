use std::path::Path;

use owo_colors::OwoColorize;

pub fn print_banner(store_dir: &Path, url: &str) {
    println!();
    println!("  {}", "wahoo".bold().green());
    println!("  {}", "WhatsApp web interface".dimmed());
    println!();
    println!("  {} {}", "Store:".bold(), store_dir.display());
    println!("  {} {}", "Server:".bold(), url.cyan());
    println!();
}
