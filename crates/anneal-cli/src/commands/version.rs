//! Version command implementation.

use console::style;

/// Execute the version command.
pub fn execute() {
    let version = env!("CARGO_PKG_VERSION");

    println!(
        "{} {} - client runtime for remote annealing services",
        style("Anneal").cyan().bold(),
        style(format!("v{version}")).yellow()
    );
    println!();
    println!("Components:");
    println!("  anneal-client        Submission, batching and polling runtime");
    println!("  anneal-adapter-sapi  SAPI REST transport");
    println!("  anneal-cli           Command-line interface");
    println!();
    println!("License:    {}", style("Apache-2.0").dim());
}
