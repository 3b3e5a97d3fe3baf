//! Solvers command implementation.

use anyhow::Result;
use console::style;

use super::common::{Connection, connect};

/// Execute the solvers command.
pub async fn execute(connection: &Connection, refresh: bool, format: &str) -> Result<()> {
    let client = connect(connection)?;
    let solvers = client.get_solvers(refresh).await;
    client.close().await;
    let solvers = solvers?;

    if format.eq_ignore_ascii_case("json") {
        println!("{}", serde_json::to_string_pretty(&solvers)?);
        return Ok(());
    }

    println!("{} Available solvers:\n", style("Anneal").cyan().bold());

    if solvers.is_empty() {
        println!("  {}", style("(none)").dim());
        return Ok(());
    }

    for solver in &solvers {
        println!(
            "  {} {}",
            if solver.is_online() {
                style("●").green()
            } else {
                style("○").red()
            },
            style(&solver.id).bold()
        );
        if let Some(description) = &solver.description {
            println!("    {description}");
        }
        if let Some(qubits) = solver.properties.num_qubits {
            println!("    Qubits: {qubits}");
        }
        if !solver.properties.supported_problem_types.is_empty() {
            println!(
                "    Problem types: {}",
                solver.properties.supported_problem_types.join(", ")
            );
        }
        if let Some(load) = solver.avg_load {
            println!("    Load: {:.0}%", load * 100.0);
        }
        if !solver.is_online() {
            println!("    Status: {}", style(&solver.status).yellow());
        }
        println!();
    }

    Ok(())
}
