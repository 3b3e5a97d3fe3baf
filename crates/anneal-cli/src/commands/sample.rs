//! Sample command implementation.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::{Value, json};

use anneal_client::{Client, ClientResult, Problem, SampleResult};

use super::common::{Connection, connect, load_problem};

/// Execute the sample command.
pub async fn execute(
    connection: &Connection,
    input: &Path,
    solver: Option<&str>,
    count: usize,
    timeout: Option<u64>,
    format: &str,
) -> Result<()> {
    if count == 0 {
        anyhow::bail!("--count must be at least 1");
    }

    let mut problem = load_problem(input)?;
    if let Some(solver) = solver {
        problem.solver = solver.to_string();
    }

    println!(
        "{} Sampling {} on {} ({} {})",
        style("→").cyan().bold(),
        style(input.display()).green(),
        style(&problem.solver).yellow(),
        count,
        if count == 1 { "copy" } else { "copies" }
    );

    let client = connect(connection)?;
    let outcome = run(&client, problem, count, timeout.map(Duration::from_secs)).await;
    client.close().await;
    let results = outcome?;

    if format.eq_ignore_ascii_case("json") {
        print_json(&results)?;
    } else {
        print_table(&results);
    }

    let failed = results.iter().filter(|r| r.is_err()).count();
    if failed > 0 {
        anyhow::bail!("{failed} of {count} problems failed");
    }
    Ok(())
}

async fn run(
    client: &Client,
    problem: Problem,
    count: usize,
    timeout: Option<Duration>,
) -> Result<Vec<ClientResult<Arc<SampleResult>>>> {
    let mut futures = Vec::with_capacity(count);
    for _ in 0..count {
        futures.push(client.submit(problem.clone()).await?);
    }

    let progress = ProgressBar::new(count as u64);
    progress.set_style(
        ProgressStyle::default_bar().template("{spinner:.cyan} [{bar:30.cyan/blue}] {pos}/{len} {msg}")?,
    );
    progress.set_message("Waiting for answers...");
    progress.enable_steady_tick(Duration::from_millis(100));

    let mut results = Vec::with_capacity(count);
    for future in &futures {
        results.push(future.result(timeout).await);
        progress.inc(1);
    }
    progress.finish_and_clear();

    Ok(results)
}

fn print_table(results: &[ClientResult<Arc<SampleResult>>]) {
    for result in results {
        match result {
            Ok(sample) => {
                println!(
                    "\n{} Problem {}",
                    style("✓").green().bold(),
                    style(&sample.job_id).cyan()
                );
                print_answer(&sample.answer);
                if let (Some(submitted), Some(solved)) = (sample.submitted_on, sample.solved_on) {
                    let elapsed = solved - submitted;
                    println!(
                        "  Turnaround: {} ms",
                        style(elapsed.num_milliseconds()).yellow()
                    );
                }
            }
            Err(e) => {
                println!("\n{} {}", style("✗").red().bold(), e);
            }
        }
    }
}

/// Print energies and occurrence counts when the answer carries them as
/// plain JSON arrays, otherwise the raw answer.
fn print_answer(answer: &Value) {
    let energies = answer.get("energies").and_then(Value::as_array);
    let occurrences = answer.get("num_occurrences").and_then(Value::as_array);

    match energies {
        Some(energies) => {
            for (i, energy) in energies.iter().take(16).enumerate() {
                let count = occurrences
                    .and_then(|o| o.get(i))
                    .map_or_else(|| "-".to_string(), ToString::to_string);
                println!("  energy {:>12}  x{}", style(energy).cyan(), count);
            }
            if energies.len() > 16 {
                println!("  ... and {} more samples", energies.len() - 16);
            }
        }
        None => println!("  {answer}"),
    }
}

fn print_json(results: &[ClientResult<Arc<SampleResult>>]) -> Result<()> {
    let entries: Vec<Value> = results
        .iter()
        .map(|result| match result {
            Ok(sample) => serde_json::to_value(sample.as_ref()).unwrap_or(Value::Null),
            Err(e) => json!({"error": e.to_string()}),
        })
        .collect();
    println!("{}", serde_json::to_string_pretty(&entries)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use anneal_client::JobId;

    #[test]
    fn test_print_json_mixed_results() {
        let ok = Arc::new(SampleResult {
            job_id: JobId::new("1"),
            solver: None,
            answer: json!({"energies": [-1.0]}),
            submitted_on: None,
            solved_on: None,
        });
        let results = vec![Ok(ok), Err(anneal_client::ClientError::Cancelled)];
        assert!(print_json(&results).is_ok());
    }

    #[test]
    fn test_print_answer_shapes() {
        print_answer(&json!({"format": "qp", "energies": "AAAAAAAALsA="}));
        print_answer(&json!({"energies": [-3.0, -1.0], "num_occurrences": [90, 10]}));
    }
}
