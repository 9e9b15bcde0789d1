//! Query command - retrieve candidates and rank them.

use super::entity_line;
use crate::app::App;
use crate::OutputFormat;
use hoard_core::Config;
use std::time::Instant;

/// Run the query command.
pub fn run(
    config: Config,
    query: &str,
    limit: Option<usize>,
    candidates: Option<usize>,
    output: OutputFormat,
) -> anyhow::Result<()> {
    let app = App::new(config)?;
    let top_n = limit.unwrap_or(app.config.ranking.top_n);
    let candidate_limit = candidates.unwrap_or(app.config.search.candidate_limit);

    let start = Instant::now();
    let found = app.searcher().search(query, candidate_limit)?;
    let candidate_count = found.len();
    let ranker = app.ranker();
    let results = ranker.rank(query, found, top_n);
    let elapsed = start.elapsed();

    match output {
        OutputFormat::Text => {
            if results.is_empty() {
                println!("No matching entities.");
            }
            for result in &results {
                println!("{:>6.1}  {}", result.score, entity_line(&result.entity));
            }

            eprintln!();
            eprintln!(
                "{} of {} candidates ranked by {} in {:.3}ms",
                results.len(),
                candidate_count,
                ranker.scorer_name(),
                elapsed.as_secs_f64() * 1000.0
            );
        }
        OutputFormat::Json => {
            let json_results: Vec<serde_json::Value> = results
                .iter()
                .map(|r| {
                    serde_json::json!({
                        "score": r.score,
                        "entity": r.entity,
                    })
                })
                .collect();

            println!("{}", serde_json::to_string_pretty(&json_results)?);
        }
    }

    app.close()
}
