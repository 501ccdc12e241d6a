//! Search command - hybrid top-k retrieval

use anyhow::Result;
use colored::*;

use second_brain::Session;

use super::{truncate, ScopeArgs, PREVIEW_WIDTH};

pub fn run(session: &Session, query: &str, k: usize, scope: &ScopeArgs, json: bool) -> Result<()> {
    let results = session.topk(query, k, &scope.scope()?)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
        return Ok(());
    }

    if let Some(reason) = &results.degraded {
        println!("{} Keyword results only ({})", "!".yellow(), reason);
        println!();
    }

    if results.hits.is_empty() {
        println!("{} No results found for: {}", "→".dimmed(), query.cyan());
        return Ok(());
    }

    println!("{} {} results for: {}", "→".dimmed(), results.hits.len(), query.cyan());
    println!();

    for (i, hit) in results.hits.iter().enumerate() {
        // Fused scores range over [0, 2]
        let score_str = format!("{:.2}", hit.score);
        let score_colored = if hit.score > 1.5 {
            score_str.green()
        } else if hit.score > 0.8 {
            score_str.yellow()
        } else {
            score_str.dimmed()
        };

        println!(
            "{}. [{}] {} {}",
            (i + 1).to_string().bold(),
            score_colored,
            format!("#{}", hit.id).cyan(),
            truncate(&hit.body, PREVIEW_WIDTH)
        );
    }

    Ok(())
}
