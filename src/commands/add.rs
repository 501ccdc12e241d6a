//! Add command - store a note, chunking long input

use anyhow::{bail, Result};
use colored::Colorize;

use second_brain::Session;

pub fn run(session: &Session, body: &str, tags: &str, json: bool) -> Result<()> {
    let outcomes = session.add(body, tags)?;

    if json {
        let chunks: Vec<_> = outcomes
            .iter()
            .map(|o| match o {
                Ok(report) => serde_json::to_value(report).unwrap_or_default(),
                Err(e) => serde_json::json!({ "error": e.to_string(), "kind": e.kind() }),
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&chunks)?);
    } else {
        for outcome in &outcomes {
            match outcome {
                Ok(report) => {
                    let parent = report
                        .parent_id
                        .map(|p| format!(" (chunk of #{})", p))
                        .unwrap_or_default();
                    println!("{} Saved note {}{}", "✓".green().bold(), format!("#{}", report.id).cyan(), parent.dimmed());
                    if let Some(warning) = &report.warning {
                        println!("  {} stored without embedding: {}", "!".yellow(), warning);
                    }
                }
                Err(e) => println!("{} Chunk not saved: {}", "✗".red().bold(), e),
            }
        }
    }

    if outcomes.iter().all(|o| o.is_err()) {
        bail!("no part of the note was saved");
    }
    Ok(())
}
