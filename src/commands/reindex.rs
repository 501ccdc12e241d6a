//! Reindex command - rebuild derived indexes from the note store

use anyhow::Result;
use colored::Colorize;

use second_brain::Session;

pub fn run(session: &Session, vectors: bool, embed_missing: bool, json: bool) -> Result<()> {
    let start = std::time::Instant::now();

    let lexical = session.rebuild_lexical()?;
    let loaded = if vectors { Some(session.rebuild_vectors()?) } else { None };
    let embedded = if embed_missing { Some(session.embed_missing()?) } else { None };

    let duration_ms = start.elapsed().as_millis();

    if json {
        println!(
            "{}",
            serde_json::json!({
                "lexical": lexical,
                "vectors_loaded": loaded.map(|r| r.loaded),
                "vectors_skipped": loaded.map(|r| r.skipped),
                "embedded": embedded,
                "duration_ms": duration_ms,
            })
        );
        return Ok(());
    }

    println!(
        "{} Full-text index rebuilt: {} notes",
        "✓".green().bold(),
        lexical.to_string().cyan()
    );
    if let Some(report) = loaded {
        println!(
            "{} Vector index rebuilt: {} vectors",
            "✓".green().bold(),
            report.loaded.to_string().cyan()
        );
        if report.skipped > 0 {
            println!("  {} {} embeddings skipped (wrong dimension)", "→".dimmed(), report.skipped);
        }
    }
    if let Some(report) = embedded {
        println!(
            "{} Embedded {} notes stored without a vector",
            "✓".green().bold(),
            report.embedded.to_string().cyan()
        );
        if report.failed > 0 {
            println!("  {} {} notes failed", "✗".red(), report.failed);
        }
        if report.skipped > 0 {
            println!("  {} {} notes changed during the run, left as is", "→".dimmed(), report.skipped);
        }
    }
    println!("  {} took {:.2}s", "→".dimmed(), duration_ms as f64 / 1000.0);

    Ok(())
}
