use anyhow::Result;
use colored::*;

use second_brain::Session;

pub fn run(session: &Session, json: bool) -> Result<()> {
    let stats = session.stats()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    let store = &stats.store;
    println!("{}", "Second Brain Status".bold());
    println!("{}", "=".repeat(50));
    println!();
    println!("  {:<16} {}", "Database", stats.db_path.display());
    println!("  {:<16} {:.2} KB", "Size", stats.db_bytes as f64 / 1024.0);
    println!();

    println!("{}", "Notes".cyan());
    println!("{}", "-".repeat(30));
    println!("   {:<14} {:>6}", "Total", store.note_count);
    println!("   {:<14} {:>6}", "Embedded", store.embedding_count);
    println!("   {:<14} {:>6}", "Favorites", store.favorite_count);
    if let Some(last) = store.last_modified {
        println!("   {:<14} {}", "Last change", last.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M"));
    }
    println!();

    println!("{}", "Vector index".cyan());
    println!("{}", "-".repeat(30));
    match store.dimension {
        Some(dim) => println!("   {:<14} {:>6}", "Dimension", dim),
        None => println!("   {:<14} {:>6}", "Dimension", "unset"),
    }
    println!("   {:<14} {:>6}", "Live", stats.live_vectors);
    println!("   {:<14} {:>6}", "Slots", stats.vector_slots);
    println!();

    println!("{}", "Caches".cyan());
    println!("{}", "-".repeat(30));
    println!("   {:<14} {:>6}", "Embeddings", stats.cached_embeddings);
    println!("   {:<14} {:>6}", "Queries", stats.cached_queries);

    let missing = store.note_count.saturating_sub(store.embedding_count);
    if missing > 0 {
        println!();
        println!(
            "{} {} notes have no embedding; run {} once the backend is up",
            "!".yellow(),
            missing,
            "brain reindex --embed-missing".cyan()
        );
    }

    Ok(())
}
