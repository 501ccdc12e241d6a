//! Export command - JSON dump or binary database copy

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use anyhow::{bail, Context, Result};
use colored::Colorize;

use second_brain::Session;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ExportFormat {
    Json,
    Db,
}

pub fn run(session: &Session, format: ExportFormat, output: Option<&Path>, json: bool) -> Result<()> {
    match (format, output) {
        (ExportFormat::Json, None) => {
            session.export_json(std::io::stdout().lock())?;
        }
        (ExportFormat::Json, Some(path)) => {
            if path.exists() {
                bail!("{} already exists", path.display());
            }
            let file = File::create(path)
                .with_context(|| format!("Failed to create {}", path.display()))?;
            let count = session.export_json(BufWriter::new(file))?;
            report(json, path, count);
        }
        (ExportFormat::Db, None) => bail!("--output is required for a database copy"),
        (ExportFormat::Db, Some(path)) => {
            session.backup(path)?;
            let count = session.stats()?.store.note_count;
            report(json, path, count);
        }
    }
    Ok(())
}

fn report(json: bool, path: &Path, count: usize) {
    if json {
        println!("{}", serde_json::json!({ "path": path.display().to_string(), "notes": count }));
    } else {
        println!("{} Exported {} notes to {}", "✓".green().bold(), count.to_string().cyan(), path.display());
    }
}
