//! Single-note commands: get, update, delete, favorite

use anyhow::{bail, Result};
use colored::Colorize;

use second_brain::{NoteId, Session};

pub fn get(session: &Session, id: NoteId, json: bool) -> Result<()> {
    let Some(note) = session.get(id)? else {
        bail!("note #{} not found", id);
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&note)?);
    } else {
        super::print_note_full(&note);
    }
    Ok(())
}

pub fn update(session: &Session, id: NoteId, body: &str, tags: Option<&str>, json: bool) -> Result<()> {
    let report = session.update(id, body, tags)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{} Updated note {}", "✓".green().bold(), format!("#{}", id).cyan());
        if let Some(warning) = &report.warning {
            println!("  {} stored without embedding: {}", "!".yellow(), warning);
        }
    }
    Ok(())
}

pub fn delete(session: &Session, id: NoteId, json: bool) -> Result<()> {
    let deleted = session.delete(id)?;

    if json {
        println!("{}", serde_json::json!({ "id": id, "deleted": deleted }));
    } else if deleted {
        println!("{} Deleted note {}", "✓".green().bold(), format!("#{}", id).cyan());
    } else {
        println!("{} Note #{} does not exist", "!".yellow(), id);
    }
    Ok(())
}

pub fn favorite(session: &Session, id: NoteId, json: bool) -> Result<()> {
    let favorite = session.toggle_favorite(id)?;

    if json {
        println!("{}", serde_json::json!({ "id": id, "favorite": favorite }));
    } else if favorite {
        println!("{} Note {} marked favorite", "★".yellow(), format!("#{}", id).cyan());
    } else {
        println!("{} Note {} unmarked", "☆".dimmed(), format!("#{}", id).cyan());
    }
    Ok(())
}
