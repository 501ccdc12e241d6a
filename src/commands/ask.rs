//! Ask command - answer a question from stored notes

use anyhow::Result;
use colored::*;

use second_brain::Session;

use super::{truncate, ScopeArgs};

pub fn run(session: &Session, question: &str, scope: &ScopeArgs, json: bool) -> Result<()> {
    let answer = session.ask(question, &scope.scope()?)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&answer)?);
        return Ok(());
    }

    println!("{}", answer.answer);

    if !answer.context.is_empty() {
        println!();
        println!("{}", "Sources".dimmed());
        for hit in &answer.context {
            println!("  {} {}", format!("[[{}]]", hit.id).cyan(), truncate(&hit.body, 60).dimmed());
        }
    }
    if let Some(reason) = &answer.degraded {
        println!("{} Keyword retrieval only ({})", "!".yellow(), reason);
    }
    Ok(())
}
