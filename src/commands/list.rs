//! Listing commands: list, recent, favorites

use anyhow::Result;

use second_brain::core::note::NoteFilter;
use second_brain::Session;

use super::{print_notes, ScopeArgs};

pub fn run(
    session: &Session,
    text: Option<String>,
    scope: &ScopeArgs,
    limit: Option<usize>,
    json: bool,
) -> Result<()> {
    let filter = NoteFilter {
        text,
        scope: scope.scope()?,
    };
    let notes = session.list(&filter, limit)?;
    print_notes(&notes, json)
}

pub fn recent(session: &Session, limit: usize, json: bool) -> Result<()> {
    print_notes(&session.recent(limit)?, json)
}

pub fn favorites(session: &Session, json: bool) -> Result<()> {
    print_notes(&session.favorites()?, json)
}
