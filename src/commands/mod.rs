//! One module per `brain` subcommand

pub mod add;
pub mod ask;
pub mod export;
pub mod list;
pub mod note;
pub mod reindex;
pub mod search;
pub mod status;

use anyhow::Result;
use chrono::{Local, NaiveDate};
use colored::*;
use unicode_width::UnicodeWidthChar;

use second_brain::core::note::{split_tags, Scope, TimeRange};
use second_brain::Note;

/// Display width budget for a one-line body preview
pub const PREVIEW_WIDTH: usize = 72;

/// Tag and date options shared by list, search and ask
#[derive(Debug, Clone, Default, clap::Args)]
pub struct ScopeArgs {
    #[arg(long, help = "Comma-separated tags; every one must match")]
    pub tags: Option<String>,
    #[arg(long, help = "Earliest date (YYYY-MM-DD, inclusive)")]
    pub from: Option<NaiveDate>,
    #[arg(long, help = "Latest date (YYYY-MM-DD, inclusive)")]
    pub to: Option<NaiveDate>,
}

impl ScopeArgs {
    pub fn scope(&self) -> Result<Scope> {
        let tags = self.tags.as_deref().map(split_tags).unwrap_or_default();
        let range = TimeRange::from_dates(self.from, self.to)?;
        Ok(Scope::new(&tags, range))
    }
}

/// Cut `s` to at most `max_width` terminal columns, marking the cut with "...".
///
/// Newlines are flattened so a preview always stays on one line.
pub fn truncate(s: &str, max_width: usize) -> String {
    let flat = s.split_whitespace().collect::<Vec<_>>().join(" ");

    let mut width = 0;
    let mut out = String::new();
    for c in flat.chars() {
        let w = c.width().unwrap_or(0);
        if width + w > max_width {
            let mut cut = out.trim_end().to_string();
            cut.push_str("...");
            return cut;
        }
        width += w;
        out.push(c);
    }
    out
}

/// `#12  2024-01-05 13:02  [animals,demo] *  The quick brown fox`
pub fn print_note_line(note: &Note) {
    let when = note
        .timestamp
        .with_timezone(&Local)
        .format("%Y-%m-%d %H:%M")
        .to_string();
    let tags = if note.tags.is_empty() {
        String::new()
    } else {
        format!(" [{}]", note.tags_text())
    };
    let star = if note.favorite { " ★".yellow().to_string() } else { String::new() };

    println!(
        "{} {}{}{}  {}",
        format!("#{}", note.id).cyan(),
        when.dimmed(),
        tags.green(),
        star,
        truncate(&note.body, PREVIEW_WIDTH)
    );
}

pub fn print_note_full(note: &Note) {
    println!("{} {}", "Note".bold(), format!("#{}", note.id).cyan());
    println!("{}", "-".repeat(40));
    if let Some(parent) = note.parent_id {
        println!("  {:<10} #{}", "Parent", parent);
    }
    println!("  {:<10} {}", "Time", note.timestamp.with_timezone(&Local).to_rfc3339());
    println!("  {:<10} {}", "Tags", note.tags_text());
    println!("  {:<10} {}", "Favorite", if note.favorite { "yes" } else { "no" });
    println!("  {:<10} {}", "Embedded", if note.embedded { "yes" } else { "no" });
    println!();
    println!("{}", note.body);
}

pub fn print_notes(notes: &[Note], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(notes)?);
        return Ok(());
    }
    if notes.is_empty() {
        println!("{}", "No notes found.".yellow());
        return Ok(());
    }
    for note in notes {
        print_note_line(note);
    }
    Ok(())
}

/// Join positional words, falling back to stdin when there are none.
pub fn text_arg(words: &[String]) -> Result<String> {
    if !words.is_empty() {
        return Ok(words.join(" "));
    }
    let mut buf = String::new();
    std::io::Read::read_to_string(&mut std::io::stdin(), &mut buf)?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_by_display_width() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("line one\nline two", 40), "line one line two");
        assert_eq!(truncate("abcdefghij", 5), "abcde...");
        // Hangul syllables are two columns wide
        assert_eq!(truncate("한국어 테스트", 6), "한국어...");
    }

    #[test]
    fn test_scope_args_whole_days() -> Result<()> {
        let args = ScopeArgs {
            tags: Some("Work, ideas".to_string()),
            from: NaiveDate::from_ymd_opt(2024, 1, 1),
            to: NaiveDate::from_ymd_opt(2024, 1, 1),
        };
        let scope = args.scope()?;
        assert_eq!(scope.tags, vec!["work", "ideas"]);
        assert!(scope.range.start < scope.range.end);

        let backwards = ScopeArgs {
            from: NaiveDate::from_ymd_opt(2024, 2, 1),
            to: NaiveDate::from_ymd_opt(2024, 1, 1),
            ..Default::default()
        };
        assert!(backwards.scope().is_err());
        Ok(())
    }
}
