//! Document-text extractor.
//!
//! Finds account ids in free text (bare, hyphenated, or labeled) and
//! attaches a context window of surrounding lines to each one.

use crate::account_id::{find_all, AccountId};
use crate::models::{Candidate, DescriptionEntry};

/// Lines kept above and below each matching line.
pub const CONTEXT_RADIUS: usize = 2;

/// One candidate per distinct id in `text`.
///
/// The description is every non-blank line within [`CONTEXT_RADIUS`] of a
/// line that mentions the id, in original order with each line kept once.
pub fn extract_document(text: &str, provenance: &str) -> Vec<Candidate> {
    let lines: Vec<&str> = text.lines().collect();

    // Distinct ids in priority order, each with every raw spelling seen.
    let mut found: Vec<(AccountId, Vec<String>)> = Vec::new();
    for m in find_all(text) {
        match found.iter_mut().find(|(id, _)| *id == m.id) {
            Some((_, raws)) => {
                if !raws.contains(&m.raw) {
                    raws.push(m.raw);
                }
            }
            None => found.push((m.id, vec![m.raw])),
        }
    }

    found
        .into_iter()
        .filter_map(|(id, raws)| {
            let hits: Vec<usize> = lines
                .iter()
                .enumerate()
                .filter(|(_, line)| mentions(line, &id, &raws))
                .map(|(i, _)| i)
                .collect();
            let (first, last) = (*hits.first()?, *hits.last()?);

            let window = context_window(&lines, &hits);
            let tag = format!(
                "{}#lines={}-{}",
                provenance,
                first.saturating_sub(CONTEXT_RADIUS) + 1,
                (last + CONTEXT_RADIUS).min(lines.len() - 1) + 1
            );
            Some(Candidate::new(
                id.as_str(),
                DescriptionEntry::Lines(window),
                tag,
            ))
        })
        .collect()
}

fn mentions(line: &str, id: &AccountId, raws: &[String]) -> bool {
    line.contains(id.as_str())
        || line.contains(&id.hyphenated())
        || raws.iter().any(|raw| line.contains(raw.as_str()))
}

fn context_window(lines: &[&str], hits: &[usize]) -> Vec<String> {
    let mut keep = vec![false; lines.len()];
    for &hit in hits {
        let lo = hit.saturating_sub(CONTEXT_RADIUS);
        let hi = (hit + CONTEXT_RADIUS).min(lines.len() - 1);
        for flag in &mut keep[lo..=hi] {
            *flag = true;
        }
    }

    let mut window: Vec<String> = Vec::new();
    for (line, _) in lines.iter().zip(keep).filter(|(_, k)| *k) {
        let line = line.trim_end();
        if line.trim().is_empty() || window.iter().any(|w| w == line) {
            continue;
        }
        window.push(line.to_string());
    }
    window
}
