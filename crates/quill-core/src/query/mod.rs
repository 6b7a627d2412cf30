//! Query engine over the local index.
//!
//! Term matching is conjunctive: a note must contain every query term.
//! Matches are scored by summed term frequency, with ties broken by
//! last-modified descending and then note ID ascending so result order is
//! deterministic. Tag and date filters AND with term matching.

use std::collections::HashMap;

use chrono::NaiveDate;

use crate::error::{Error, Result};
use crate::index::{normalize_term, LocalIndex};
use crate::models::{Note, NoteId};

/// Inclusive last-modified bounds, Unix milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DateRange {
    pub from: Option<i64>,
    pub to: Option<i64>,
}

impl DateRange {
    /// Parse `--from` / `--to` style `YYYY-MM-DD` arguments.
    ///
    /// `from` is the start of its day, `to` the end of its day, both UTC.
    /// An empty range (`from` after `to`) is rejected as [`Error::InvalidQuery`].
    pub fn parse(from: Option<&str>, to: Option<&str>) -> Result<Option<Self>> {
        let from = from.map(|raw| day_start_ms(raw)).transpose()?;
        let to = to.map(|raw| day_end_ms(raw)).transpose()?;

        if let (Some(from), Some(to)) = (from, to) {
            if from > to {
                return Err(Error::InvalidQuery(
                    "--from date is after --to date".to_string(),
                ));
            }
        }

        if from.is_none() && to.is_none() {
            Ok(None)
        } else {
            Ok(Some(Self { from, to }))
        }
    }

    fn contains(self, timestamp_ms: i64) -> bool {
        self.from.is_none_or(|from| timestamp_ms >= from)
            && self.to.is_none_or(|to| timestamp_ms <= to)
    }
}

/// A parsed search request.
#[derive(Debug, Clone, Default)]
pub struct SearchQuery {
    terms: Vec<String>,
    tags: Vec<String>,
    date_range: Option<DateRange>,
}

impl SearchQuery {
    /// Build a query from raw CLI terms and filters.
    ///
    /// Terms are normalized the same way note text is tokenized; a term with
    /// no indexable characters can never match and yields empty results.
    #[must_use]
    pub fn new(terms: &[String], tags: &[String], date_range: Option<DateRange>) -> Self {
        let terms = terms
            .iter()
            .filter(|raw| !raw.trim().is_empty())
            .map(|raw| normalize_term(raw).unwrap_or_else(|| raw.trim().to_lowercase()))
            .collect();
        let tags = tags
            .iter()
            .map(|tag| tag.trim().to_lowercase())
            .filter(|tag| !tag.is_empty())
            .collect();

        Self {
            terms,
            tags,
            date_range,
        }
    }

    /// Whether the query carries no terms and no filters after
    /// normalization, e.g. when every raw term was blank.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty() && self.tags.is_empty() && self.date_range.is_none()
    }

    fn passes_filters(&self, note: &Note) -> bool {
        self.tags.iter().all(|tag| note.has_tag(tag))
            && self
                .date_range
                .is_none_or(|range| range.contains(note.updated_at))
    }
}

/// Execute a search against the local index, ranked per the module rules.
pub fn search(index: &LocalIndex, query: &SearchQuery) -> Result<Vec<Note>> {
    if query.terms.is_empty() {
        // Filter-only query: all matching notes, newest first
        let notes = index
            .all_notes()?
            .into_iter()
            .filter(|note| query.passes_filters(note))
            .collect();
        return Ok(notes);
    }

    let Some(scores) = intersect_postings(index, &query.terms)? else {
        return Ok(Vec::new());
    };

    let mut scored: Vec<(i64, Note)> = Vec::with_capacity(scores.len());
    for (id, score) in scores {
        let note = index.get_note(&id)?;
        if query.passes_filters(&note) {
            scored.push((score, note));
        }
    }

    scored.sort_by(|(score_a, note_a), (score_b, note_b)| {
        score_b
            .cmp(score_a)
            .then_with(|| note_b.updated_at.cmp(&note_a.updated_at))
            .then_with(|| note_a.id.cmp(&note_b.id))
    });

    Ok(scored.into_iter().map(|(_, note)| note).collect())
}

/// Notes containing every term, scored by summed term frequency.
/// `None` when some term matches nothing (so the conjunction is empty).
fn intersect_postings(
    index: &LocalIndex,
    terms: &[String],
) -> Result<Option<HashMap<NoteId, i64>>> {
    let mut scores: Option<HashMap<NoteId, i64>> = None;

    for term in terms {
        let postings: HashMap<NoteId, i64> = index.postings(term)?.into_iter().collect();
        if postings.is_empty() {
            return Ok(None);
        }

        scores = Some(match scores {
            None => postings,
            Some(previous) => {
                let mut merged = HashMap::new();
                for (id, score) in previous {
                    if let Some(count) = postings.get(&id) {
                        merged.insert(id, score + count);
                    }
                }
                if merged.is_empty() {
                    return Ok(None);
                }
                merged
            }
        });
    }

    Ok(scores)
}

fn day_start_ms(raw: &str) -> Result<i64> {
    Ok(parse_date(raw)?
        .and_hms_opt(0, 0, 0)
        .expect("midnight is valid")
        .and_utc()
        .timestamp_millis())
}

fn day_end_ms(raw: &str) -> Result<i64> {
    Ok(parse_date(raw)?
        .and_hms_milli_opt(23, 59, 59, 999)
        .expect("end of day is valid")
        .and_utc()
        .timestamp_millis())
}

fn parse_date(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| Error::InvalidQuery(format!("invalid date '{raw}', expected YYYY-MM-DD")))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::models::NoteChange;

    fn note(id: &str, title: &str, body: &str, tags: &[&str], updated_at: i64, usn: i64) -> Note {
        Note {
            id: id.into(),
            title: title.to_string(),
            body: body.to_string(),
            tags: tags.iter().map(|tag| (*tag).to_string()).collect(),
            created_at: updated_at,
            updated_at,
            usn,
        }
    }

    fn index_with(notes: Vec<Note>) -> LocalIndex {
        let mut index = LocalIndex::open_in_memory().unwrap();
        let changes: Vec<NoteChange> = notes
            .into_iter()
            .map(|note| NoteChange::Upsert { note })
            .collect();
        index.apply_batch(&changes).unwrap();
        index
    }

    fn ids(notes: &[Note]) -> Vec<&str> {
        notes.iter().map(|note| note.id.as_str()).collect()
    }

    const DAY_MS: i64 = 24 * 60 * 60 * 1_000;

    #[test]
    fn empty_index_returns_empty_not_error() {
        let index = LocalIndex::open_in_memory().unwrap();
        let query = SearchQuery::new(&["anything".to_string()], &[], None);
        assert!(search(&index, &query).unwrap().is_empty());

        let filter_only = SearchQuery::new(&[], &["tag".to_string()], None);
        assert!(search(&index, &filter_only).unwrap().is_empty());
    }

    #[test]
    fn recency_breaks_score_ties() {
        // A modified day 1, B modified day 2, both match "project" once
        let index = index_with(vec![
            note("a", "Project", "alpha", &[], DAY_MS, 1),
            note("b", "Project", "beta", &[], 2 * DAY_MS, 2),
        ]);

        let query = SearchQuery::new(&["project".to_string()], &[], None);
        let results = search(&index, &query).unwrap();
        assert_eq!(ids(&results), vec!["b", "a"]);
    }

    #[test]
    fn id_breaks_full_ties() {
        let index = index_with(vec![
            note("b", "Project", "x", &[], DAY_MS, 1),
            note("a", "Project", "x", &[], DAY_MS, 2),
        ]);

        let query = SearchQuery::new(&["project".to_string()], &[], None);
        let results = search(&index, &query).unwrap();
        assert_eq!(ids(&results), vec!["a", "b"]);
    }

    #[test]
    fn term_frequency_outranks_recency() {
        let index = index_with(vec![
            note("recent", "Project", "mentioned once", &[], 2 * DAY_MS, 1),
            note(
                "dense",
                "Project project",
                "project everywhere project",
                &[],
                DAY_MS,
                2,
            ),
        ]);

        let query = SearchQuery::new(&["project".to_string()], &[], None);
        let results = search(&index, &query).unwrap();
        assert_eq!(ids(&results), vec!["dense", "recent"]);
    }

    #[test]
    fn all_terms_are_required() {
        let index = index_with(vec![
            note("both", "alpha beta", "", &[], DAY_MS, 1),
            note("one", "alpha only", "", &[], DAY_MS, 2),
        ]);

        let query = SearchQuery::new(&["alpha".to_string(), "beta".to_string()], &[], None);
        let results = search(&index, &query).unwrap();
        assert_eq!(ids(&results), vec!["both"]);
    }

    #[test]
    fn tag_filter_is_conjunctive_with_terms() {
        let index = index_with(vec![
            note("tagged", "project", "", &["work"], DAY_MS, 1),
            note("untagged", "project", "", &[], 2 * DAY_MS, 2),
        ]);

        let query = SearchQuery::new(&["project".to_string()], &["Work".to_string()], None);
        let results = search(&index, &query).unwrap();
        assert_eq!(ids(&results), vec!["tagged"]);
    }

    #[test]
    fn date_filter_bounds_are_inclusive() {
        let index = index_with(vec![
            note("early", "project", "", &[], day_start_ms("2024-01-01").unwrap(), 1),
            note("late", "project", "", &[], day_start_ms("2024-03-01").unwrap(), 2),
        ]);

        let range = DateRange::parse(Some("2024-01-01"), Some("2024-01-31")).unwrap();
        let query = SearchQuery::new(&["project".to_string()], &[], range);
        let results = search(&index, &query).unwrap();
        assert_eq!(ids(&results), vec!["early"]);
    }

    #[test]
    fn filter_only_query_orders_by_recency() {
        let index = index_with(vec![
            note("old", "A", "", &["keep"], DAY_MS, 1),
            note("new", "B", "", &["keep"], 2 * DAY_MS, 2),
            note("other", "C", "", &["skip"], 3 * DAY_MS, 3),
        ]);

        let query = SearchQuery::new(&[], &["keep".to_string()], None);
        let results = search(&index, &query).unwrap();
        assert_eq!(ids(&results), vec!["new", "old"]);
    }

    #[test]
    fn term_matching_is_case_insensitive() {
        let index = index_with(vec![note("n", "PROJECT Plan", "", &[], DAY_MS, 1)]);

        let query = SearchQuery::new(&["Project".to_string()], &[], None);
        assert_eq!(search(&index, &query).unwrap().len(), 1);
    }

    #[test]
    fn accented_text_is_searchable() {
        let index = index_with(vec![note("n", "Café list", "crème brûlée", &[], DAY_MS, 1)]);

        let query = SearchQuery::new(&["café".to_string()], &[], None);
        assert_eq!(search(&index, &query).unwrap().len(), 1);

        let query = SearchQuery::new(&["brûlée".to_string()], &[], None);
        assert_eq!(search(&index, &query).unwrap().len(), 1);
    }

    #[test]
    fn unmatchable_term_yields_empty_results() {
        let index = index_with(vec![note("n", "anything", "", &[], DAY_MS, 1)]);

        let query = SearchQuery::new(&["!!!".to_string()], &[], None);
        assert!(search(&index, &query).unwrap().is_empty());
    }

    #[test]
    fn blank_terms_leave_the_query_empty() {
        let blank = SearchQuery::new(&["   ".to_string()], &[], None);
        assert!(blank.is_empty());

        let tagged = SearchQuery::new(&[], &["work".to_string()], None);
        assert!(!tagged.is_empty());

        let range = DateRange::parse(Some("2024-01-01"), None).unwrap();
        let dated = SearchQuery::new(&[], &[], range);
        assert!(!dated.is_empty());
    }

    #[test]
    fn date_range_rejects_inverted_bounds() {
        let error = DateRange::parse(Some("2024-02-01"), Some("2024-01-01")).unwrap_err();
        assert!(matches!(error, Error::InvalidQuery(_)));
    }

    #[test]
    fn date_range_rejects_malformed_dates() {
        let error = DateRange::parse(Some("yesterday"), None).unwrap_err();
        assert!(matches!(error, Error::InvalidQuery(_)));
    }

    #[test]
    fn date_range_parse_none_is_none() {
        assert_eq!(DateRange::parse(None, None).unwrap(), None);
    }
}
