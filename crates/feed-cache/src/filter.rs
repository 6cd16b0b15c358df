//! Case-insensitive substring search over collection rows

/// A row that can be matched against a search term
pub trait Searchable {
    /// Text the search term is matched against
    fn search_text(&self) -> String;
}

/// Rows among the first `limit` whose text contains `term`, ignoring case.
/// An empty term matches everything.
pub fn filter_rows<R>(rows: &[R], term: &str, limit: usize) -> Vec<R>
where
    R: Searchable + Clone,
{
    let needle = term.to_lowercase();
    rows.iter()
        .take(limit)
        .filter(|row| needle.is_empty() || row.search_text().to_lowercase().contains(&needle))
        .cloned()
        .collect()
}
