//! Result evaluation.

use crate::storage::SearchResults;

/// True if the search returned at least one resource.
#[must_use]
pub fn is_match(results: &SearchResults) -> bool {
    results.size() > 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{Resource, ResourceRef};

    #[test]
    fn empty_results_do_not_match() {
        assert!(!is_match(&SearchResults::default()));
    }

    #[test]
    fn any_result_matches() {
        let r = Resource::new(&ResourceRef::new("Observation", "1").unwrap());
        assert!(is_match(&SearchResults::new(vec![r], 1)));
    }
}
