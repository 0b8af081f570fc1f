//! Page and result limits across the pages of one query.

use crate::config::DEFAULT_RESULT_LIMIT;

/// Limits applied by [`ResultGovernor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResultLimits {
    /// Maximum pages to fetch (`None` = unbounded).
    pub max_pages: Option<usize>,
    /// Maximum results to return.
    pub max_results: usize,
}

impl Default for ResultLimits {
    fn default() -> Self {
        Self {
            max_pages: None,
            max_results: DEFAULT_RESULT_LIMIT,
        }
    }
}

/// Running totals for one query instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResultTracker {
    /// Pages admitted so far.
    pub pages_seen: usize,
    /// Results counted so far (before truncation).
    pub results_seen: usize,
    /// No further pages will be fetched.
    pub done: bool,
}

/// Tracks pages/results and truncates output at the configured limits.
#[derive(Debug, Clone, Default)]
pub struct ResultGovernor {
    limits: ResultLimits,
    tracker: ResultTracker,
}

impl ResultGovernor {
    /// Governor with the given limits and a fresh tracker.
    #[must_use]
    pub fn new(limits: ResultLimits) -> Self {
        Self {
            limits,
            tracker: ResultTracker::default(),
        }
    }

    /// Current limits.
    #[must_use]
    pub const fn limits(&self) -> ResultLimits {
        self.limits
    }

    /// Replace the limits; the tracker is left untouched.
    pub fn set_limits(&mut self, limits: ResultLimits) {
        self.limits = limits;
    }

    /// Current totals.
    #[must_use]
    pub const fn tracker(&self) -> ResultTracker {
        self.tracker
    }

    /// Whether fetching has finished.
    #[must_use]
    pub const fn is_done(&self) -> bool {
        self.tracker.done
    }

    /// Count a fetched page and return the part of it the caller gets.
    ///
    /// An empty page always ends the query. When the result limit is reached
    /// the page is cut so the cumulative total equals the limit exactly.
    pub fn admit<T>(&mut self, mut page: Vec<T>) -> Vec<T> {
        let previous = self.tracker.results_seen;
        self.tracker.pages_seen += 1;
        self.tracker.results_seen += page.len();

        if page.is_empty() {
            self.tracker.done = true;
            return page;
        }
        if self
            .limits
            .max_pages
            .is_some_and(|max_pages| self.tracker.pages_seen >= max_pages)
        {
            self.tracker.done = true;
        }
        if self.tracker.results_seen >= self.limits.max_results {
            self.tracker.done = true;
            page.truncate(self.limits.max_results.saturating_sub(previous));
        }
        page
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn governor(max_pages: Option<usize>, max_results: usize) -> ResultGovernor {
        ResultGovernor::new(ResultLimits {
            max_pages,
            max_results,
        })
    }

    #[test]
    fn empty_page_ends_iteration() {
        let mut governor = governor(None, 100);
        let page: Vec<u8> = governor.admit(Vec::new());
        assert!(page.is_empty());
        assert_eq!(
            governor.tracker(),
            ResultTracker {
                pages_seen: 1,
                results_seen: 0,
                done: true
            }
        );
    }

    #[test]
    fn truncates_overflow_only() {
        let mut governor = governor(None, 12);
        assert_eq!(governor.admit((0..10).collect()).len(), 10);
        assert!(!governor.is_done());
        let second = governor.admit((10..20).collect::<Vec<_>>());
        assert_eq!(second, vec![10, 11]);
        assert!(governor.is_done());
        assert_eq!(governor.tracker().results_seen, 20);
    }

    #[test]
    fn exact_limit_keeps_whole_page() {
        let mut governor = governor(None, 5);
        assert_eq!(governor.admit(vec![1, 2, 3, 4, 5]), vec![1, 2, 3, 4, 5]);
        assert!(governor.is_done());
    }

    #[test]
    fn page_limit_marks_done() {
        let mut governor = governor(Some(2), 100);
        governor.admit(vec![1]);
        assert!(!governor.is_done());
        governor.admit(vec![2]);
        assert!(governor.is_done());
        assert_eq!(governor.tracker().pages_seen, 2);
    }

    #[test]
    fn zero_result_limit_returns_nothing() {
        let mut governor = governor(None, 0);
        assert!(governor.admit(vec![1, 2]).is_empty());
        assert!(governor.is_done());
    }
}
