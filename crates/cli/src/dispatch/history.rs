use super::{DispatchResult, DispatchTarget, Dispatcher, SearchOutcome};
use crate::settings::SearchOverrides;
use cleats_protocol::args::SearchOptions;
use cleats_runner::WindowKey;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// One successful search, with the options it actually ran with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchHistoryEntry {
    pub query: String,
    #[serde(flatten)]
    pub options: SearchOverrides,
}

impl SearchHistoryEntry {
    fn new(query: &str, options: &SearchOptions) -> Self {
        Self {
            query: query.to_string(),
            options: SearchOverrides {
                mode: Some(options.mode),
                backend: options.backend,
                limit: options.limit,
                explain: options.explain,
            },
        }
    }

    /// `mode code | backend auto | limit 25`
    pub fn detail(&self) -> String {
        let mode = self.options.mode.map(|mode| mode.as_str()).unwrap_or("both");
        let backend = self
            .options
            .backend
            .map(|backend| backend.as_str())
            .unwrap_or("auto");
        let limit = self
            .options
            .limit
            .map(|limit| limit.to_string())
            .unwrap_or_else(|| "default".to_string());
        format!("mode {mode} | backend {backend} | limit {limit}")
    }
}

/// Recent searches per window, newest first. Lives as long as the dispatcher.
#[derive(Debug, Default)]
pub(super) struct SearchHistory {
    windows: Mutex<HashMap<WindowKey, VecDeque<SearchHistoryEntry>>>,
}

impl SearchHistory {
    fn lock(&self) -> MutexGuard<'_, HashMap<WindowKey, VecDeque<SearchHistoryEntry>>> {
        self.windows.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Puts the entry first. An earlier entry with the same query is replaced.
    pub(super) fn record(&self, window: &WindowKey, entry: SearchHistoryEntry, limit: usize) {
        let mut windows = self.lock();
        let entries = windows.entry(window.clone()).or_default();
        entries.retain(|existing| existing.query != entry.query);
        entries.push_front(entry);
        entries.truncate(limit.max(1));
    }

    pub(super) fn last(&self, window: &WindowKey) -> Option<SearchHistoryEntry> {
        self.lock().get(window).and_then(|entries| entries.front().cloned())
    }

    pub(super) fn entries(&self, window: &WindowKey) -> Vec<SearchHistoryEntry> {
        self.lock()
            .get(window)
            .map(|entries| entries.iter().cloned().collect())
            .unwrap_or_default()
    }
}

impl Dispatcher {
    pub(super) fn record_search(&self, window: &WindowKey, query: &str, options: &SearchOptions) {
        self.history.record(
            window,
            SearchHistoryEntry::new(query, options),
            self.settings.history_limit(),
        );
    }

    /// The window's past searches, newest first.
    pub fn search_history(&self, target: &DispatchTarget) -> Vec<SearchHistoryEntry> {
        let entries = self.history.entries(&target.window);
        if entries.is_empty() {
            self.port.show_status(&target.window, "no history yet.");
        }
        entries
    }

    /// Runs the window's most recent search again with the same options.
    /// `None` when the window has not searched yet.
    pub async fn repeat_last_search(&self, target: &DispatchTarget) -> DispatchResult<Option<SearchOutcome>> {
        let Some(entry) = self.history.last(&target.window) else {
            self.port
                .show_status(&target.window, "no previous search to repeat.");
            return Ok(None);
        };
        log::debug!("Repeating search {:?} ({})", entry.query, entry.detail());
        self.search(target, &entry.query, &entry.options).await.map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cleats_protocol::{SearchBackend, SearchMode};
    use pretty_assertions::assert_eq;

    fn entry(query: &str) -> SearchHistoryEntry {
        SearchHistoryEntry::new(
            query,
            &SearchOptions {
                mode: SearchMode::Code,
                backend: None,
                limit: Some(25),
                explain: false,
            },
        )
    }

    #[test]
    fn newest_first_without_duplicates_and_bounded() {
        let history = SearchHistory::default();
        let window = WindowKey::from("w1");
        for query in ["a", "b", "a", "c"] {
            history.record(&window, entry(query), 2);
        }

        let queries: Vec<String> = history
            .entries(&window)
            .into_iter()
            .map(|entry| entry.query)
            .collect();
        assert_eq!(queries, vec!["c", "a"]);
        assert_eq!(history.last(&window).map(|entry| entry.query), Some("c".into()));
        assert!(history.entries(&WindowKey::from("w2")).is_empty());
    }

    #[test]
    fn detail_names_mode_backend_and_limit() {
        let mut recorded = entry("q");
        assert_eq!(recorded.detail(), "mode code | backend auto | limit 25");
        recorded.options.backend = Some(SearchBackend::Sqlite);
        recorded.options.mode = None;
        assert_eq!(recorded.detail(), "mode both | backend sqlite | limit 25");
    }
}
