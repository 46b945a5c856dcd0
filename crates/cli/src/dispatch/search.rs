use super::index::json_object;
use super::{DispatchError, DispatchResult, DispatchTarget, Dispatcher, SearchOutcome};
use crate::port::Panel;
use crate::report::{collect_hits, format_explain_text, format_results_text};
use crate::settings::SearchOverrides;
use cleats_protocol::args;
use serde_json::Value;

impl Dispatcher {
    pub async fn search(
        &self,
        target: &DispatchTarget,
        query: &str,
        overrides: &SearchOverrides,
    ) -> DispatchResult<SearchOutcome> {
        let root = self.prepare(target)?;
        let window = &target.window;
        let query = query.trim();
        if query.is_empty() {
            self.port.show_status(window, "empty query.");
            return Ok(SearchOutcome {
                root,
                hits: Vec::new(),
                explain: None,
            });
        }

        let options = self.settings.search_options(overrides);
        let search_args = args::search(query, &options, &root)
            .map_err(|err| DispatchError::InvalidConfiguration(vec![err.to_string()]))?;

        self.port.show_status(window, "searching...");
        let result = self
            .run_to_completion(target, &root, search_args, true, None)
            .await?;
        if !result.success() {
            return Err(DispatchError::exited(
                result.exit_code(),
                result.raw_output(),
                "search failed.",
            ));
        }
        let payload = json_object(&result, "search returned invalid JSON.")?;
        if payload.get("ok") == Some(&Value::Bool(false)) {
            let message = payload
                .get("message")
                .and_then(Value::as_str)
                .filter(|message| !message.is_empty())
                .unwrap_or("search failed.");
            return Err(DispatchError::ToolReportedFailure(message.to_string()));
        }

        self.record_search(window, query, &options);

        let hits = collect_hits(payload);
        log::debug!("Search for {query:?} returned {} hit(s)", hits.len());
        if options.explain {
            let text = format_explain_text(&hits);
            self.port.write_panel(window, Panel::Results, &text);
            return Ok(SearchOutcome {
                root,
                hits,
                explain: Some(text),
            });
        }

        if hits.is_empty() {
            self.port.show_status(window, "no results.");
        } else {
            self.port
                .write_panel(window, Panel::Results, &format_results_text(&hits));
        }
        Ok(SearchOutcome {
            root,
            hits,
            explain: None,
        })
    }
}
