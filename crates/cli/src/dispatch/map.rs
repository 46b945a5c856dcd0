use super::{DispatchError, DispatchResult, DispatchTarget, Dispatcher, MapOutcome, MapSelection, MapSource};
use crate::api::MapApiClient;
use crate::port::Panel;
use crate::report::{map_warnings, needs_index_rebuild, render_map_report};
use cleats_protocol::args::{self, MapOutputs, MapRequest};
use cleats_protocol::focus::{relative_focus, symbol_focus};
use cleats_protocol::{MapFormat, MapScope};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

const REBUILD_HINT: &str =
    "map is missing dataflow/control-flow metadata; rebuild the index with `index build --mode all`.";

impl Dispatcher {
    /// Generates a dependency map. With an API server configured the HTTP
    /// path is tried first; any API failure falls back to the CLI.
    pub async fn map(&self, target: &DispatchTarget, selection: &MapSelection) -> DispatchResult<MapOutcome> {
        let root = self.prepare(target)?;
        let window = &target.window;

        let focus = map_focus(&root, selection);
        let request = self
            .settings
            .map_request(selection.scope, focus, selection.map_type, selection.format);
        let outputs = MapOutputs::in_dir(&self.settings.map_output_dir(&root), &request);

        if let Some(api_url) = self.settings.api_url() {
            self.port
                .show_status(window, "generating map (API server)...");
            match self.map_via_api(api_url, &request, &root, &outputs).await {
                Ok(payload) => {
                    return Ok(self.finish_map(target, root, MapSource::Api, &request, &outputs, &payload));
                }
                Err(err) => {
                    log::warn!("Map API failed, falling back to CLI: {err}");
                    self.port
                        .show_status(window, "API map failed; falling back to CLI.");
                }
            }
        }

        self.port.show_status(window, "generating map...");
        let panel = self.settings.map_stream_output.then_some(Panel::Map);
        let result = self
            .run_to_completion(target, &root, args::report_map(&request, &root, &outputs), true, panel)
            .await?;
        if !result.success() {
            return Err(DispatchError::exited(
                result.exit_code(),
                result.raw_output(),
                "map failed.",
            ));
        }
        if let Some(err) = result.parse_error() {
            return Err(DispatchError::ResultParseError(err.to_string()));
        }
        let payload = result
            .parsed_payload()
            .and_then(Value::as_object)
            .filter(|payload| payload.get("ok").and_then(Value::as_bool) == Some(true))
            .ok_or_else(|| DispatchError::ResultParseError("map returned invalid JSON.".into()))?;
        Ok(self.finish_map(target, root, MapSource::Cli, &request, &outputs, payload))
    }

    /// Runs the API client on its own task so the caller's task never waits on sockets.
    async fn map_via_api(
        &self,
        api_url: &str,
        request: &MapRequest,
        root: &Path,
        outputs: &MapOutputs,
    ) -> DispatchResult<Map<String, Value>> {
        let client = MapApiClient::new(api_url, self.settings.api_timeout())?;
        let request = request.clone();
        let root = root.to_path_buf();
        let outputs = outputs.clone();
        tokio::spawn(async move { client.generate(&request, &root, &outputs).await })
            .await
            .map_err(|err| DispatchError::ApiUnavailable(err.to_string()))?
    }

    fn finish_map(
        &self,
        target: &DispatchTarget,
        root: PathBuf,
        source: MapSource,
        request: &MapRequest,
        outputs: &MapOutputs,
        payload: &Map<String, Value>,
    ) -> MapOutcome {
        let window = &target.window;
        let report = render_map_report(payload);
        if self.settings.map_show_report_panel {
            self.port.write_panel(window, Panel::Map, &report);
        }
        let warnings = map_warnings(payload);
        let suggest_rebuild = needs_index_rebuild(&warnings);
        if suggest_rebuild {
            self.port.show_status(window, REBUILD_HINT);
        }

        let text = |key: &str| {
            payload
                .get(key)
                .and_then(Value::as_str)
                .filter(|value| !value.is_empty())
                .map(str::to_string)
        };
        let format = text("format")
            .and_then(|raw| raw.parse::<MapFormat>().ok())
            .unwrap_or(request.format);
        let out_path = text("outPath").unwrap_or_else(|| outputs.out.to_string_lossy().into_owned());
        let model_path = text("modelPath").or_else(|| Some(outputs.model.to_string_lossy().into_owned()));
        let node_list_path =
            text("nodeListPath").or_else(|| Some(outputs.node_list.to_string_lossy().into_owned()));

        log::info!("Map ready at {out_path} ({format}, via {source:?})");
        MapOutcome {
            root,
            source,
            out_path,
            format,
            model_path,
            node_list_path,
            cache_key: text("cacheKey"),
            open_in_browser: format.opens_in_browser(),
            report,
            warnings,
            suggest_rebuild,
        }
    }
}

fn map_focus(root: &Path, selection: &MapSelection) -> String {
    match (selection.scope, selection.symbol.as_deref()) {
        (MapScope::Repo, _) => String::new(),
        (MapScope::Symbol, Some(symbol)) if !symbol.trim().is_empty() => {
            symbol_focus(root, selection.focus.as_deref(), symbol)
        }
        _ => selection
            .focus
            .as_deref()
            .map(|focus| relative_focus(root, focus))
            .unwrap_or_default(),
    }
}
