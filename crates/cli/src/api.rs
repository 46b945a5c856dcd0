use crate::dispatch::{DispatchError, DispatchResult};
use cleats_protocol::args::{map_query, MapOutputs, MapRequest};
use cleats_protocol::{MapFormat, MAP_CACHE_KEY_HEADER};
use reqwest::{Client, Response, Url};
use serde_json::{Map, Value};
use std::path::Path;
use std::time::Duration;

/// Client for the tool's map HTTP endpoints.
///
/// `GET <base>/map?...&format=json` returns the map model,
/// `GET <base>/map/nodes?...` the node list and `GET <base>/map?...&format=<fmt>`
/// a rendering. Every failure maps to [`DispatchError::ApiUnavailable`].
#[derive(Debug, Clone)]
pub struct MapApiClient {
    base: Url,
    http: Client,
}

fn unavailable(err: impl std::fmt::Display) -> DispatchError {
    DispatchError::ApiUnavailable(err.to_string())
}

impl MapApiClient {
    pub fn new(base_url: &str, timeout: Duration) -> DispatchResult<Self> {
        let base = Url::parse(base_url.trim()).map_err(unavailable)?;
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(unavailable)?;
        Ok(Self { base, http })
    }

    pub fn endpoint(&self, segments: &[&str], query: &[(String, String)], format: Option<MapFormat>) -> DispatchResult<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| unavailable(format!("api_server_url cannot be a base: {}", self.base)))?
            .pop_if_empty()
            .extend(segments);
        {
            let mut pairs = url.query_pairs_mut();
            pairs.extend_pairs(query.iter().map(|(k, v)| (k.as_str(), v.as_str())));
            if let Some(format) = format {
                pairs.append_pair("format", format.as_str());
            }
        }
        Ok(url)
    }

    /// Produces the same payload shape as `report map --json`, writing the
    /// model, node list and (for downloadable formats) the artifact to `outputs`.
    pub async fn generate(
        &self,
        request: &MapRequest,
        repo: &Path,
        outputs: &MapOutputs,
    ) -> DispatchResult<Map<String, Value>> {
        let query = map_query(request, repo);

        let model_url = self.endpoint(&["map"], &query, Some(MapFormat::Json))?;
        log::debug!("Fetching map model from {model_url}");
        let response = self.get(model_url).await?;
        let cache_key = response
            .headers()
            .get(MAP_CACHE_KEY_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let model_text = response.text().await.map_err(unavailable)?;
        let Value::Object(mut payload) = serde_json::from_str::<Value>(&model_text).map_err(unavailable)? else {
            return Err(unavailable("map model is not a JSON object"));
        };
        write_output(&outputs.model, &model_text).await?;

        let nodes_url = self.endpoint(&["map", "nodes"], &query, None)?;
        let nodes_text = self.get(nodes_url).await?.text().await.map_err(unavailable)?;
        serde_json::from_str::<Value>(&nodes_text).map_err(unavailable)?;
        write_output(&outputs.node_list, &nodes_text).await?;

        let out_path = match request.format {
            MapFormat::Json => {
                write_output(&outputs.out, &model_text).await?;
                outputs.out.to_string_lossy().into_owned()
            }
            MapFormat::Dot => {
                let dot_url = self.endpoint(&["map"], &query, Some(MapFormat::Dot))?;
                let dot = self.get(dot_url).await?.text().await.map_err(unavailable)?;
                write_output(&outputs.out, &dot).await?;
                outputs.out.to_string_lossy().into_owned()
            }
            other => self.endpoint(&["map"], &query, Some(other))?.to_string(),
        };

        payload.insert("ok".into(), Value::Bool(true));
        payload.insert("outPath".into(), Value::String(out_path));
        payload.insert("format".into(), Value::String(request.format.as_str().into()));
        payload.insert(
            "modelPath".into(),
            Value::String(outputs.model.to_string_lossy().into_owned()),
        );
        payload.insert(
            "nodeListPath".into(),
            Value::String(outputs.node_list.to_string_lossy().into_owned()),
        );
        if let Some(cache_key) = cache_key {
            payload.insert("cacheKey".into(), Value::String(cache_key));
        }
        Ok(payload)
    }

    async fn get(&self, url: Url) -> DispatchResult<Response> {
        self.http
            .get(url)
            .send()
            .await
            .map_err(unavailable)?
            .error_for_status()
            .map_err(unavailable)
    }
}

async fn write_output(path: &Path, contents: &str) -> DispatchResult<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|err| unavailable(format!("{}: {err}", parent.display())))?;
    }
    tokio::fs::write(path, contents)
        .await
        .map_err(|err| unavailable(format!("{}: {err}", path.display())))
}
