use serde::Serialize;
use serde_json::{Map, Value};

const HIT_SECTIONS: &[&str] = &["code", "prose", "records"];
const REBUILD_MARKERS: &[&str] = &["dataflow metadata missing", "controlFlow metadata missing"];

pub fn format_validate_report(payload: &Map<String, Value>) -> String {
    let mut lines = vec!["PairOfCleats index validation".to_string(), String::new()];
    if let Some(root) = str_field(payload, "root").filter(|root| !root.is_empty()) {
        lines.push(format!("Repo: {root}"));
    }
    lines.push(format!("Status: {}", if truthy(payload.get("ok")) { "ok" } else { "issues" }));
    lines.push(String::new());

    if let Some(modes) = payload.get("modes").and_then(Value::as_object) {
        for (mode, entry) in modes {
            let Some(entry) = entry.as_object() else {
                continue;
            };
            let status = if truthy(entry.get("ok")) { "ok" } else { "missing" };
            lines.push(format!("{mode}: {status}"));
            if let Some(path) = str_field(entry, "path").filter(|path| !path.is_empty()) {
                lines.push(format!("  {path}"));
            }
            let missing = string_list(entry.get("missing"));
            if !missing.is_empty() {
                lines.push(format!("  missing: {}", missing.join(", ")));
            }
            let warnings = string_list(entry.get("warnings"));
            if !warnings.is_empty() {
                lines.push(format!("  warnings: {}", warnings.join(", ")));
            }
            lines.push(String::new());
        }
    }

    for (key, title) in [("issues", "Issues:"), ("warnings", "Warnings:"), ("hints", "Hints:")] {
        let items = string_list(payload.get(key));
        if items.is_empty() {
            continue;
        }
        lines.push(title.to_string());
        lines.extend(items.iter().map(|item| format!("- {item}")));
        lines.push(String::new());
    }

    let mut text = lines.join("\n").trim_end().to_string();
    text.push('\n');
    text
}

pub fn render_map_report(payload: &Map<String, Value>) -> String {
    let counts = payload
        .get("summary")
        .and_then(|summary| summary.get("counts"));
    let count = |key: &str| {
        counts
            .and_then(|counts| counts.get(key))
            .and_then(Value::as_u64)
            .unwrap_or(0)
    };
    let mut lines = vec![
        "PairOfCleats map report".to_string(),
        String::new(),
        format!("files: {}", count("files")),
        format!("members: {}", count("members")),
        format!("edges: {}", count("edges")),
    ];
    let warnings = map_warnings(payload);
    if !warnings.is_empty() {
        lines.push(String::new());
        lines.push("Warnings:".to_string());
        lines.extend(warnings.iter().map(|warning| format!("- {warning}")));
    }
    lines.join("\n") + "\n"
}

pub fn map_warnings(payload: &Map<String, Value>) -> Vec<String> {
    string_list(payload.get("warnings"))
}

/// Whether map warnings show the index lacks dataflow or control-flow data.
pub fn needs_index_rebuild(warnings: &[String]) -> bool {
    warnings
        .iter()
        .any(|warning| REBUILD_MARKERS.iter().any(|marker| warning.contains(marker)))
}

/// One search result, tagged with the payload section it came from.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    pub section: &'static str,
    pub file: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_line: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score_breakdown: Option<Value>,
}

impl SearchHit {
    pub fn location(&self) -> String {
        match self.start_line {
            Some(line) => format!("{}:{line}", self.file),
            None => self.file.clone(),
        }
    }

    fn score_label(&self) -> String {
        match self.score {
            Some(score) => format!("{score:.2} {}", self.score_type.as_deref().unwrap_or(""))
                .trim_end()
                .to_string(),
            None => "n/a".to_string(),
        }
    }
}

/// Hits from the `code`, `prose` and `records` arrays, in that order.
/// Entries without a `file` are skipped.
pub fn collect_hits(payload: &Map<String, Value>) -> Vec<SearchHit> {
    let mut hits = Vec::new();
    for &section in HIT_SECTIONS {
        let Some(items) = payload.get(section).and_then(Value::as_array) else {
            continue;
        };
        for item in items {
            let Some(entry) = item.as_object() else {
                continue;
            };
            let Some(file) = str_field(entry, "file").filter(|file| !file.is_empty()) else {
                continue;
            };
            hits.push(SearchHit {
                section,
                file: file.to_string(),
                start_line: entry.get("startLine").and_then(Value::as_u64),
                name: str_field(entry, "name")
                    .or_else(|| str_field(entry, "headline"))
                    .map(str::to_string),
                score: entry.get("score").and_then(Value::as_f64),
                score_type: str_field(entry, "scoreType").map(str::to_string),
                score_breakdown: entry.get("scoreBreakdown").cloned(),
            });
        }
    }
    hits
}

pub fn format_results_text(hits: &[SearchHit]) -> String {
    let mut text = format!("PairOfCleats results ({})\n\n", hits.len());
    for hit in hits {
        let name = hit.name.as_deref().unwrap_or("");
        text.push_str(&format!(
            "{}  {}  ({}, score {})\n",
            hit.location(),
            name,
            hit.section,
            hit.score_label()
        ));
    }
    text
}

pub fn format_explain_text(hits: &[SearchHit]) -> String {
    if hits.is_empty() {
        return "PairOfCleats explain\n\nno results.\n".to_string();
    }
    let mut text = String::from("PairOfCleats explain\n");
    for (rank, hit) in hits.iter().enumerate() {
        text.push_str(&format!(
            "\n{}. {} [{}] score {}\n",
            rank + 1,
            hit.location(),
            hit.section,
            hit.score_label()
        ));
        if let Some(name) = hit.name.as_deref() {
            text.push_str(&format!("   {name}\n"));
        }
        match hit
            .score_breakdown
            .as_ref()
            .and_then(|breakdown| serde_json::to_string_pretty(breakdown).ok())
        {
            Some(pretty) => {
                for line in pretty.lines() {
                    text.push_str(&format!("   {line}\n"));
                }
            }
            None => text.push_str("   (no score breakdown)\n"),
        }
    }
    text
}

fn str_field<'a>(map: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    map.get(key).and_then(Value::as_str)
}

fn truthy(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(flag)) => *flag,
        Some(Value::Null) | None => false,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|n| n != 0.0),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(items)) => !items.is_empty(),
        Some(Value::Object(map)) => !map.is_empty(),
    }
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .map(|item| match item {
                    Value::String(text) => text.clone(),
                    other => other.to_string(),
                })
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn validate_report_layout() {
        let payload = object(json!({
            "ok": false,
            "root": "/work/repo",
            "modes": {
                "code": {"ok": true, "path": "/cache/code"},
                "prose": {"ok": false, "path": "/cache/prose", "missing": ["chunk_meta.json", "token_postings.json"]}
            },
            "issues": ["prose index missing"],
            "hints": ["run index build --mode prose"]
        }));
        assert_eq!(
            format_validate_report(&payload),
            "PairOfCleats index validation\n\
             \n\
             Repo: /work/repo\n\
             Status: issues\n\
             \n\
             code: ok\n  /cache/code\n\
             \n\
             prose: missing\n  /cache/prose\n  missing: chunk_meta.json, token_postings.json\n\
             \n\
             Issues:\n- prose index missing\n\
             \n\
             Hints:\n- run index build --mode prose\n"
        );
    }

    #[test]
    fn map_report_counts_and_rebuild_hint() {
        let payload = object(json!({
            "ok": true,
            "summary": {"counts": {"files": 12, "members": 40, "edges": 77}},
            "warnings": ["dataflow metadata missing for 3 files"]
        }));
        let report = render_map_report(&payload);
        assert!(report.starts_with("PairOfCleats map report\n\nfiles: 12\nmembers: 40\nedges: 77\n"));
        assert!(report.ends_with("Warnings:\n- dataflow metadata missing for 3 files\n"));
        assert!(needs_index_rebuild(&map_warnings(&payload)));
        assert!(!needs_index_rebuild(&["graph truncated".to_string()]));
    }

    #[test]
    fn hits_skip_entries_without_file() {
        let payload = object(json!({
            "code": [{"file": "src/a.js", "startLine": 4, "name": "parse", "score": 1.5, "scoreType": "bm25"}, {"name": "orphan"}],
            "prose": [{"file": "README.md", "headline": "Intro"}],
            "records": "not-an-array"
        }));
        let hits = collect_hits(&payload);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].section, "code");
        assert_eq!(hits[0].location(), "src/a.js:4");
        assert_eq!(hits[1].name.as_deref(), Some("Intro"));

        let text = format_results_text(&hits);
        assert!(text.contains("src/a.js:4  parse  (code, score 1.50 bm25)"));
        assert!(text.contains("README.md  Intro  (prose, score n/a)"));
    }
}
