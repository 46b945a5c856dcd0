use crate::ProtocolError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

macro_rules! string_enum {
    (
        $(#[$meta:meta])*
        $name:ident, $kind:literal {
            $($variant:ident => $text:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(
                #[serde(rename = $text)]
                $variant,
            )+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub const fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = ProtocolError;

            fn from_str(raw: &str) -> Result<Self, Self::Err> {
                let value = raw.trim().to_ascii_lowercase();
                match value.as_str() {
                    $($text => Ok($name::$variant),)+
                    _ => Err(ProtocolError::unknown($kind, raw, &[$($text),+])),
                }
            }
        }
    };
}

string_enum! {
    /// Which corpus an index build or watch covers.
    IndexMode, "index mode" {
        Code => "code",
        Prose => "prose",
        All => "all",
    }
}

string_enum! {
    /// Search scope; `both` is the tool default and is never passed explicitly.
    SearchMode, "search mode" {
        Code => "code",
        Prose => "prose",
        Both => "both",
    }
}

string_enum! {
    /// Explicit search backend. Absence means the tool picks one.
    SearchBackend, "search backend" {
        Memory => "memory",
        Sqlite => "sqlite",
        SqliteFts => "sqlite-fts",
        Lmdb => "lmdb",
    }
}

string_enum! {
    MapScope, "map scope" {
        Repo => "repo",
        Dir => "dir",
        File => "file",
        Symbol => "symbol",
    }
}

string_enum! {
    /// Edge families included in a dependency map.
    MapType, "map type" {
        Combined => "combined",
        Imports => "imports",
        Calls => "calls",
        Usages => "usages",
        Dataflow => "dataflow",
    }
}

string_enum! {
    MapFormat, "map format" {
        HtmlIso => "html-iso",
        Html => "html",
        Svg => "svg",
        Dot => "dot",
        Json => "json",
    }
}

impl SearchMode {
    /// Mode flag to pass to the tool, `None` for the implicit default.
    pub fn as_flag(self) -> Option<&'static str> {
        match self {
            SearchMode::Both => None,
            other => Some(other.as_str()),
        }
    }
}

impl MapType {
    /// Value of the tool's `--include` flag.
    pub fn include(self) -> &'static str {
        match self {
            MapType::Combined => "imports,calls,usages,dataflow",
            MapType::Imports => "imports",
            MapType::Calls => "calls",
            MapType::Usages => "usages",
            MapType::Dataflow => "dataflow",
        }
    }
}

impl MapFormat {
    pub fn extension(self) -> &'static str {
        match self {
            MapFormat::HtmlIso => "iso.html",
            MapFormat::Html => "html",
            MapFormat::Svg => "svg",
            MapFormat::Dot => "dot",
            MapFormat::Json => "json",
        }
    }

    /// Viewer formats are opened in a browser rather than an editor tab.
    pub fn opens_in_browser(self) -> bool {
        matches!(self, MapFormat::HtmlIso | MapFormat::Html | MapFormat::Svg)
    }

    /// Formats the HTTP API path downloads to disk; the rest are served by URL.
    pub fn is_downloaded(self) -> bool {
        matches!(self, MapFormat::Json | MapFormat::Dot)
    }
}

impl Default for IndexMode {
    fn default() -> Self {
        IndexMode::All
    }
}

impl Default for SearchMode {
    fn default() -> Self {
        SearchMode::Both
    }
}

impl Default for MapType {
    fn default() -> Self {
        MapType::Combined
    }
}

impl Default for MapFormat {
    fn default() -> Self {
        MapFormat::HtmlIso
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parsing_is_case_insensitive_and_trimmed() {
        assert_eq!(" Code ".parse::<IndexMode>().unwrap(), IndexMode::Code);
        assert_eq!("SQLITE-FTS".parse::<SearchBackend>().unwrap(), SearchBackend::SqliteFts);
        assert_eq!("html-iso".parse::<MapFormat>().unwrap(), MapFormat::HtmlIso);
    }

    #[test]
    fn unknown_value_lists_expected_choices() {
        let err = "everything".parse::<IndexMode>().unwrap_err();
        assert_eq!(
            err.to_string(),
            "unknown index mode 'everything' (expected one of: code, prose, all)"
        );
    }

    #[test]
    fn both_mode_is_implicit() {
        assert_eq!(SearchMode::Both.as_flag(), None);
        assert_eq!(SearchMode::Prose.as_flag(), Some("prose"));
    }

    #[test]
    fn combined_map_includes_every_edge_family() {
        assert_eq!(MapType::Combined.include(), "imports,calls,usages,dataflow");
        assert_eq!(MapType::Calls.include(), "calls");
    }

    #[test]
    fn serde_uses_tool_spelling() {
        let json = serde_json::to_string(&MapFormat::HtmlIso).unwrap();
        assert_eq!(json, "\"html-iso\"");
        let back: SearchBackend = serde_json::from_str("\"sqlite-fts\"").unwrap();
        assert_eq!(back, SearchBackend::SqliteFts);
    }
}
