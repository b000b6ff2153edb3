//! Harvest results: the per-implementation run records and their renderings.

use std::fmt::Write as _;
use std::fs;
use std::io;
use std::path::Path;

use indexmap::IndexMap;
use scan_errors::{usage, ErrorCode};
use serde::{Deserialize, Serialize};
use serde_json::ser::Formatter;
use serde_json::{Map, Serializer, Value};

use crate::errors::Result;
use crate::probe::TRAILER_KEY;

/// Captured output of a probe run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RunOutput {
    Document(Map<String, Value>),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub version: String,
    pub out: Option<RunOutput>,
    pub ret: i32,
}

impl RunRecord {
    pub fn new(version: impl Into<String>, out: Option<String>, ret: i32) -> Self {
        Self {
            version: version.into(),
            out: out.map(RunOutput::Text),
            ret,
        }
    }
}

/// Results of a scan keyed by implementation name, in scan order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Harvest {
    runs: IndexMap<String, Vec<RunRecord>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Json,
    #[value(name = "md")]
    Markdown,
}

impl Harvest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, implementation: impl Into<String>, records: Vec<RunRecord>) {
        self.runs.insert(implementation.into(), records);
    }

    pub fn get(&self, implementation: &str) -> Option<&[RunRecord]> {
        self.runs.get(implementation).map(Vec::as_slice)
    }

    pub fn implementations(&self) -> impl Iterator<Item = &str> {
        self.runs.keys().map(String::as_str)
    }

    /// Load a results file written by a previous scan.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|err| {
            usage!(ErrorCode::ResultsFileInvalid, "cannot read results file")
                .with_context("path", path.display().to_string())
                .with_context("io", err.to_string())
        })?;
        Self::from_json_str(&text).map_err(|err| err.with_context("path", path.display().to_string()))
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|err| {
            usage!(ErrorCode::ResultsFileInvalid, "results file is not a harvest document")
                .with_context("detail", err.to_string())
                .with_source(err)
        })
    }

    /// Drop runs without output and parse textual outputs holding a JSON object.
    pub fn unfold(&mut self) {
        for records in self.runs.values_mut() {
            records.retain(|record| match &record.out {
                None => false,
                Some(RunOutput::Text(text)) => !text.is_empty(),
                Some(RunOutput::Document(_)) => true,
            });
            for record in records.iter_mut() {
                if let Some(RunOutput::Text(text)) = &record.out {
                    if let Ok(document) = serde_json::from_str::<Map<String, Value>>(text) {
                        record.out = Some(RunOutput::Document(document));
                    }
                }
            }
        }
    }

    pub fn render(&self, format: OutputFormat) -> Result<String> {
        match format {
            OutputFormat::Json => self.to_json(),
            OutputFormat::Markdown => Ok(self.to_markdown()),
        }
    }

    /// Single-line JSON with `", "` and `": "` separators, the layout earlier
    /// results files were written in.
    pub fn to_json(&self) -> Result<String> {
        let mut bytes = Vec::new();
        self.serialize(&mut Serializer::with_formatter(&mut bytes, SpacedFormatter))
            .map_err(|err| {
                scan_errors::bug!(ErrorCode::Unknown, "failed to serialise harvest")
                    .with_source(err)
            })?;
        String::from_utf8(bytes).map_err(|err| {
            scan_errors::bug!(ErrorCode::Unknown, "serialised harvest is not UTF-8")
                .with_source(err)
        })
    }

    pub fn to_markdown(&self) -> String {
        let mut text = String::new();
        for (implementation, records) in &self.runs {
            let _ = write!(text, "# {implementation}\n\n");
            for record in records {
                let _ = write!(text, "## {}\n\n", record.version);
                match &record.out {
                    Some(RunOutput::Text(output)) => {
                        let _ = write!(text, "```\n{output}\n```\n");
                    }
                    Some(RunOutput::Document(document)) => {
                        text.push_str(&markdown_list(document));
                        text.push_str("\n\n");
                    }
                    None => {}
                }
            }
        }
        text
    }
}

struct SpacedFormatter;

impl Formatter for SpacedFormatter {
    fn begin_array_value<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(b": ")
    }
}

fn markdown_list(document: &Map<String, Value>) -> String {
    document
        .iter()
        .filter(|(key, _)| key.as_str() != TRAILER_KEY)
        .map(|(key, value)| match value {
            Value::String(raw) => format!("* {key} = {raw}"),
            other => format!("* {key} = {other}"),
        })
        .collect::<Vec<_>>()
        .join("\n")
}
