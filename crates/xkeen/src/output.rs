//! Output formatting for `--output table|json|json-compact|yaml|plain`.
//!
//! Handlers describe a value twice: how a person reads it (table or
//! detail text) and its one-line identifier for scripts. Structured
//! formats serialize the value itself.

use std::io::{self, IsTerminal, Write};

use owo_colors::OwoColorize;
use serde::Serialize;
use tabled::{Table, Tabled, settings::Style};

use crate::cli::{ColorMode, GlobalOpts, OutputFormat};

/// Stdout printer configured from the global flags.
#[derive(Debug, Clone)]
pub struct Output {
    pub format: OutputFormat,
    pub color: bool,
    quiet: bool,
}

impl Output {
    pub fn new(global: &GlobalOpts) -> Self {
        Self {
            format: global.output,
            color: use_color(global.color),
            quiet: global.quiet,
        }
    }

    /// Print a collection: a rounded table of `to_row`, or one `id` per
    /// line in plain mode.
    pub fn list<T, R>(&self, data: &[T], to_row: impl Fn(&T) -> R, id: impl Fn(&T) -> String)
    where
        T: Serialize,
        R: Tabled,
    {
        let text = match self.format {
            OutputFormat::Table => Table::new(data.iter().map(to_row)).with(Style::rounded()).to_string(),
            OutputFormat::Plain => data.iter().map(id).collect::<Vec<_>>().join("\n"),
            structured => serialize(structured, data),
        };
        self.emit(&text);
    }

    /// Print one value: `detail` for tables, `id` for plain mode.
    pub fn single<T: Serialize + ?Sized>(
        &self,
        data: &T,
        detail: impl FnOnce(&T) -> String,
        id: impl FnOnce(&T) -> String,
    ) {
        let text = match self.format {
            OutputFormat::Table => detail(data),
            OutputFormat::Plain => id(data),
            structured => serialize(structured, data),
        };
        self.emit(&text);
    }

    /// Whether values should be printed as JSON or YAML documents.
    pub fn is_structured(&self) -> bool {
        !matches!(self.format, OutputFormat::Table | OutputFormat::Plain)
    }

    /// Print already formatted text.
    pub fn emit(&self, text: &str) {
        if self.quiet || text.is_empty() {
            return;
        }
        let mut stdout = io::stdout().lock();
        let _ = writeln!(stdout, "{text}");
    }

    /// `yes` in green or `no` in red.
    pub fn flag(&self, value: bool, yes: &str, no: &str) -> String {
        match (value, self.color) {
            (true, true) => yes.green().to_string(),
            (false, true) => no.red().to_string(),
            (true, false) => yes.to_owned(),
            (false, false) => no.to_owned(),
        }
    }

    pub fn dim(&self, text: &str) -> String {
        if self.color { text.dimmed().to_string() } else { text.to_owned() }
    }
}

fn use_color(mode: ColorMode) -> bool {
    match mode {
        ColorMode::Always => true,
        ColorMode::Never => false,
        ColorMode::Auto => io::stdout().is_terminal() && std::env::var_os("NO_COLOR").is_none(),
    }
}

fn serialize<T: Serialize + ?Sized>(format: OutputFormat, data: &T) -> String {
    let rendered = match format {
        OutputFormat::JsonCompact => serde_json::to_string(data).map_err(|e| e.to_string()),
        OutputFormat::Yaml => serde_yaml::to_string(data).map_err(|e| e.to_string()),
        _ => serde_json::to_string_pretty(data).map_err(|e| e.to_string()),
    };
    rendered.unwrap_or_else(|e| format!("error: serialization failed: {e}"))
}

/// `key  value` lines with the keys right-aligned to one column.
pub fn detail_lines(pairs: &[(&str, String)]) -> String {
    let width = pairs.iter().map(|(k, _)| k.len()).max().unwrap_or(0);
    pairs
        .iter()
        .map(|(k, v)| format!("{k:>width$}  {v}"))
        .collect::<Vec<_>>()
        .join("\n")
}
