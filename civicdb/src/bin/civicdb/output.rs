use anyhow::Result;
use clap::ValueEnum;
use colored::Colorize;
use comfy_table::{Attribute, Cell, Color as TableColor, Table};
use serde::Serialize;

use crate::theme::{ICONS, THEME};

/// Output format options for CLI commands
#[derive(Clone, Debug, ValueEnum, Default, PartialEq)]
pub enum OutputFormat {
    /// Formatted table output (default)
    #[default]
    Table,
    /// JSON output for scripting
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct GlobalOptions {
    pub output_format: OutputFormat,
    pub quiet: bool,
    pub no_color: bool,
}

/// Data that can be rendered as a table.
pub trait TableDisplay {
    fn to_table(&self) -> Table;
}

pub struct OutputManager {
    pub options: GlobalOptions,
}

impl OutputManager {
    pub fn new(options: GlobalOptions) -> Self {
        if options.no_color {
            colored::control::set_override(false);
        }
        Self { options }
    }

    pub fn display<T>(&self, data: &T) -> Result<()>
    where
        T: Serialize + TableDisplay,
    {
        if self.options.quiet {
            return Ok(());
        }
        match self.options.output_format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(data)?),
            OutputFormat::Table => println!("{}", data.to_table()),
        }
        Ok(())
    }

    pub fn success(&self, message: &str) {
        if !self.options.quiet {
            println!("{} {}", ICONS.success.color(THEME.success), message.color(THEME.success));
        }
    }

    pub fn warning(&self, message: &str) {
        if !self.options.quiet {
            println!("{} {}", ICONS.warning.color(THEME.warning), message.color(THEME.warning));
        }
    }

    pub fn error(&self, message: &str) {
        eprintln!("{} {}", ICONS.error.color(THEME.error), message.color(THEME.error));
    }

    pub fn key_value(&self, key: &str, value: &str) {
        if !self.options.quiet {
            println!("{} {}", format!("{key}:").color(THEME.key).bold(), value.color(THEME.value));
        }
    }
}

/// Table with bold cyan headers, the look shared by every command.
pub fn styled_table(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table.set_header(
        headers
            .iter()
            .map(|header| Cell::new(header).add_attribute(Attribute::Bold).fg(TableColor::Cyan)),
    );
    table
}
