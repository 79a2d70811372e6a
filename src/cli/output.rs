//! Output formatting for CLI commands
//!
//! Reports and inventories render as a plain text table, JSON or YAML.

use std::io::IsTerminal;

use anyhow::{Context, Result};
use clap::ValueEnum;
use owo_colors::OwoColorize;
use serde::Serialize;

use crate::inventory::InstanceRecord;
use crate::provisioning::{ReportEntry, RunReport};

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
    Yaml,
}

/// Print data as JSON
pub fn print_json<T: Serialize>(data: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(data).context("Failed to serialize to JSON")?;
    println!("{}", json);
    Ok(())
}

/// Print data as YAML
pub fn print_yaml<T: Serialize>(data: &T) -> Result<()> {
    let yaml = serde_yaml::to_string(data).context("Failed to serialize to YAML")?;
    println!("{}", yaml);
    Ok(())
}

/// Truncate string to maximum length with ellipsis
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

fn table_header(columns: &[(&str, usize)]) -> String {
    let mut header = String::new();
    for (name, width) in columns {
        header.push_str(&format!("{:<width$} ", name, width = width));
    }
    let total_width: usize = columns.iter().map(|(_, w)| w + 1).sum();
    format!("{}\n{}\n", header.trim_end(), "-".repeat(total_width.saturating_sub(1)))
}

const REPORT_COLUMNS: [(&str, usize); 4] =
    [("INSTANCE", 32), ("DECISION", 18), ("PROBE", 22), ("RESULT", 0)];

fn entry_result(entry: &ReportEntry) -> String {
    match (&entry.error, &entry.secret) {
        (Some(error), _) => format!("error: {}", error),
        (None, Some(secret)) => {
            format!("secret {} ({})", variant_label(&secret.action), secret.version_id)
        }
        (None, None) => "ok".to_string(),
    }
}

fn variant_label<T: Serialize>(value: &T) -> String {
    serde_json::to_value(value)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default()
}

/// Render a run report as a text table with a summary line.
pub fn render_report_text(report: &RunReport, color: bool) -> String {
    let mut out = table_header(&REPORT_COLUMNS);

    for entry in report.entries() {
        let probe = entry.probe.as_ref().map(|p| p.as_str()).unwrap_or("-");
        let result = entry_result(entry);
        let result = match (color, entry.is_errored()) {
            (false, _) => result,
            (true, true) => result.red().to_string(),
            (true, false) if entry.decision.is_apply() => result.green().to_string(),
            (true, false) => result,
        };
        out.push_str(&format!(
            "{:<32} {:<18} {:<22} {}\n",
            truncate(&entry.instance, 32),
            entry.decision.as_str(),
            probe,
            result
        ));
    }

    let summary = report.summary();
    out.push_str(&format!(
        "\nmode={} total={} skipped={} unchanged={} created={} updated={} errored={}\n",
        report.mode(),
        summary.total,
        summary.skipped,
        summary.unchanged,
        summary.created,
        summary.updated,
        summary.errored
    ));
    out
}

/// Colors are for terminals only; `NO_COLOR` turns them off there too.
fn use_color(is_terminal: bool, no_color: Option<std::ffi::OsString>) -> bool {
    is_terminal && !no_color.is_some_and(|value| !value.is_empty())
}

/// Print a run report in the requested format
pub fn print_report(report: &RunReport, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => print_json(&report.document()),
        OutputFormat::Yaml => print_yaml(&report.document()),
        OutputFormat::Text => {
            let color = use_color(std::io::stdout().is_terminal(), std::env::var_os("NO_COLOR"));
            print!("{}", render_report_text(report, color));
            Ok(())
        }
    }
}

#[derive(Debug, Serialize)]
struct InventoryRow<'a> {
    #[serde(flatten)]
    instance: &'a InstanceRecord,
    role: &'static str,
}

fn role(instance: &InstanceRecord) -> &'static str {
    if instance.is_replica() {
        "replica"
    } else {
        "primary"
    }
}

/// Render discovered instances as a text table.
pub fn render_inventory_text(instances: &[InstanceRecord]) -> String {
    let mut out = table_header(&[("INSTANCE", 32), ("ROLE", 8), ("ENGINE", 18), ("ENDPOINT", 0)]);
    for instance in instances {
        let endpoint = match &instance.source_instance {
            Some(source) if instance.is_replica() => format!("{} (source: {})", instance.endpoint, source),
            _ => instance.endpoint.to_string(),
        };
        out.push_str(&format!(
            "{:<32} {:<8} {:<18} {}\n",
            truncate(&instance.identifier, 32),
            role(instance),
            instance.engine,
            endpoint
        ));
    }
    out
}

/// Print discovered instances in the requested format
pub fn print_inventory(instances: &[InstanceRecord], format: OutputFormat) -> Result<()> {
    let rows: Vec<InventoryRow<'_>> =
        instances.iter().map(|instance| InventoryRow { instance, role: role(instance) }).collect();
    match format {
        OutputFormat::Json => print_json(&rows),
        OutputFormat::Yaml => print_yaml(&rows),
        OutputFormat::Text => {
            print!("{}", render_inventory_text(instances));
            Ok(())
        }
    }
}
