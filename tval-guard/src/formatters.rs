//! Text renderings of a [`RunReport`].
//!
//! Three formatters share one trait: JSON for machines, a console summary
//! for people, and Markdown for pasting into documentation or reviews.
//!
//! # Examples
//!
//! ```rust,no_run
//! use tval_guard::formatters::{HumanFormatter, ReportFormatter};
//! # fn show(report: &tval_guard::report::RunReport) -> tval_guard::Result<()> {
//! let output = HumanFormatter::new().format(report)?;
//! println!("{output}");
//! # Ok(())
//! # }
//! ```

use crate::core::{CheckResult, CheckStatus, ExportStatus, TableStatus};
use crate::report::{RunReport, TableReport};
use crate::{Result, TvalError};
use std::fmt::Write;

/// Options shared by all formatters.
#[derive(Debug, Clone)]
pub struct FormatterConfig {
    /// Show OK checks, not just problems
    pub include_passed: bool,
    /// Show the SQL of each listed check
    pub include_queries: bool,
    /// Show column profiles
    pub include_profiles: bool,
    /// Maximum number of load failures listed per table (-1 for all)
    pub max_failures: i32,
    /// Whether to use ANSI colors (human formatter)
    pub use_colors: bool,
    pub include_timestamps: bool,
}

impl Default for FormatterConfig {
    fn default() -> Self {
        Self {
            include_passed: false,
            include_queries: false,
            include_profiles: true,
            max_failures: -1,
            use_colors: true,
            include_timestamps: true,
        }
    }
}

impl FormatterConfig {
    /// Summary lines only.
    pub fn minimal() -> Self {
        Self {
            include_passed: false,
            include_queries: false,
            include_profiles: false,
            max_failures: 0,
            use_colors: false,
            include_timestamps: false,
        }
    }

    /// Everything, including passing checks and their queries.
    pub fn detailed() -> Self {
        Self {
            include_passed: true,
            include_queries: true,
            include_profiles: true,
            max_failures: -1,
            use_colors: true,
            include_timestamps: true,
        }
    }

    /// Plain output with bounded failure lists.
    pub fn ci() -> Self {
        Self {
            include_passed: false,
            include_queries: true,
            include_profiles: false,
            max_failures: 20,
            use_colors: false,
            include_timestamps: true,
        }
    }

    pub fn with_passed(mut self, include: bool) -> Self {
        self.include_passed = include;
        self
    }

    pub fn with_queries(mut self, include: bool) -> Self {
        self.include_queries = include;
        self
    }

    pub fn with_max_failures(mut self, max: i32) -> Self {
        self.max_failures = max;
        self
    }

    pub fn with_colors(mut self, use_colors: bool) -> Self {
        self.use_colors = use_colors;
        self
    }

    fn failure_limit(&self, total: usize) -> usize {
        if self.max_failures < 0 {
            total
        } else {
            total.min(self.max_failures as usize)
        }
    }

    fn shows(&self, result: &CheckResult) -> bool {
        self.include_passed || !result.status.is_ok()
    }
}

/// Renders a run report as text.
pub trait ReportFormatter {
    fn format(&self, report: &RunReport) -> Result<String>;

    /// Renders with explicit options. The default ignores them.
    fn format_with_config(&self, report: &RunReport, _config: &FormatterConfig) -> Result<String> {
        self.format(report)
    }
}

fn render_error(e: std::fmt::Error) -> TvalError {
    TvalError::Internal(format!("Failed to render report: {e}"))
}

/// Serialises the report as JSON.
#[derive(Debug, Clone)]
pub struct JsonFormatter {
    pretty: bool,
}

impl JsonFormatter {
    pub fn new() -> Self {
        Self { pretty: true }
    }

    pub fn with_pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }
}

impl Default for JsonFormatter {
    fn default() -> Self {
        Self::new()
    }
}

impl ReportFormatter for JsonFormatter {
    fn format(&self, report: &RunReport) -> Result<String> {
        let json = if self.pretty {
            serde_json::to_string_pretty(report)?
        } else {
            serde_json::to_string(report)?
        };
        Ok(json)
    }
}

/// Console summary of a run.
#[derive(Debug, Clone, Default)]
pub struct HumanFormatter {
    config: FormatterConfig,
}

impl HumanFormatter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: FormatterConfig) -> Self {
        Self { config }
    }

    fn paint(&self, config: &FormatterConfig, text: &str, color: &str) -> String {
        if config.use_colors {
            format!("\x1b[{color}m{text}\x1b[0m")
        } else {
            text.to_string()
        }
    }

    fn status_label(&self, config: &FormatterConfig, status: CheckStatus) -> String {
        let color = match status {
            CheckStatus::Ok => "32",
            CheckStatus::Ng | CheckStatus::Error => "31",
            CheckStatus::Skipped => "33",
        };
        self.paint(config, status.as_str(), color)
    }

    fn render(
        &self,
        report: &RunReport,
        config: &FormatterConfig,
        out: &mut String,
    ) -> std::fmt::Result {
        writeln!(out)?;
        if report.passed() {
            writeln!(out, "✅ {}", self.paint(config, "Validation PASSED", "32"))?;
        } else {
            writeln!(out, "❌ {}", self.paint(config, "Validation FAILED", "31"))?;
        }
        if config.include_timestamps {
            writeln!(out, "Executed at: {}", report.executed_at.to_rfc3339())?;
        }

        let s = &report.summary;
        writeln!(out)?;
        writeln!(out, "📊 Summary:")?;
        writeln!(out, "   Tables: {} (OK: {}, NG: {})", s.tables_total, s.tables_ok, s.tables_ng)?;
        writeln!(
            out,
            "   Relation checks: {} (OK: {}, NG: {}, SKIPPED: {})",
            s.relation_checks_total,
            s.relation_checks_ok,
            s.relation_checks_ng,
            s.relation_checks_skipped
        )?;

        for table in &report.tables {
            self.render_table(table, config, out)?;
        }

        let shown: Vec<&CheckResult> = report
            .relation_checks
            .iter()
            .filter(|r| config.shows(r))
            .collect();
        if !shown.is_empty() {
            writeln!(out)?;
            writeln!(out, "🔗 Relations:")?;
            for result in shown {
                self.render_check(result, config, out)?;
            }
        }

        if report.export_requested {
            writeln!(out)?;
            writeln!(out, "📦 Export:")?;
            for table in &report.tables {
                if let Some(export) = &table.export {
                    let label = match export.status {
                        ExportStatus::Ok => self.paint(config, "OK", "32"),
                        ExportStatus::Skipped => self.paint(config, "SKIPPED", "33"),
                        ExportStatus::Error => self.paint(config, "ERROR", "31"),
                    };
                    write!(out, "   [{label}] {}", export.table)?;
                    if let Some(path) = &export.output_path {
                        write!(out, " -> {}", path.display())?;
                    }
                    if let Some(message) = &export.message {
                        write!(out, " ({message})")?;
                    }
                    writeln!(out)?;
                }
            }
        }
        writeln!(out)
    }

    fn render_table(
        &self,
        table: &TableReport,
        config: &FormatterConfig,
        out: &mut String,
    ) -> std::fmt::Result {
        let status = match table.status {
            TableStatus::Ok => self.paint(config, "OK", "32"),
            TableStatus::Ng => self.paint(config, "NG", "31"),
        };
        writeln!(out)?;
        writeln!(
            out,
            "📋 {} [{status}] files: {}, rows: {}",
            table.table,
            table.load.files_loaded.len(),
            table.load.rows_loaded
        )?;

        let failures = &table.load.failures;
        let limit = config.failure_limit(failures.len());
        for failure in &failures[..limit] {
            write!(out, "   🚨 {:?} in {}", failure.kind, failure.file_path)?;
            if let Some(column) = &failure.column {
                write!(out, " column {column}")?;
            }
            if let Some(row) = failure.row {
                write!(out, " row {row}")?;
            }
            writeln!(out)?;
            writeln!(out, "      {}", failure.raw_message)?;
        }
        if failures.len() > limit {
            writeln!(out, "   ... and {} more load failures", failures.len() - limit)?;
        }

        for result in table.all_checks().filter(|r| config.shows(r)) {
            self.render_check(result, config, out)?;
        }

        if config.include_profiles && !table.profiles.is_empty() {
            writeln!(out, "   📈 Profile:")?;
            for p in &table.profiles {
                write!(
                    out,
                    "      {}: count {}, nulls {}, distinct {}",
                    p.column,
                    p.count,
                    p.null_count(),
                    p.distinct_count
                )?;
                if let (Some(min), Some(max), Some(mean)) = (p.min, p.max, p.mean) {
                    write!(out, ", min {min}, max {max}, mean {mean:.3}")?;
                }
                writeln!(out)?;
            }
        }
        Ok(())
    }

    fn render_check(
        &self,
        result: &CheckResult,
        config: &FormatterConfig,
        out: &mut String,
    ) -> std::fmt::Result {
        write!(out, "   [{}] {}", self.status_label(config, result.status), result.description)?;
        if let Some(message) = &result.message {
            write!(out, ": {message}")?;
        }
        writeln!(out)?;
        if config.include_queries {
            writeln!(out, "      {}", result.query)?;
        }
        Ok(())
    }
}

impl ReportFormatter for HumanFormatter {
    fn format(&self, report: &RunReport) -> Result<String> {
        self.format_with_config(report, &self.config)
    }

    fn format_with_config(&self, report: &RunReport, config: &FormatterConfig) -> Result<String> {
        let mut out = String::new();
        self.render(report, config, &mut out).map_err(render_error)?;
        Ok(out)
    }
}

/// Markdown rendering with one table per section.
#[derive(Debug, Clone)]
pub struct MarkdownFormatter {
    config: FormatterConfig,
    heading_level: u8,
}

impl MarkdownFormatter {
    pub fn new() -> Self {
        Self {
            config: FormatterConfig::default(),
            heading_level: 2,
        }
    }

    pub fn with_config(config: FormatterConfig) -> Self {
        Self {
            config,
            heading_level: 2,
        }
    }

    pub fn with_heading_level(mut self, level: u8) -> Self {
        self.heading_level = level.clamp(1, 5);
        self
    }

    fn check_rows(
        &self,
        results: &[&CheckResult],
        config: &FormatterConfig,
        out: &mut String,
    ) -> std::fmt::Result {
        writeln!(out, "| Status | Check | Result | Message |")?;
        writeln!(out, "|--------|-------|--------|---------|")?;
        for r in results {
            let count = r.result_count.map(|c| c.to_string()).unwrap_or_default();
            let message = r.message.as_deref().unwrap_or("").replace('|', "\\|");
            writeln!(out, "| {} | {} | {count} | {message} |", r.status, r.description)?;
            if config.include_queries {
                writeln!(out, "| | `{}` | | |", r.query.replace('|', "\\|"))?;
            }
        }
        Ok(())
    }

    fn render(
        &self,
        report: &RunReport,
        config: &FormatterConfig,
        out: &mut String,
    ) -> std::fmt::Result {
        let h = "#".repeat(self.heading_level as usize);
        if report.passed() {
            writeln!(out, "{h} ✅ Validation Report - PASSED")?;
        } else {
            writeln!(out, "{h} ❌ Validation Report - FAILED")?;
        }
        writeln!(out)?;
        if config.include_timestamps {
            writeln!(out, "**Executed at:** {}", report.executed_at.to_rfc3339())?;
            writeln!(out)?;
        }

        let s = &report.summary;
        writeln!(out, "{h}# Summary")?;
        writeln!(out)?;
        writeln!(out, "| Metric | Value |")?;
        writeln!(out, "|--------|-------|")?;
        writeln!(out, "| Tables | {} |", s.tables_total)?;
        writeln!(out, "| Tables OK | {} |", s.tables_ok)?;
        writeln!(out, "| Tables NG | {} |", s.tables_ng)?;
        writeln!(out, "| Relation checks OK | {} |", s.relation_checks_ok)?;
        writeln!(out, "| Relation checks NG | {} |", s.relation_checks_ng)?;
        writeln!(out, "| Relation checks SKIPPED | {} |", s.relation_checks_skipped)?;
        writeln!(
            out,
            "| Export allowed | {} |",
            if report.export_decision.export_allowed { "yes" } else { "no" }
        )?;

        for table in &report.tables {
            writeln!(out)?;
            writeln!(out, "{h}# {} ({})", table.table, table.status)?;
            writeln!(out)?;
            let failures = &table.load.failures;
            let limit = config.failure_limit(failures.len());
            for failure in &failures[..limit] {
                writeln!(
                    out,
                    "- **{:?}** `{}`: {}",
                    failure.kind, failure.file_path, failure.raw_message
                )?;
            }
            if failures.len() > limit {
                writeln!(out, "> **Note:** {} additional load failures not shown.", failures.len() - limit)?;
            }
            if limit > 0 {
                writeln!(out)?;
            }
            let shown: Vec<&CheckResult> = table.all_checks().filter(|r| config.shows(r)).collect();
            if !shown.is_empty() {
                self.check_rows(&shown, config, out)?;
            }
        }

        let shown: Vec<&CheckResult> = report
            .relation_checks
            .iter()
            .filter(|r| config.shows(r))
            .collect();
        if !shown.is_empty() {
            writeln!(out)?;
            writeln!(out, "{h}# Relations")?;
            writeln!(out)?;
            self.check_rows(&shown, config, out)?;
        }
        Ok(())
    }
}

impl Default for MarkdownFormatter {
    fn default() -> Self {
        Self::new()
    }
}

impl ReportFormatter for MarkdownFormatter {
    fn format(&self, report: &RunReport) -> Result<String> {
        self.format_with_config(report, &self.config)
    }

    fn format_with_config(&self, report: &RunReport, config: &FormatterConfig) -> Result<String> {
        let mut out = String::new();
        self.render(report, config, &mut out).map_err(render_error)?;
        Ok(out)
    }
}
