//! Output Formatting and Display Functions
//!
//! Progress spinners and result tables for the autotemplate binary.

use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;
use std::time::Duration;
use tabled::{settings::Style as TableStyle, Table, Tabled};

use autotemplate_rs::api::engine::Offer;
use autotemplate_rs::core::aggregation::BuildSummary;
use autotemplate_rs::core::pipeline::{AnalysisSummary, ProgressSink};
use autotemplate_rs::io::cache::AutoTemplate;

/// Spinner rendering pipeline progress
pub struct SpinnerProgress {
    bar: ProgressBar,
}

impl SpinnerProgress {
    /// Visible spinner, or a hidden one when `quiet`
    pub fn new(quiet: bool) -> anyhow::Result<Self> {
        let bar = if quiet {
            ProgressBar::hidden()
        } else {
            ProgressBar::new_spinner()
        };
        bar.set_style(ProgressStyle::with_template(
            "{spinner:.blue} {prefix:.bold} {msg}",
        )?);
        bar.enable_steady_tick(Duration::from_millis(100));
        Ok(Self { bar })
    }

    /// Stop the spinner with a final message
    pub fn finish(&self, message: &str) {
        self.bar.set_prefix("");
        self.bar.finish_with_message(message.to_string());
    }
}

impl ProgressSink for SpinnerProgress {
    fn set_task(&self, task: &str) {
        self.bar.set_prefix(task.to_string());
        self.bar.set_message("");
    }

    fn set_text(&self, text: &str) {
        self.bar.set_message(text.to_string());
    }
}

#[derive(Tabled)]
struct StatsRow {
    metric: String,
    value: String,
}

/// Summary of a mining run followed by a build
pub fn display_run_summary(analysis: Option<&AnalysisSummary>, build: &BuildSummary) {
    let mut rows = Vec::new();
    if let Some(analysis) = analysis {
        rows.push(StatsRow {
            metric: "Files analyzed".to_string(),
            value: analysis.files_analyzed.to_string(),
        });
        if analysis.files_failed > 0 {
            rows.push(StatsRow {
                metric: "Files skipped".to_string(),
                value: analysis.files_failed.yellow().to_string(),
            });
        }
        if analysis.observations_retained > 0 {
            rows.push(StatsRow {
                metric: "Observations kept".to_string(),
                value: analysis.observations_retained.to_string(),
            });
        }
        rows.push(StatsRow {
            metric: "Observations written".to_string(),
            value: analysis.observations_written.to_string(),
        });
    }
    rows.push(StatsRow {
        metric: "Corpus files".to_string(),
        value: build.data_files.to_string(),
    });
    rows.push(StatsRow {
        metric: "Suggestions published".to_string(),
        value: build.published.bright_green().to_string(),
    });

    let mut table = Table::new(rows);
    table.with(TableStyle::rounded());
    println!("{}", table);
}

#[derive(Tabled)]
struct TemplateRow {
    key: String,
    template: String,
    count: usize,
    #[tabled(rename = "%")]
    percentage: usize,
}

/// Published suggestions as a table
pub fn display_templates(templates: &[AutoTemplate]) {
    if templates.is_empty() {
        println!("{}", "No suggestions published yet".dimmed());
        return;
    }
    let rows: Vec<TemplateRow> = templates
        .iter()
        .map(|t| TemplateRow {
            key: t.key.clone(),
            template: t.template.clone(),
            count: t.count,
            percentage: t.percentage,
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(TableStyle::rounded());
    println!("{}", table);
}

#[derive(Tabled)]
struct OfferRow {
    #[tabled(rename = "#")]
    index: usize,
    offer: String,
    count: usize,
    #[tabled(rename = "%")]
    percentage: usize,
}

/// Offers at a statement as a numbered table
pub fn display_offers(offers: &[Offer]) {
    if offers.is_empty() {
        println!("{}", "No suggestions for this statement".dimmed());
        return;
    }
    let rows: Vec<OfferRow> = offers
        .iter()
        .enumerate()
        .map(|(index, offer)| OfferRow {
            index,
            offer: offer.label.clone(),
            count: offer.template.count,
            percentage: offer.template.percentage,
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(TableStyle::rounded());
    println!("{}", table);
}
