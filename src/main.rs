use alfa_funnel::config::AnalysisConfig;
use alfa_funnel::dataset::{CanonicalColumn, LevelDataset};
use alfa_funnel::ingestion::{ingest, normalize_columns, parse_csv, validate_level_data};
use alfa_funnel::metrics::{
    active_gauge_blocks, average, extract_series, format_cell, gauge_label, gauge_value, peak,
    MetricTab,
};
use alfa_funnel::prompt::FocusMode;
use alfa_funnel::service::{FunnelAnalyzer, Session};
use alfa_funnel::template::{
    resolve_template, FileTemplateSource, HttpTemplateSource, TemplateSource,
};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

const GAUGE_BLOCKS: usize = 20;

#[derive(Parser)]
#[command(name = "alfa-funnel")]
#[command(about = "Level funnel analysis for puzzle game level data")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a level CSV and print the dashboard metrics
    Inspect {
        /// Level data CSV file
        csv_file: PathBuf,

        /// Metric to chart per level (arpu, churn, far, success_rate, aps, users)
        #[arg(long, default_value = "arpu", value_parser = parse_tab)]
        tab: MetricTab,

        /// Print the normalized dataset as JSON instead
        #[arg(long)]
        json: bool,
    },
    /// Print the prompt that would be sent for analysis
    Prompt {
        csv_file: PathBuf,

        #[arg(short, long, value_enum, default_value_t = FocusMode::Balanced)]
        focus: FocusMode,

        /// Local template file (defaults to PROMPT_TEMPLATE_URL, then the bundled template)
        #[arg(long)]
        template_file: Option<PathBuf>,
    },
    /// Run an AI funnel analysis of a level CSV
    Analyze {
        csv_file: PathBuf,

        #[arg(short, long, value_enum, default_value_t = FocusMode::Balanced)]
        focus: FocusMode,

        /// Gemini API key (or set GEMINI_API_KEY env var)
        #[arg(long)]
        api_key: Option<String>,

        /// Model name (or set GEMINI_MODEL env var)
        #[arg(long)]
        model: Option<String>,

        /// Prompt template URL (or set PROMPT_TEMPLATE_URL env var)
        #[arg(long)]
        template_url: Option<String>,

        /// Local template file, takes precedence over the URL
        #[arg(long)]
        template_file: Option<PathBuf>,

        /// Overall analysis timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Print the raw generated text only
        #[arg(long)]
        raw: bool,

        /// Print the analysis run as JSON
        #[arg(long)]
        json: bool,
    },
    /// Write the normalized dataset back out as CSV
    Export {
        csv_file: PathBuf,

        #[arg(short, long)]
        output: PathBuf,
    },
}

fn parse_tab(value: &str) -> std::result::Result<MetricTab, String> {
    MetricTab::from_key(value).ok_or_else(|| {
        format!(
            "unknown metric tab '{}', expected one of: {}",
            value,
            MetricTab::ALL.iter().map(|t| t.key()).collect::<Vec<_>>().join(", ")
        )
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    match args.command {
        Commands::Inspect { csv_file, tab, json } => inspect(&csv_file, tab, json),
        Commands::Prompt {
            csv_file,
            focus,
            template_file,
        } => print_prompt(&csv_file, focus, template_file).await,
        Commands::Analyze {
            csv_file,
            focus,
            api_key,
            model,
            template_url,
            template_file,
            timeout,
            raw,
            json,
        } => {
            let mut config = AnalysisConfig::from_env()?;
            if api_key.is_some() {
                config.api_key = api_key;
            }
            if let Some(model) = model {
                config.model = model;
            }
            if template_url.is_some() {
                config.template_url = template_url;
            }
            if let Some(secs) = timeout {
                config.analysis_timeout = Duration::from_secs(secs.max(1));
            }
            analyze(&csv_file, focus, config, template_file, raw, json).await
        }
        Commands::Export { csv_file, output } => export(&csv_file, &output),
    }
}

fn read_csv(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

fn inspect(csv_file: &Path, tab: MetricTab, json: bool) -> Result<()> {
    let text = read_csv(csv_file)?;

    // report every missing column, not just the first failure
    let dataset = normalize_columns(parse_csv(&text)?);
    let verdict = validate_level_data(&dataset);
    if !verdict.valid {
        anyhow::bail!("{}", verdict.message);
    }
    info!("{}", verdict.message);

    if json {
        println!("{}", serde_json::to_string_pretty(&dataset)?);
        return Ok(());
    }

    print_level_table(&dataset);

    println!("\n{}", "=".repeat(80));
    println!(" METRICS ({} levels)", dataset.len());
    println!("{}", "=".repeat(80));
    for column in CanonicalColumn::ALL.iter().skip(1) {
        let gauge = match gauge_value(&dataset, *column) {
            Some(value) => {
                let active = active_gauge_blocks(value, GAUGE_BLOCKS);
                format!(
                    "[{}{}] {}",
                    "#".repeat(active),
                    ".".repeat(GAUGE_BLOCKS - active),
                    gauge_label(value)
                )
            }
            None => "---".to_string(),
        };
        println!(
            "{:<16} avg {:>12}   peak {:>12}   {}",
            column.name(),
            average(&dataset, *column),
            peak(&dataset, *column),
            gauge
        );
    }

    println!("\n {} by level:", tab.column().name());
    for point in extract_series(&dataset, tab.column()) {
        println!("   {:>6}  {:.2}", point.level.to_string(), point.value);
    }
    Ok(())
}

fn print_level_table(dataset: &LevelDataset) {
    let columns = dataset.columns();
    println!(
        "{}",
        columns.iter().map(|c| format!("{:>15}", c)).collect::<String>()
    );
    for row in dataset.iter() {
        let line: String = columns
            .iter()
            .map(|c| {
                let cell = row.get(c).map(|v| format_cell(c, v)).unwrap_or_default();
                format!("{:>15}", cell)
            })
            .collect();
        println!("{}", line);
    }
}

async fn print_prompt(csv_file: &Path, focus: FocusMode, template_file: Option<PathBuf>) -> Result<()> {
    let dataset = ingest(&read_csv(csv_file)?)?;
    let config = AnalysisConfig::from_env()?;

    let source: Option<Box<dyn TemplateSource>> = match (template_file, &config.template_url) {
        (Some(path), _) => Some(Box::new(FileTemplateSource::new(path))),
        (None, Some(url)) => Some(Box::new(HttpTemplateSource::new(
            url.clone(),
            config.template_timeout,
        )?)),
        (None, None) => None,
    };

    let template = resolve_template(source.as_deref()).await;
    println!("{}", template.render(&dataset, focus));
    Ok(())
}

async fn analyze(
    csv_file: &Path,
    focus: FocusMode,
    config: AnalysisConfig,
    template_file: Option<PathBuf>,
    raw: bool,
    json: bool,
) -> Result<()> {
    let mut analyzer = FunnelAnalyzer::from_config(&config)?;
    if let Some(path) = template_file {
        analyzer = analyzer.with_template_source(Arc::new(FileTemplateSource::new(path)));
    }

    if raw {
        let dataset = ingest(&read_csv(csv_file)?)?;
        println!("{}", analyzer.generate_raw(&dataset, focus).await?);
        return Ok(());
    }

    let session = Session::new(analyzer);
    session.set_focus_mode(focus);
    let dataset = session.upload(&read_csv(csv_file)?)?;
    info!("Loaded {} levels from {}", dataset.len(), csv_file.display());

    let run = session.run_analysis().await.context("Analysis failed")?;

    if json {
        println!("{}", serde_json::to_string_pretty(run.as_ref())?);
        return Ok(());
    }

    let result = &run.result;
    println!("\n{}", "=".repeat(80));
    println!(" FUNNEL ANALYSIS ({} focus, {} levels)", run.focus_mode, run.levels_analyzed);
    println!("{}", "=".repeat(80));

    if result.is_unstructured() {
        println!("\n{}", result.raw_response);
        return Ok(());
    }

    println!("\n Executive Summary\n{}", result.executive_summary);
    if !result.segmentation.is_empty() {
        println!("\n Segmentation\n{}", result.segmentation);
    }
    if !result.recommendations.is_empty() {
        println!("\n Recommendations");
        for (i, item) in result.recommendations.iter().enumerate() {
            println!("   {}. {}", i + 1, item);
        }
    }
    if !result.full_table.is_empty() {
        println!("\n Full Recommendation Table\n{}", result.full_table);
    }
    println!("\n(run {} in {}ms)", run.run_id, run.elapsed_ms);
    Ok(())
}

fn export(csv_file: &Path, output: &Path) -> Result<()> {
    let dataset = ingest(&read_csv(csv_file)?)?;
    std::fs::write(output, dataset.to_csv()?)
        .with_context(|| format!("Failed to write {}", output.display()))?;
    info!("Wrote {} levels to {}", dataset.len(), output.display());
    Ok(())
}
