//! Tokenscope CLI: run one project research request from the terminal.

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokenscope_core::budget::CostTracker;
use tokenscope_core::error::ResearchError;
use tokenscope_core::research::{ResearchPipeline, ResearchRequest};
use tokenscope_core::search::{CachingSearchProvider, SearchProvider, TavilySearchProvider};
use tokenscope_core::{TracingAnalytics, config, providers};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Tokenscope: long-form research reports for crypto projects
#[derive(Parser, Debug)]
#[command(name = "tokenscope", version, about, long_about = None)]
struct Cli {
    /// Project name to research
    name: String,

    /// Official website of the project
    #[arg(long)]
    website: Option<String>,

    /// Social handle (with or without a leading @)
    #[arg(long)]
    handle: Option<String>,

    /// Token contract address
    #[arg(long)]
    contract: Option<String>,

    /// Workspace directory (for `.tokenscope/config.toml`)
    #[arg(short, long, default_value = ".")]
    workspace: PathBuf,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print the full report as JSON instead of Markdown
    #[arg(long)]
    json: bool,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long)]
    quiet: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(EnvFilter::new(filter));

    let log_dir = directories::ProjectDirs::from("dev", "tokenscope", "tokenscope")
        .map(|d| d.data_dir().join("logs"))
        .unwrap_or_else(|| PathBuf::from("."));
    let _ = std::fs::create_dir_all(&log_dir);
    let file_appender = tracing_appender::rolling::daily(&log_dir, "tokenscope.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::new("debug"));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let workspace = cli
        .workspace
        .canonicalize()
        .unwrap_or_else(|_| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));
    tracing::debug!(workspace = %workspace.display(), log_dir = %log_dir.display(), "Resolved paths");

    let config = match config::load_config(Some(&workspace), cli.config.as_deref(), None) {
        Ok(config) => config,
        Err(e) => {
            let err = ResearchError::from(e);
            print_failure(&err);
            return Err(err.into());
        }
    };

    let llm = providers::create_provider(&config.llm)
        .map_err(|e| anyhow::anyhow!("LLM provider error: {}", e))?;
    let tavily = TavilySearchProvider::new(&config.search)
        .map_err(|e| anyhow::anyhow!("Search provider error: {}", e))?;
    let search: Arc<dyn SearchProvider> = Arc::new(CachingSearchProvider::new(
        Arc::new(tavily),
        config.search.cache_capacity,
    ));
    let cost_gate = Arc::new(CostTracker::from_config(&config.budget));

    let mut request = ResearchRequest::new(cli.name);
    if let Some(website) = cli.website {
        request = request.with_website(website);
    }
    if let Some(handle) = cli.handle {
        request = request.with_social_handle(handle);
    }
    if let Some(contract) = cli.contract {
        request = request.with_contract_address(contract);
    }

    let pipeline = ResearchPipeline::new(config, llm, search, cost_gate, Arc::new(TracingAnalytics));

    match pipeline.run(&request).await {
        Ok(report) => {
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("{}", report.to_markdown());
            }
            Ok(())
        }
        Err(e) => {
            print_failure(&e);
            Err(e.into())
        }
    }
}

/// Stage trail of a failed run, on stderr.
fn print_failure(err: &ResearchError) {
    if err.is_configuration() {
        eprintln!("\n  Check your configuration and API keys.\n");
    }
    let Some(context) = err.context() else {
        return;
    };
    eprintln!("\n  Stages before failure:");
    for stage in &context.stages {
        eprintln!(
            "    {:<22} {:?}{}",
            stage.name,
            stage.status,
            stage
                .model
                .as_deref()
                .map(|m| format!(" ({m})"))
                .unwrap_or_default()
        );
    }
    if !context.extracted.is_empty() {
        eprintln!("  {} source summaries were extracted before the failure.", context.extracted.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_full_request() {
        let cli = Cli::try_parse_from([
            "tokenscope",
            "Acme",
            "--website",
            "https://acme.io",
            "--handle",
            "@acme",
            "--contract",
            "0xabc",
            "--json",
            "-vv",
        ])
        .unwrap();
        assert_eq!(cli.name, "Acme");
        assert_eq!(cli.website.as_deref(), Some("https://acme.io"));
        assert_eq!(cli.handle.as_deref(), Some("@acme"));
        assert_eq!(cli.contract.as_deref(), Some("0xabc"));
        assert!(cli.json);
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.workspace, PathBuf::from("."));
    }

    #[test]
    fn test_name_is_required() {
        assert!(Cli::try_parse_from(["tokenscope", "--json"]).is_err());
    }
}
