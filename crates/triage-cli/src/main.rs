//! Ticket triage CLI
//!
//! The `triage` command runs the triage graph over a support ticket.
//!
//! ## Commands
//!
//! - `run`: triage one ticket and print the recommendation
//! - `graph`: print the topology as a Mermaid flowchart
//! - `check-config`: validate the configuration and show resolved targets

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{info, warn, Level};

use triage_adapters::{live_ports, FixtureSet, KeywordReasoning, OllamaReasoning, ProviderConfig};
use triage_core::{
    telemetry, IssueCategory, NextAction, ReasoningPort, Source, TriageConfig, TriageOutcome,
    TriagePipeline,
};

#[derive(Parser)]
#[command(name = "triage")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Correlate support tickets with recently shipped changes", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    log_json: bool,

    /// Configuration file (missing file means defaults)
    #[arg(short, long, global = true, env = "TRIAGE_CONFIG", default_value = "triage.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Triage one ticket
    Run {
        /// Ticket ID to triage
        ticket_id: String,

        /// Fixture file with tickets and offline data (overrides the config)
        #[arg(long)]
        fixtures: Option<PathBuf>,

        /// Query GitHub and Linear instead of the fixture data
        #[arg(long)]
        live: bool,

        /// Reasoning backend
        #[arg(long, value_enum, default_value_t = Reasoner::Keyword)]
        reasoner: Reasoner,

        /// Instant fetch windows end at (RFC 3339 or YYYY-MM-DD); defaults
        /// to the ticket's creation time
        #[arg(long)]
        reference_date: Option<String>,

        /// Print the full outcome as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the triage topology as a Mermaid flowchart
    Graph,

    /// Validate the configuration and show resolved search targets
    CheckConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Reasoner {
    /// Deterministic keyword matching
    Keyword,
    /// A local Ollama model
    Ollama,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    telemetry::init_tracing(cli.log_json, level);

    match cli.command {
        Commands::Run {
            ticket_id,
            fixtures,
            live,
            reasoner,
            reference_date,
            json,
        } => {
            let options = RunOptions {
                fixtures,
                live,
                reasoner,
                reference_date: reference_date.as_deref().map(parse_reference_date).transpose()?,
            };
            let outcome = cmd_run(&cli.config, &ticket_id, &options).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            } else {
                print!("{}", render_outcome(&outcome));
            }
            Ok(())
        }
        Commands::Graph => {
            print!("{}", cmd_graph(&cli.config)?);
            Ok(())
        }
        Commands::CheckConfig => {
            print!("{}", cmd_check_config(&cli.config)?);
            Ok(())
        }
    }
}

struct RunOptions {
    fixtures: Option<PathBuf>,
    live: bool,
    reasoner: Reasoner,
    reference_date: Option<DateTime<Utc>>,
}

/// Config file plus environment overrides, validated.
fn load_config(path: &Path) -> Result<TriageConfig> {
    let mut config = TriageConfig::load(path)
        .with_context(|| format!("Failed to load config from {}", path.display()))?;
    config.apply_env_overrides();
    config
        .validate()
        .context("Configuration invalid after environment overrides")?;
    Ok(config)
}

fn parse_reference_date(raw: &str) -> Result<DateTime<Utc>> {
    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return Ok(at.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .with_context(|| format!("Invalid reference date '{}'", raw))?;
    match date.and_hms_opt(0, 0, 0) {
        Some(midnight) => Ok(midnight.and_utc()),
        None => bail!("Invalid reference date '{}'", raw),
    }
}

async fn cmd_run(config_path: &Path, ticket_id: &str, options: &RunOptions) -> Result<TriageOutcome> {
    let config = load_config(config_path)?;
    let providers = ProviderConfig::load(config_path)
        .with_context(|| format!("Failed to load providers from {}", config_path.display()))?;

    let fixtures_path = options
        .fixtures
        .clone()
        .or_else(|| providers.fixtures.clone())
        .context("No ticket source: pass --fixtures or set providers.fixtures")?;
    let fixtures = FixtureSet::load(&fixtures_path)
        .with_context(|| format!("Failed to load fixtures from {}", fixtures_path.display()))?;

    let mut ticket = fixtures.ticket(ticket_id)?;
    if let Some(at) = options.reference_date {
        ticket.created_at = at;
    }

    let reasoning: Arc<dyn ReasoningPort> = match options.reasoner {
        Reasoner::Keyword => Arc::new(KeywordReasoning::new()),
        Reasoner::Ollama => Arc::new(
            OllamaReasoning::new(&providers.ollama).context("Failed to create Ollama client")?,
        ),
    };
    let ports = if options.live {
        live_ports(&providers, reasoning, &fixtures).context("Failed to set up live sources")?
    } else {
        fixtures.ports(reasoning)
    };

    let pipeline = TriagePipeline::new(&config, ports).context("Invalid triage topology")?;
    info!(ticket_id, live = options.live, reasoner = ?options.reasoner, "triaging ticket");

    match pipeline.triage(ticket).await {
        Ok(outcome) => Ok(outcome),
        Err(err) => {
            if let Some(report) = err.best_effort() {
                warn!(
                    run_id = %report.run_id(),
                    path = ?report.trace.path(),
                    "run aborted; best-effort state discarded"
                );
            }
            Err(err).context(format!("Triage of {} failed", ticket_id))
        }
    }
}

fn cmd_graph(config_path: &Path) -> Result<String> {
    let config = load_config(config_path)?;
    let topology =
        triage_core::nodes::triage_topology(&config.routing).context("Invalid triage topology")?;
    Ok(topology.to_mermaid())
}

fn cmd_check_config(config_path: &Path) -> Result<String> {
    let config = load_config(config_path)?;
    let providers = ProviderConfig::load(config_path)?;

    let mut out = String::new();
    let source = if config_path.exists() {
        config_path.display().to_string()
    } else {
        format!("{} (not found, using defaults)", config_path.display())
    };
    writeln!(out, "Config: {}", source)?;
    writeln!(
        out,
        "Routing: threshold {:.2}, windows {:?} days, max {} attempts",
        config.routing.high_threshold, config.routing.escalation_windows, config.routing.max_attempts
    )?;
    writeln!(
        out,
        "Run: deadline {}s, port timeout {}s",
        config.run.deadline_secs, config.run.port_timeout_secs
    )?;
    for category in IssueCategory::KNOWN {
        let targets = config.search_targets(category);
        writeln!(out, "{}:", category)?;
        for source in Source::ALL {
            writeln!(out, "  {:<16} {}", source.as_str(), targets.for_source(source).join(", "))?;
        }
    }
    writeln!(
        out,
        "Providers: github {} ({}), linear {} ({}), ollama {} model {}",
        providers.github.api_url,
        providers.github.token_env,
        providers.linear.api_url,
        providers.linear.token_env,
        providers.ollama.base_url,
        providers.ollama.model
    )?;
    if let Some(fixtures) = &providers.fixtures {
        writeln!(out, "Fixtures: {}", fixtures.display())?;
    }
    Ok(out)
}

fn action_label(action: NextAction) -> &'static str {
    match action {
        NextAction::Escalate => "ESCALATE TO ENGINEERING",
        NextAction::GetMoreInfo => "ASK CUSTOMER FOR MORE INFO",
        NextAction::Reproduce => "TRY TO REPRODUCE",
    }
}

fn render_outcome(outcome: &TriageOutcome) -> String {
    let mut out = String::new();
    let rec = &outcome.recommendation;
    let ticket = outcome.state.ticket();

    let _ = writeln!(out, "Ticket:         {} {}", ticket.id, ticket.title);
    if let Some(classification) = outcome.classification() {
        let _ = writeln!(out, "Classification: {}", classification.category);
    }
    let _ = writeln!(
        out,
        "Search:         {} attempt(s), windows {:?} days",
        outcome.attempts(),
        outcome.windows()
    );
    let _ = writeln!(out, "Confidence:     {:.2} ({:?})", rec.confidence, rec.disposition);
    if let Some(item) = &rec.matched_item {
        let _ = writeln!(out, "Matched:        {}", item);
    }
    if rec.recurring {
        let _ = writeln!(out, "Recurring:      {}", rec.related_tickets.join(", "));
    }
    let _ = writeln!(out, "Tags:           {}", rec.tags.join(", "));
    let _ = writeln!(out, "Summary:        {}", rec.summary);
    let _ = writeln!(out);
    let _ = writeln!(out, ">>> NEXT ACTION: {}", action_label(rec.next_action));
    let _ = writeln!(out, "    Reason: {}", rec.reason);
    if !rec.questions_for_customer.is_empty() {
        let _ = writeln!(out, "    Questions to ask:");
        for question in &rec.questions_for_customer {
            let _ = writeln!(out, "      - {}", question);
        }
    }
    if let Some(context) = &rec.engineering_context {
        let _ = writeln!(out, "    Engineering context: {}", context);
    }
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "Status: {:?}, fetch health {:?}, {} error(s), digest {}",
        outcome.status,
        outcome.fetch_health(),
        outcome.errors.len(),
        &outcome.digest()[..12]
    );
    out
}
