use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use fathom_core::{EngineConfig, FathomEngine};
use fathom_schema::DescribeMode;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "fathom", about = "Semantic context engine for financial text-to-SQL")]
struct Cli {
    /// YAML engine config; defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the retrieval context for a question.
    Context {
        question: String,
        #[arg(long)]
        budget: Option<usize>,
    },
    /// Check a SQL statement against the schema.
    Validate { sql: String },
    /// Print the schema description.
    Schema {
        #[arg(long, value_enum, default_value_t = Mode::Full)]
        mode: Mode,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Mode {
    Full,
    Core,
}

impl From<Mode> for DescribeMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Full => DescribeMode::Full,
            Mode::Core => DescribeMode::Core,
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("FATHOM_LOG").unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => EngineConfig::from_path(path)?,
        None => EngineConfig::default(),
    }
    .apply_env()?;
    let engine = FathomEngine::from_config(config);

    match cli.command {
        Command::Context { question, budget } => {
            if let Some(report) = engine.try_index_catalog().await? {
                info!(patterns = report.patterns, columns = report.columns, "catalog indexed");
            }

            let budget = budget.unwrap_or(engine.config().retrieval.token_budget);
            let ctx = engine.build_context(&question, budget).await?;
            println!("{}", ctx.document);
            eprintln!(
                "intent={:?} tokens={} truncated={} degraded={}",
                ctx.intent, ctx.estimated_tokens, ctx.truncated, ctx.degraded
            );
        }
        Command::Validate { sql } => {
            let result = engine.validate(&sql);
            if result.valid {
                println!("valid");
                for w in &result.warnings {
                    println!("warning: {w}");
                }
            } else {
                print!("{}", result.feedback());
                std::process::exit(1);
            }
        }
        Command::Schema { mode } => {
            print!("{}", engine.describe_schema(mode.into()));
        }
    }

    Ok(())
}
