use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use lorecheck_lib::{
    cmd_chunk, cmd_ingest, cmd_predict, cmd_query, cmd_stories, init_tracing, load_config,
};

#[derive(Parser)]
#[command(
    name = "lorecheck",
    version,
    about = "Check backstory claims against the text of a novel"
)]
struct Cli {
    /// YAML configuration file (defaults apply when omitted)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Log filter, e.g. `info` or `lore_ai=debug` (overrides RUST_LOG)
    #[arg(long, global = true)]
    log_level: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Chunk, embed and publish one or more novels
    Ingest {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// List indexed stories
    Stories,
    /// Classify a single claim against a story
    Query {
        #[arg(long)]
        story: String,
        #[arg(long)]
        claim: String,
        /// Include the selected evidence chunks in the output
        #[arg(long)]
        show_evidence: bool,
    },
    /// Classify every row of a claim CSV and write binary predictions
    Predict {
        #[arg(long)]
        input: PathBuf,
        #[arg(long, default_value = "output.csv")]
        output: PathBuf,
    },
    /// Print a novel's chunks as JSON without embedding
    Chunk { file: PathBuf },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.log_level.as_deref());

    let result = load_config(cli.config.as_deref()).and_then(|cfg| match cli.command {
        Commands::Ingest { files } => cmd_ingest(&cfg, &files),
        Commands::Stories => cmd_stories(&cfg),
        Commands::Query {
            story,
            claim,
            show_evidence,
        } => cmd_query(&cfg, &story, &claim, show_evidence),
        Commands::Predict { input, output } => cmd_predict(&cfg, &input, &output),
        Commands::Chunk { file } => cmd_chunk(&cfg, &file),
    });

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let json = serde_json::to_string_pretty(&e).unwrap_or_else(|_| e.describe());
            eprintln!("{json}");
            ExitCode::FAILURE
        }
    }
}
