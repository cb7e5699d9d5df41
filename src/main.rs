//! Tabpipe CLI - run JSON pipelines over delimited-text files
//!
//! # Main Commands
//!
//! ```bash
//! tabpipe serve                          # Start HTTP server (port 3000)
//! tabpipe run input.csv -p pipeline.json # Run a pipeline over a file
//! tabpipe pipeline list                  # Manage stored pipelines
//! ```
//!
//! # Debug Commands
//!
//! ```bash
//! tabpipe parse input.csv                # Just parse the file to JSON
//! tabpipe operations                     # Show the step kind reference
//! ```

use clap::{Parser, Subcommand};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tabpipe::{
    ingest_file_auto, operations_description, Pipeline, PipelineRegistry, RunResponse,
};

#[derive(Parser)]
#[command(name = "tabpipe")]
#[command(about = "Run declarative JSON pipelines over tabular data", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a delimited-text file and output typed JSON rows
    Parse {
        /// Input file
        input: PathBuf,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Run a pipeline over a delimited-text file
    Run {
        /// Input file
        input: PathBuf,

        /// Pipeline document (JSON file)
        #[arg(short, long)]
        pipeline: PathBuf,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show available pipeline operations
    Operations,

    /// Start the HTTP server
    Serve {
        /// Port to listen on (default: $TABPIPE_PORT or 3000)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Manage stored pipelines
    Pipeline {
        #[command(subcommand)]
        action: PipelineAction,
    },
}

#[derive(Subcommand)]
enum PipelineAction {
    /// List all stored pipelines
    List,

    /// Show a stored pipeline by name
    Show { name: String },

    /// Save a pipeline document under a name
    Save {
        /// Pipeline JSON file
        file: PathBuf,
        /// Unique name for the pipeline
        #[arg(short, long)]
        name: String,
    },

    /// Delete a stored pipeline by name
    Delete { name: String },
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Parse { input, output } => cmd_parse(&input, output.as_deref()),
        Commands::Run {
            input,
            pipeline,
            output,
        } => cmd_run(&input, &pipeline, output.as_deref()),
        Commands::Operations => {
            println!("{}", operations_description());
            Ok(())
        }
        Commands::Serve { port } => cmd_serve(port).await,
        Commands::Pipeline { action } => cmd_pipeline(action),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn cmd_parse(input: &Path, output: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("Parsing: {}", input.display());

    let result = ingest_file_auto(input)?;
    eprintln!("  Encoding: {}", result.encoding);
    eprintln!("  Delimiter: '{}'", format_delimiter(result.delimiter));
    eprintln!("  Columns: {}", result.headers.join(", "));
    eprintln!("  Rows: {}", result.frame.n_rows());

    let json = serde_json::to_string_pretty(&result.frame.to_records())?;
    write_output(&json, output)
}

fn cmd_run(
    input: &Path,
    pipeline_path: &Path,
    output: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("Processing: {}", input.display());

    let text = fs::read_to_string(pipeline_path)?;
    let pipeline = Pipeline::from_json_str(&text)?;
    let ingested = ingest_file_auto(input)?;

    eprintln!("  Encoding: {}", ingested.encoding);
    eprintln!("  Delimiter: '{}'", format_delimiter(ingested.delimiter));
    eprintln!("  Rows in: {}", ingested.frame.n_rows());
    eprintln!("  Steps: {}", pipeline.len());

    let result = pipeline.execute(&ingested.frame)?;
    let response = RunResponse::from(&result);
    let json = serde_json::to_string_pretty(&response)?;
    write_output(&json, output)
}

async fn cmd_serve(port: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let port = port
        .or_else(|| {
            std::env::var("TABPIPE_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
        })
        .unwrap_or(3000);
    tabpipe::server::start_server(port).await
}

fn cmd_pipeline(action: PipelineAction) -> Result<(), Box<dyn std::error::Error>> {
    let mut registry = PipelineRegistry::from_env()?;

    match action {
        PipelineAction::List => {
            let docs = registry.list();
            if docs.is_empty() {
                eprintln!("No pipelines stored yet.");
                eprintln!("Use 'tabpipe pipeline save <file> --name <name>' to add one.");
                return Ok(());
            }
            for doc in docs {
                println!("{}  {}  {}", doc.created_at.format("%Y-%m-%d %H:%M"), doc.id, doc.name);
            }
        }
        PipelineAction::Show { name } => {
            let doc = registry.get(&name)?;
            println!("{}", serde_json::to_string_pretty(&doc)?);
        }
        PipelineAction::Save { file, name } => {
            let text = fs::read_to_string(&file)?;
            let doc: Value = serde_json::from_str(&text)?;
            // Reject documents that would fail at run time.
            Pipeline::parse(&doc)?;
            let id = registry.save(&name, doc)?;
            eprintln!("Saved '{name}' ({id})");
        }
        PipelineAction::Delete { name } => {
            registry.delete(&name)?;
            eprintln!("Deleted '{name}'");
        }
    }

    Ok(())
}

fn format_delimiter(d: char) -> String {
    match d {
        '\t' => "\\t".to_string(),
        c => c.to_string(),
    }
}

fn write_output(content: &str, path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    match path {
        Some(p) => {
            fs::write(p, content)?;
            eprintln!("Output written to: {}", p.display());
        }
        None => println!("{content}"),
    }
    Ok(())
}
