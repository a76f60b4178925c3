//! dialogen CLI - Generate dialog assets from a schema

use anyhow::Result;
use clap::Parser;
use colored::Colorize;
use dialogen_core::feedback::{Feedback, Severity};
use dialogen_core::{generate, CopyMerger, GenerateOptions, HandlebarsEvaluator, Schema};
use std::cell::Cell;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "dialogen")]
#[command(about = "Generate dialog assets from a schema")]
#[command(version)]
pub struct Args {
    /// Path to the normalized schema file
    pub schema: PathBuf,

    /// Output directory for generated assets
    #[arg(short, long, default_value = "out")]
    pub out: PathBuf,

    /// Template source directories, searched in order (first match wins)
    #[arg(short, long = "templates")]
    pub template_dirs: Vec<PathBuf>,

    /// Locales to generate (comma-separated)
    #[arg(short, long, value_delimiter = ',', default_value = "en-us")]
    pub locales: Vec<String>,

    /// Filename prefix for generated assets (defaults to the schema name)
    #[arg(short, long)]
    pub prefix: Option<String>,

    /// Overwrite assets that already exist
    #[arg(short, long)]
    pub force: bool,

    /// Merge generated assets with prior output
    #[arg(long)]
    pub merge: bool,

    /// Flatten cross-referencing assets into one root asset
    #[arg(long)]
    pub singleton: bool,

    /// Show debug-level feedback
    #[arg(short, long)]
    pub verbose: bool,
}

/// Colored console feedback sink
struct ConsoleFeedback {
    verbose: bool,
    saw_error: Cell<bool>,
}

impl ConsoleFeedback {
    fn new(verbose: bool) -> Self {
        Self {
            verbose,
            saw_error: Cell::new(false),
        }
    }
}

impl Feedback for ConsoleFeedback {
    fn emit(&self, severity: Severity, message: &str) {
        match severity {
            Severity::Message => println!("{}", message),
            Severity::Info => println!("{}", message.dimmed()),
            Severity::Warning => eprintln!("{} {}", "warning:".yellow().bold(), message),
            Severity::Error => {
                self.saw_error.set(true);
                eprintln!("{} {}", "error:".red().bold(), message);
            }
            Severity::Debug => {
                if self.verbose {
                    eprintln!("{} {}", "debug:".cyan(), message);
                }
            }
        }
    }

    fn had_error(&self) -> bool {
        self.saw_error.get()
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let schema = Schema::load(&args.schema).await?;
    let prefix = args
        .prefix
        .clone()
        .unwrap_or_else(|| schema.name().to_string());

    let mut options = GenerateOptions::new(args.out.clone(), prefix);
    options.template_dirs = args.template_dirs.clone();
    options.locales = args.locales.clone();
    options.force = args.force;
    options.merge = args.merge;
    options.singleton = args.singleton;

    let evaluator = HandlebarsEvaluator::new();
    let feedback = ConsoleFeedback::new(args.verbose);
    let merger = CopyMerger;

    let success = generate(schema, &options, &evaluator, Some(&merger), &feedback).await?;
    if !success {
        std::process::exit(1);
    }
    Ok(())
}
