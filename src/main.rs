use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use unitcart::config::BuildConfig;
use unitcart::features::FeatureStore;
use unitcart::logging::init_logging;
use unitcart::{codec, pipeline, Result};

/// Unit-selection tree builder for TTS voices
#[derive(Parser)]
#[command(name = "unitcart", version, about)]
struct Cli {
    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the whole build and write the binary tree
    Build {
        /// TOML configuration; defaults apply when absent
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Maximum number of concurrent learner processes
        #[arg(long)]
        parallelism: Option<usize>,
        /// Refine large leaves with the external learner
        #[arg(long)]
        call_learner: bool,
        /// Keep the learner's data and distance files
        #[arg(long)]
        retain_files: bool,
        /// Binary tree to write
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Print a binary tree in text notation
    Dump {
        #[arg(long)]
        tree: PathBuf,
        /// Feature file providing the schema
        #[arg(long)]
        features: PathBuf,
        /// Write the text here instead of stdout
        #[arg(long)]
        text: Option<PathBuf>,
    },
    /// List the decision path and population of every leaf
    Paths {
        #[arg(long)]
        tree: PathBuf,
        #[arg(long)]
        features: PathBuf,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Build {
            config,
            parallelism,
            call_learner,
            retain_files,
            output,
        } => build(config, parallelism, call_learner, retain_files, output),
        Commands::Dump { tree, features, text } => dump(tree, features, text),
        Commands::Paths { tree, features } => paths(tree, features),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn build(
    config: Option<PathBuf>,
    parallelism: Option<usize>,
    call_learner: bool,
    retain_files: bool,
    output: Option<PathBuf>,
) -> Result<()> {
    let mut config = match config {
        Some(path) => BuildConfig::load(&path)?,
        None => BuildConfig::default(),
    };
    if let Some(n) = parallelism {
        config.parallelism = n;
    }
    if call_learner {
        config.call_learner = true;
    }
    if retain_files {
        config.retain_intermediate_files = true;
    }
    if let Some(path) = output {
        config.output_file = path;
    }
    pipeline::run(&config)?;
    Ok(())
}

fn dump(tree: PathBuf, features: PathBuf, text: Option<PathBuf>) -> Result<()> {
    let schema = FeatureStore::load(&features)?.schema;
    let loaded = codec::load_file(&tree, &schema)?;
    tracing::info!(
        name = %loaded.name,
        nodes = loaded.tree.len(),
        leaves = loaded.tree.leaf_count(),
        "loaded {}",
        tree.display()
    );
    match text {
        Some(path) => codec::write_text_file(&loaded.tree, &schema, &path)?,
        None => {
            let mut out = std::io::stdout().lock();
            codec::write_tree(&loaded.tree, &schema, &mut out)?;
            out.flush()?;
        }
    }
    Ok(())
}

fn paths(tree: PathBuf, features: PathBuf) -> Result<()> {
    let schema = FeatureStore::load(&features)?.schema;
    let loaded = codec::load_file(&tree, &schema)?;
    let tree = &loaded.tree;
    let mut out = std::io::stdout().lock();
    for id in tree.leaves() {
        let population = tree.leaf(id).map_or(0, |l| l.data.len());
        writeln!(out, "{population}\t{}", tree.decision_path(id, &schema))?;
    }
    out.flush()?;
    Ok(())
}
