use std::fs::create_dir_all;
use std::io;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use structured_logger::json::new_writer;
use structured_logger::Builder;

use osm_wrangle::errors::Result;
use osm_wrangle::etl::audit::AuditEtl;
use osm_wrangle::etl::export::ExportEtl;
use osm_wrangle::etl::sample::SampleEtl;
use osm_wrangle::etl::Etl;
use osm_wrangle::mongo::{self, ImportTarget};
use osm_wrangle::rules::RuleSet;

#[derive(Parser)]
#[command(name = "osm-wrangle")]
#[command(about = "Audit and reshape OpenStreetMap exports into line-delimited JSON for MongoDB")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the audit pass and print the report
    Audit {
        /// Path to the .osm or .osm.xz input
        input: PathBuf,
        /// Per-region rule tables as JSON (defaults to the Austin, TX tables)
        #[arg(long)]
        rules: Option<PathBuf>,
        /// Audit only every k-th top-level element
        #[arg(long, default_value_t = 1)]
        every: usize,
        /// Directory run outputs are created under
        #[arg(long, default_value = "output")]
        out_dir: PathBuf,
    },
    /// Reshape the input into one JSON document per line
    Export {
        input: PathBuf,
        #[arg(long)]
        rules: Option<PathBuf>,
        /// Export only every k-th top-level element
        #[arg(long, default_value_t = 1)]
        every: usize,
        #[arg(long, default_value = "output")]
        out_dir: PathBuf,
    },
    /// Write every k-th top-level element to a smaller .osm file
    Sample {
        input: PathBuf,
        #[arg(short, long, default_value_t = 10)]
        k: usize,
        #[arg(long, default_value = "output")]
        out_dir: PathBuf,
    },
    /// Bulk-load an exported document file with mongoimport (drops first)
    Load {
        /// Line-delimited JSON document file
        documents: PathBuf,
        #[arg(long, default_value = "127.0.0.1:27017")]
        host: String,
        #[arg(long, default_value = "openstreetmap")]
        db: String,
        #[arg(long)]
        collection: String,
    },
    /// Run the canned aggregations against a loaded collection
    Explore {
        #[arg(long, default_value = "127.0.0.1:27017")]
        host: String,
        #[arg(long, default_value = "openstreetmap")]
        db: String,
        #[arg(long)]
        collection: String,
        /// Name of a single query to run; omit to run all of them
        query: Option<String>,
    },
}

fn setup_logging() {
    Builder::with_level("info")
        .with_target_writer("*", new_writer(io::stdout()))
        .init();
}

fn create_output_dir(input: &Path, out_dir: &Path) -> Result<PathBuf> {
    let input_fname = input
        .file_name()
        .ok_or("Could not get input file name")?;
    let output_dir = out_dir.join(input_fname);
    create_dir_all(&output_dir)?;
    Ok(output_dir)
}

fn load_rules(path: Option<&Path>) -> Result<RuleSet> {
    match path {
        Some(path) => RuleSet::from_file(path),
        None => Ok(RuleSet::austin()),
    }
}

fn main() -> Result<()> {
    setup_logging();

    let cli = Cli::parse();
    match cli.command {
        Commands::Audit { input, rules, every, out_dir } => {
            let rules = load_rules(rules.as_deref())?;
            let output_dir = create_output_dir(&input, &out_dir)?;
            AuditEtl::new(input, every, rules).process(&output_dir)
        },
        Commands::Export { input, rules, every, out_dir } => {
            let rules = load_rules(rules.as_deref())?;
            let output_dir = create_output_dir(&input, &out_dir)?;
            ExportEtl::new(input, every, rules).process(&output_dir)
        },
        Commands::Sample { input, k, out_dir } => {
            let output_dir = create_output_dir(&input, &out_dir)?;
            SampleEtl::new(input, k).process(&output_dir)
        },
        Commands::Load { documents, host, db, collection } => {
            let target = ImportTarget { host, db, collection };
            mongo::run_import(&target, &documents)
        },
        Commands::Explore { host, db, collection, query } => {
            let target = ImportTarget { host, db, collection };
            mongo::run_explore(&target, query.as_deref())
        },
    }
}
