use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::info;
use segdex::ingest::{ingest_columnar_json, ingest_json_lines, IngestOptions};
use segdex::{Config, Database, DocId, Error, ErrorKind, KnnQuery, Result, Schema, ScoringMode, SearchOptions};

#[derive(Parser)]
#[command(name = "segdex")]
#[command(about = "Segment-based full-text search engine", long_about = None)]
struct Args {
    /// TOML configuration file
    #[arg(long, env = "SEGDEX_CONFIG")]
    config: Option<PathBuf>,

    /// Index directory; overrides `storage_path` from the config file
    #[arg(long, env = "SEGDEX_DIR")]
    index_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create an index from a JSON schema file
    Init {
        #[arg(long)]
        schema: PathBuf,
    },
    /// Index JSON-lines records, or column-oriented JSON with --columnar
    Index {
        file: PathBuf,
        #[arg(long)]
        columnar: bool,
        #[arg(long, default_value = "1000")]
        batch_size: usize,
        /// Stop at the first bad record
        #[arg(long)]
        strict: bool,
    },
    /// Run a query
    Search {
        query: String,
        #[arg(long, short = 'n')]
        limit: Option<usize>,
        /// tfidf or bm25
        #[arg(long)]
        scoring: Option<ScoringMode>,
        /// Numeric field to sort by
        #[arg(long)]
        sort: Option<String>,
        #[arg(long)]
        desc: bool,
        /// Keyword field to count values of; repeatable
        #[arg(long)]
        facet: Vec<String>,
        /// Include stored documents in the output
        #[arg(long)]
        docs: bool,
        #[arg(long)]
        timeout_ms: Option<u64>,
    },
    /// Nearest neighbours in a vector field
    Knn {
        #[arg(long)]
        field: String,
        /// Comma-separated components
        #[arg(long, value_delimiter = ',', allow_hyphen_values = true)]
        vector: Vec<f32>,
        #[arg(short, default_value = "10")]
        k: usize,
        /// Score full-precision vectors on quantized fields
        #[arg(long)]
        exact: bool,
        /// Also report recall of the quantized search against the exact one
        #[arg(long)]
        recall: bool,
    },
    /// Print a stored document
    Get { id: u64 },
    /// Delete documents and commit
    Delete { ids: Vec<u64> },
    /// Merge segments down to a maximum count
    Merge {
        #[arg(long, default_value = "1")]
        max_segments: usize,
    },
    /// Print index statistics
    Stats,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "segdex=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {}", err);
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => Config::from_toml_file(path)?,
        None => Config::default(),
    };
    if let Some(dir) = args.index_dir {
        config.storage_path = dir;
    }

    match args.command {
        Command::Init { schema } => {
            let schema: Schema = serde_json::from_reader(BufReader::new(File::open(&schema)?))?;
            let path = config.storage_path.clone();
            let db = Database::open_with_schema(schema, config)?;
            info!(path = %path.display(), fields = db.schema().fields.len(), "index created");
            print_json(&db.stats())
        }
        Command::Index { file, columnar, batch_size, strict } => {
            let db = Database::open(config)?;
            let options = IngestOptions {
                batch_size,
                continue_on_error: !strict,
                ..IngestOptions::default()
            };
            let report = if columnar {
                let input: serde_json::Value = serde_json::from_reader(BufReader::new(File::open(&file)?))?;
                ingest_columnar_json(&db, &input, &options)?
            } else {
                ingest_json_lines(&db, BufReader::new(File::open(&file)?), &options)?
            };
            print_json(&report)
        }
        Command::Search { query, limit, scoring, sort, desc, facet, docs, timeout_ms } => {
            let db = Database::open(config)?;
            let mut options = SearchOptions::from_config(db.config());
            if let Some(limit) = limit {
                options = options.with_max_results(limit);
            }
            if let Some(scoring) = scoring {
                options = options.with_scoring(scoring);
            }
            if let Some(field) = sort {
                options = options.with_sort(&field, desc);
            }
            for field in &facet {
                options = options.with_facet(field);
            }
            if docs {
                options = options.with_documents();
            }
            if let Some(ms) = timeout_ms {
                options = options.with_timeout(Duration::from_millis(ms));
            }
            print_json(&db.search_with(&query, &options, None)?)
        }
        Command::Knn { field, vector, k, exact, recall } => {
            let db = Database::open(config)?;
            if recall {
                let recall = db.knn_recall(&field, std::slice::from_ref(&vector), k)?;
                info!(field = %field, k, recall, "knn recall");
            }
            let mut query = KnnQuery::new(&field, vector, k);
            if exact {
                query = query.exact();
            }
            print_json(&db.knn_query(&query)?)
        }
        Command::Get { id } => {
            let db = Database::open(config)?;
            let doc = db.get_document(DocId(id))?.ok_or_else(|| {
                Error::new(ErrorKind::NotFound, format!("document {} not found", id))
            })?;
            print_json(&doc.to_json(&db.config().id_field))
        }
        Command::Delete { ids } => {
            let db = Database::open(config)?;
            for id in &ids {
                db.delete_document(DocId(*id));
            }
            let generation = db.commit()?;
            info!(deleted = ids.len(), generation, "delete committed");
            print_json(&db.stats())
        }
        Command::Merge { max_segments } => {
            let db = Database::open(config)?;
            db.force_merge(max_segments)?;
            print_json(&db.stats())
        }
        Command::Stats => {
            let db = Database::open(config)?;
            print_json(&db.stats())
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
