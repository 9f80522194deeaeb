use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use quarry::{
    DualIndex, Indexable, IndexSettings, IndexerRequest, PartKind, Property, PropertyKind, Query,
};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "quarry")]
#[command(about = "Inspect and query a dual-store content index", long_about = None)]
struct Args {
    /// Index directory
    #[arg(long, env = "QUARRY_INDEX_DIR", default_value = "./index")]
    index_dir: PathBuf,

    /// JSON settings file; missing keys use defaults
    #[arg(long, env = "QUARRY_SETTINGS")]
    settings: Option<PathBuf>,

    /// Minor format version; a change rebuilds the index
    #[arg(long, env = "QUARRY_MINOR_VERSION")]
    minor_version: Option<u32>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print item counts, version and per-store statistics
    Info,

    /// Compact both stores
    Optimize,

    /// Index plain text files
    Add {
        files: Vec<PathBuf>,

        /// Mutable keyword property, as key=value
        #[arg(long = "tag", value_name = "KEY=VALUE")]
        tags: Vec<String>,
    },

    /// Run a query and print the hits as JSON lines
    Query {
        /// Free text, every word required
        words: Vec<String>,

        /// Required keyword property, as key=value
        #[arg(long = "keyword", value_name = "KEY=VALUE")]
        keywords: Vec<String>,

        /// Prohibited free text
        #[arg(long = "not")]
        prohibited: Vec<String>,

        #[arg(long)]
        max_hits: Option<usize>,

        #[arg(long)]
        mime_type: Option<String>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut settings = match &args.settings {
        Some(path) => IndexSettings::from_json_file(path)
            .with_context(|| format!("loading settings from {}", path.display()))?,
        None => IndexSettings::default(),
    };
    if let Some(minor) = args.minor_version {
        settings = settings.with_minor_version(minor);
    }
    let default_max_hits = settings.default_max_hits;

    info!("Starting quarry v{} on {}", quarry::VERSION, args.index_dir.display());
    let index = DualIndex::open(&args.index_dir, settings)
        .with_context(|| format!("opening index at {}", args.index_dir.display()))?;

    match args.command {
        Command::Info => print_info(&index),
        Command::Optimize => {
            index.optimize()?;
            println!("optimized {} items", index.item_count());
            Ok(())
        }
        Command::Add { files, tags } => add_files(&index, files, &tags),
        Command::Query {
            words,
            keywords,
            prohibited,
            max_hits,
            mime_type,
        } => {
            let mut query = Query::new().with_max_hits(max_hits.unwrap_or(default_max_hits));
            if !words.is_empty() {
                query = query.require(PartKind::text(words.join(" ")));
            }
            for pair in &keywords {
                let (key, value) = split_pair(pair)?;
                query = query.require(PartKind::keyword(key, value));
            }
            for text in prohibited {
                query = query.prohibit(PartKind::text(text));
            }
            if let Some(mime_type) = mime_type {
                query = query.with_mime_type(mime_type);
            }

            let response = index.search(&query)?;
            for hit in &response.hits {
                println!("{}", serde_json::to_string(hit)?);
            }
            info!(
                shown = response.hits.len(),
                total = response.total_matches,
                "query finished"
            );
            Ok(())
        }
    }
}

fn print_info(index: &DualIndex) -> Result<()> {
    println!("directory:   {}", index.dir().display());
    println!("version:     {}", index.settings().version_string());
    println!("fingerprint: {}", index.fingerprint());
    println!("items:       {}", index.item_count());
    for store in [index.primary(), index.secondary()] {
        let snapshot = store.open_reader();
        println!(
            "{}: {} live / {} total, generation {}",
            store.name(),
            snapshot.num_docs(),
            snapshot.max_doc(),
            snapshot.generation()
        );
        let mut fields = snapshot.field_term_counts();
        fields.sort();
        for (field, terms) in fields {
            println!("  {:<24} {} terms", field, terms);
        }
    }
    Ok(())
}

fn add_files(index: &DualIndex, files: Vec<PathBuf>, tags: &[String]) -> Result<()> {
    if files.is_empty() {
        bail!("no files given");
    }
    let mut tag_properties = Vec::with_capacity(tags.len());
    for pair in tags {
        let (key, value) = split_pair(pair)?;
        tag_properties.push(Property::new(PropertyKind::Keyword, key, value).mutable());
    }

    let mut request = IndexerRequest::new();
    for path in files {
        let path = path
            .canonicalize()
            .with_context(|| format!("resolving {}", path.display()))?;
        let content = std::fs::read(&path)?;
        let modified: DateTime<Utc> = std::fs::metadata(&path)?.modified()?.into();

        let mut indexable = Indexable::add(format!("file://{}", path.display()))
            .with_mime_type("text/plain")
            .with_timestamp(modified)
            .with_content(content);
        for property in &tag_properties {
            indexable = indexable.with_property(property.clone());
        }
        request.add(indexable);
    }

    let receipts = index.flush(request)?;
    for receipt in &receipts {
        println!("{}", serde_json::to_string(receipt)?);
    }
    Ok(())
}

fn split_pair(pair: &str) -> Result<(&str, &str)> {
    match pair.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key, value)),
        _ => bail!("expected KEY=VALUE, got {:?}", pair),
    }
}
