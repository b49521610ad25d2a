use std::{fs::File, io::BufWriter, path::PathBuf, pin::pin};

use abc::DecodePolicy;
use anyhow::Context;
use clap::{Args, Parser};
use database::{Database, TuneFilter};
use futures::StreamExt;
use tracing::{debug, info, instrument, warn};

mod export;
mod loader;

use export::ExportFormat;
use loader::{AbcFile, LoadSummary};

#[derive(Debug, clap::Parser)]
#[command(name = "abc-tunes", version, about = "Load, search and export ABC tune books")]
enum Command {
    /// Parse every book under ROOT and store the tunes.
    Load {
        root: PathBuf,
        #[command(flatten)]
        db: DbArgs,
        /// Files parsed concurrently.
        #[arg(short, long, default_value_t = 8)]
        jobs: usize,
        /// Replace invalid UTF-8 instead of skipping the file.
        #[arg(long)]
        lossy: bool,
        /// Delete stored tunes before loading.
        #[arg(long)]
        reset: bool,
    },
    /// Parse a single file and print its tunes as JSON.
    Parse {
        path: PathBuf,
        #[arg(short, long, default_value_t = 0)]
        book: i32,
        #[arg(long)]
        lossy: bool,
    },
    /// List stored tunes matching all given filters.
    Search {
        #[command(flatten)]
        db: DbArgs,
        #[command(flatten)]
        filter: FilterArgs,
    },
    /// Print one stored tune.
    Show {
        id: i64,
        #[command(flatten)]
        db: DbArgs,
    },
    /// Print collection totals and the most common types and keys.
    Stats {
        #[command(flatten)]
        db: DbArgs,
        /// Entries shown in the most-common lists.
        #[arg(short, long, default_value_t = 10)]
        top: i64,
    },
    /// Write matching tunes as ABC, JSON or a text report.
    Export {
        #[command(flatten)]
        db: DbArgs,
        #[command(flatten)]
        filter: FilterArgs,
        #[arg(short, long, value_enum, default_value_t = ExportFormat::Abc)]
        format: ExportFormat,
        /// Output file; stdout when omitted.
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
}

#[derive(Debug, Args)]
struct DbArgs {
    /// Postgres connection url.
    #[arg(long = "db", env = "DATABASE_URL")]
    url: String,
}

impl DbArgs {
    async fn connect(&self) -> anyhow::Result<Database> {
        Database::connect(&self.url)
            .await
            .context("failed to connect to database")
    }
}

#[derive(Debug, Args)]
struct FilterArgs {
    #[arg(long)]
    book: Option<i32>,
    #[arg(long = "type")]
    tune_type: Option<String>,
    #[arg(long)]
    title: Option<String>,
    #[arg(long)]
    key: Option<String>,
    #[arg(long)]
    limit: Option<i64>,
}

impl From<FilterArgs> for TuneFilter {
    fn from(args: FilterArgs) -> Self {
        TuneFilter {
            book_number: args.book,
            tune_type: args.tune_type,
            title: args.title,
            key_signature: args.key,
            limit: args.limit,
        }
    }
}

fn decode_policy(lossy: bool) -> DecodePolicy {
    if lossy {
        DecodePolicy::Lossy
    } else {
        DecodePolicy::Strict
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    {
        use tracing_subscriber::prelude::*;

        tracing_subscriber::registry()
            .with(tracing_subscriber::fmt::layer())
            .with(tracing_subscriber::EnvFilter::from_default_env())
            .init()
    }

    match Command::parse() {
        Command::Load {
            root,
            db,
            jobs,
            lossy,
            reset,
        } => load_books(root, &db, jobs, decode_policy(lossy), reset).await,
        Command::Parse { path, book, lossy } => parse_file(path, book, decode_policy(lossy)).await,
        Command::Search { db, filter } => search(&db, filter.into()).await,
        Command::Show { id, db } => show(&db, id).await,
        Command::Stats { db, top } => stats(&db, top).await,
        Command::Export {
            db,
            filter,
            format,
            out,
        } => export_tunes(&db, filter.into(), format, out).await,
    }
}

#[instrument(skip(db), level = "trace")]
async fn load_books(
    root: PathBuf,
    db: &DbArgs,
    jobs: usize,
    policy: DecodePolicy,
    reset: bool,
) -> anyhow::Result<()> {
    let files = loader::find_abc_files(&root)?;
    info!(n_files = files.len(), root = %root.display(), "found abc files");

    let database = db.connect().await?;
    database
        .create_schema()
        .await
        .context("failed to create schema")?;
    if reset {
        let removed = database.clear().await.context("failed to clear tunes")?;
        info!(removed, "cleared stored tunes");
    }

    let mut summary = LoadSummary {
        files: files.len(),
        ..Default::default()
    };
    let start = std::time::Instant::now();
    let mut outcomes = pin!(loader::parse_files(files, policy, jobs));

    while let Some((file, result)) = outcomes.next().await {
        let path = file.path.display();
        let tunes = match result {
            Ok(tunes) => tunes,
            Err(err) => {
                warn!(%err, "skipping file");
                println!("{path}: error - {err}");
                summary.failed += 1;
                continue;
            }
        };
        if tunes.is_empty() {
            println!("{path}: no tunes found");
            summary.empty += 1;
            continue;
        }

        match database.insert_tunes_batch(&tunes).await {
            Ok(count) => {
                println!("{path}: {count} tunes");
                summary.loaded += 1;
                summary.tunes += count;
            }
            Err(err) => {
                warn!(%err, %path, "failed to insert tunes");
                println!("{path}: error - {err}");
                summary.failed += 1;
            }
        }
    }

    let elapsed = start.elapsed();
    info!(?elapsed, ?summary, "completed load");
    println!("{summary}");
    Ok(())
}

async fn parse_file(path: PathBuf, book_number: i32, policy: DecodePolicy) -> anyhow::Result<()> {
    let file = AbcFile { book_number, path };
    let tunes = loader::load_file(&file, policy).await?;
    debug!(tunes = tunes.len(), "parsed");

    let stdout = std::io::stdout().lock();
    serde_json::to_writer_pretty(stdout, &tunes)?;
    println!();
    Ok(())
}

async fn search(db: &DbArgs, filter: TuneFilter) -> anyhow::Result<()> {
    let database = db.connect().await?;
    let tunes = database.search(&filter).await?;

    if tunes.is_empty() {
        println!("no results found");
        return Ok(());
    }
    println!("found {} tunes", tunes.len());
    export::write_table(std::io::stdout().lock(), &tunes, tunes.len())?;
    Ok(())
}

async fn show(db: &DbArgs, id: i64) -> anyhow::Result<()> {
    let database = db.connect().await?;
    let tune = database
        .get(id)
        .await?
        .with_context(|| format!("no tune with id {id}"))?;

    let added = tune
        .created_at
        .format(time::macros::format_description!("[year]-[month]-[day] [hour]:[minute]"))?;
    println!("id:     {}", tune.id);
    println!("book:   {}", tune.book_number);
    println!("file:   {}", tune.file_path);
    println!("added:  {added}");
    println!();
    println!("{}", tune.abc_notation);
    Ok(())
}

async fn stats(db: &DbArgs, top: i64) -> anyhow::Result<()> {
    let database = db.connect().await?;
    let summary = database.summary().await?;

    println!("total tunes:      {}", summary.total_tunes);
    println!("total books:      {}", summary.total_books);
    println!("total tune types: {}", summary.total_types);
    println!("total keys:       {}", summary.total_keys);
    println!(
        "most common type: {}",
        summary.most_common_type.as_deref().unwrap_or("n/a")
    );
    println!(
        "most common key:  {}",
        summary.most_common_key.as_deref().unwrap_or("n/a")
    );

    println!("\ntunes per book:");
    for book in database.tunes_per_book().await? {
        println!("  book {}: {} tunes", book.book_number, book.count);
    }

    println!("\ntop {top} tune types:");
    for (rank, entry) in database.most_common_types(top).await?.iter().enumerate() {
        println!("  {}. {}: {} tunes", rank + 1, entry.value, entry.count);
    }

    println!("\ntop {top} keys:");
    for (rank, entry) in database.most_common_keys(top).await?.iter().enumerate() {
        println!("  {}. {}: {} tunes", rank + 1, entry.value, entry.count);
    }
    Ok(())
}

async fn export_tunes(
    db: &DbArgs,
    filter: TuneFilter,
    format: ExportFormat,
    out: Option<PathBuf>,
) -> anyhow::Result<()> {
    let database = db.connect().await?;
    let tunes = database.search(&filter).await?;

    match &out {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("failed to create {}", path.display()))?;
            export::write_tunes(BufWriter::new(file), &tunes, format)?;
            info!(n_tunes = tunes.len(), path = %path.display(), "exported tunes");
        }
        None => export::write_tunes(std::io::stdout().lock(), &tunes, format)?,
    }
    Ok(())
}
