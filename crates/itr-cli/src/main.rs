use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use itr_core::StatusLabel;
use itr_ingest::Ingestor;
use itr_query::{
    export_xlsx_file, visible_page, Direction, FilterSpec, SortColumn, SortSpec,
};
use itr_storage::JsonFileTenderStore;

#[derive(Debug, Parser)]
#[command(name = "itr")]
#[command(about = "IT tender radar: import, browse and export Spanish procurement feeds")]
struct Cli {
    /// JSON store file
    #[arg(long, global = true, default_value = "tenders.json")]
    db: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Import a ZIP archive of .xml/.atom feed documents
    Import { archive: PathBuf },
    /// Print one page of matching records
    List {
        #[command(flatten)]
        filters: FilterArgs,
        /// Sort column: date, title, body or budget
        #[arg(long, default_value = "date")]
        sort: String,
        #[arg(long)]
        asc: bool,
        #[arg(long, default_value_t = 1)]
        page: usize,
        #[arg(long, default_value_t = 12)]
        page_size: usize,
    },
    /// Export all matching records to an XLSX workbook
    Export {
        output: PathBuf,
        #[command(flatten)]
        filters: FilterArgs,
    },
    /// Mark (or unmark, with --unset) one record as favorite
    Favorite {
        id: String,
        #[arg(long)]
        unset: bool,
    },
    /// Delete every stored record
    Clear,
}

#[derive(Debug, Args)]
struct FilterArgs {
    #[arg(long)]
    it_only: bool,
    #[arg(long)]
    favorites: bool,
    #[arg(long, default_value = "")]
    date: String,
    #[arg(long, default_value = "")]
    title: String,
    #[arg(long, default_value = "")]
    body: String,
    #[arg(long)]
    min_budget: Option<f64>,
    /// pending, announced, under-evaluation, awarded, formalized, cancelled, other
    #[arg(long)]
    status: Option<String>,
}

impl FilterArgs {
    fn into_spec(self) -> Result<FilterSpec> {
        let status = self
            .status
            .as_deref()
            .map(|s| s.parse::<StatusLabel>().map_err(|e| anyhow!(e)))
            .transpose()?;
        Ok(FilterSpec {
            it_only: self.it_only,
            favorites_only: self.favorites,
            date_contains: self.date,
            title_contains: self.title,
            body_contains: self.body,
            min_budget: self.min_budget,
            status,
        })
    }
}

fn parse_sort(column: &str, asc: bool) -> Result<SortSpec> {
    let column = match column {
        "date" => SortColumn::Date,
        "title" => SortColumn::Title,
        "body" => SortColumn::ContractingBody,
        "budget" => SortColumn::Budget,
        other => return Err(anyhow!("unknown sort column: {other}")),
    };
    Ok(SortSpec {
        column,
        direction: if asc { Direction::Asc } else { Direction::Desc },
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let store = JsonFileTenderStore::open(&cli.db)
        .await
        .with_context(|| format!("opening store {}", cli.db.display()))?;
    let ingestor = Ingestor::new(Arc::new(store));

    match cli.command {
        Commands::Import { archive } => {
            let file = File::open(&archive)
                .with_context(|| format!("opening archive {}", archive.display()))?;
            let outcome = ingestor.import_archive(file).await?;
            println!(
                "import complete: documents={} extracted={} inserted={} updated={} total={}",
                outcome.summary.documents,
                outcome.summary.extracted,
                outcome.summary.inserted,
                outcome.summary.updated,
                outcome.records.len()
            );
        }
        Commands::List {
            filters,
            sort,
            asc,
            page,
            page_size,
        } => {
            let spec = filters.into_spec()?;
            let sort_spec = parse_sort(&sort, asc)?;
            let records = ingestor.store().get_all().await?;
            let view = visible_page(&records, &spec, sort_spec, page, page_size);
            for r in &view.records {
                println!(
                    "{}{} {} | {} | {} | {:.2} EUR | {} | {}",
                    if r.is_favorite { "*" } else { " " },
                    if r.is_it { " [IT]" } else { "     " },
                    r.date,
                    r.title,
                    r.contracting_body,
                    r.budget_amount,
                    r.status.as_str(),
                    r.id
                );
            }
            println!(
                "page {} of {} ({} matching records)",
                view.page, view.total_pages, view.total_matches
            );
        }
        Commands::Export { output, filters } => {
            let spec = filters.into_spec()?;
            let records = ingestor.store().get_all().await?;
            let matching = itr_query::filter(&records, &spec);
            export_xlsx_file(&matching, &output)?;
            println!("exported {} records to {}", matching.len(), output.display());
        }
        Commands::Favorite { id, unset } => match ingestor.toggle_favorite(&id, !unset).await? {
            Some(record) => println!(
                "{} favorite for {}",
                if record.is_favorite { "set" } else { "unset" },
                record.id
            ),
            None => return Err(anyhow!("no stored record with id {id}")),
        },
        Commands::Clear => {
            ingestor.clear_all().await?;
            println!("store cleared");
        }
    }

    Ok(())
}
