use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use pokedex_labs::app::{App, FetchResult, MapResult, UploadResult};
use pokedex_labs::catalog::{CatalogClient, CatalogHttpClient, CatalogPage, DetailPayload};
use pokedex_labs::config::{ConfigLoader, ResolvedConfig};
use pokedex_labs::domain::{ColumnMapping, DatasetSource, FieldType};
use pokedex_labs::error::LabError;
use pokedex_labs::grid::{DEFAULT_PAGE_SIZE, GridQuery, PAGE_SIZES, SortKey};
use pokedex_labs::output::{JsonOutput, OutputMode};
use pokedex_labs::state::AppState;
use pokedex_labs::store::Store;
use pokedex_labs::tui::{Browser, OperationKind, Tui};

#[derive(Parser)]
#[command(name = "pokelab")]
#[command(about = "Aggregate the Pokédex, upload your own CSV data, and edit both in a grid")]
#[command(version, author)]
struct Cli {
    #[arg(long, global = true)]
    non_interactive: bool,

    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    #[command(about = "Fetch the full catalog and replace the api dataset")]
    Fetch,
    #[command(about = "Upload a CSV file")]
    Upload(UploadArgs),
    #[command(about = "Map uploaded columns onto the base schema")]
    Map(MapArgs),
    #[command(about = "Browse a dataset")]
    View(ViewArgs),
    #[command(about = "Edit one cell")]
    Edit(EditArgs),
    #[command(about = "Manage custom columns")]
    Column(ColumnArgs),
    #[command(about = "Export a dataset as CSV")]
    Export(ExportArgs),
    #[command(about = "Clear a dataset and its persisted tables")]
    Clear(SourceArgs),
}

#[derive(Args, Clone, Copy)]
struct SourceArgs {
    #[arg(long, value_enum, default_value_t = DatasetSource::Api)]
    source: DatasetSource,
}

#[derive(Args)]
struct UploadArgs {
    file: PathBuf,

    #[arg(long = "map", value_name = "COLUMN=FIELD")]
    mappings: Vec<ColumnMapping>,
}

#[derive(Args)]
struct MapArgs {
    #[arg(long = "map", value_name = "COLUMN=FIELD", required = true)]
    mappings: Vec<ColumnMapping>,
}

#[derive(Args)]
struct ViewArgs {
    #[command(flatten)]
    source: SourceArgs,

    #[arg(long)]
    search: Option<String>,

    #[arg(long, value_name = "COLUMN[:asc|desc]")]
    sort: Option<SortKey>,

    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u64).range(1..))]
    page: u64,

    #[arg(long, default_value_t = DEFAULT_PAGE_SIZE, value_parser = parse_page_size)]
    page_size: usize,
}

#[derive(Args)]
struct EditArgs {
    #[command(flatten)]
    source: SourceArgs,

    #[arg(long)]
    id: String,

    #[arg(long)]
    field: String,

    #[arg(long)]
    value: String,
}

#[derive(Args)]
struct ColumnArgs {
    #[command(subcommand)]
    command: ColumnCommand,
}

#[derive(Subcommand)]
enum ColumnCommand {
    #[command(about = "Add a custom column")]
    Add {
        #[command(flatten)]
        source: SourceArgs,
        #[arg(long)]
        name: String,
        #[arg(long = "type", value_enum)]
        column_type: FieldType,
        #[arg(long, default_value = "")]
        default: String,
    },
    #[command(about = "Remove a custom column")]
    Remove {
        #[command(flatten)]
        source: SourceArgs,
        #[arg(long)]
        id: String,
    },
    #[command(about = "List custom columns")]
    List(SourceArgs),
}

#[derive(Args)]
struct ExportArgs {
    #[command(flatten)]
    source: SourceArgs,

    #[arg(long)]
    out: Option<PathBuf>,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(lab) = report.downcast_ref::<LabError>() {
            return ExitCode::from(map_exit_code(lab));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &LabError) -> u8 {
    match error {
        LabError::RecordNotFound(_)
        | LabError::DuplicateRecord(_)
        | LabError::UnknownColumn(_)
        | LabError::UnknownField(_)
        | LabError::DuplicateColumn(_)
        | LabError::InvalidColumnName(_)
        | LabError::ImmutableField(_)
        | LabError::InvalidValue { .. }
        | LabError::InvalidMapping(_)
        | LabError::InvalidSource(_)
        | LabError::InvalidSort(_)
        | LabError::NoUploadedRows
        | LabError::EmptyDataset(_)
        | LabError::UploadTooLarge { .. }
        | LabError::UploadEmpty
        | LabError::ConfigInvalid(_) => 2,
        LabError::CatalogHttp(_) | LabError::CatalogStatus { .. } | LabError::CatalogDecode(_) => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.non_interactive {
        OutputMode::NonInteractive
    } else {
        OutputMode::Interactive
    };

    let config = ConfigLoader::resolve(cli.config.as_deref())?;
    let store = Store::open(config.store_dir.clone())?;

    match cli.command {
        Some(Command::Fetch) => {
            let client = CatalogHttpClient::new(&config.catalog_base_url)?;
            run_command(Command::Fetch, open_app(store, client, &config), output_mode)
        }
        Some(command) => run_command(command, open_app(store, NopCatalog, &config), output_mode),
        None => match output_mode {
            OutputMode::Interactive => {
                let mut app = open_app(store, NopCatalog, &config);
                Browser::new(DatasetSource::Api, GridQuery::default()).run(&mut app)
            }
            OutputMode::NonInteractive => Err(miette::Report::msg(
                "command required (try `pokelab --help`)",
            )),
        },
    }
}

fn open_app<C: CatalogClient>(store: Store, client: C, config: &ResolvedConfig) -> App<C> {
    let (app, summary) = App::open(AppState::new(store), client, config.pipeline.clone());
    tracing::debug!(?summary, "opened local store");
    app
}

fn run_fetch<C: CatalogClient + 'static>(
    mut app: App<C>,
    output_mode: OutputMode,
) -> miette::Result<()> {
    match output_mode {
        OutputMode::NonInteractive => {
            let result = app.fetch(&JsonOutput)?;
            JsonOutput::print_fetch(&result).into_diagnostic()?;
            Ok(())
        }
        OutputMode::Interactive => {
            let mut tui = Tui::new(OperationKind::Fetch);
            let result = tui.run(move |sink| app.fetch(sink))?;
            print_fetch_summary(&result);
            Ok(())
        }
    }
}

fn run_command<C: CatalogClient + 'static>(
    command: Command,
    mut app: App<C>,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let json = matches!(output_mode, OutputMode::NonInteractive);
    match command {
        Command::Fetch => return run_fetch(app, output_mode),
        Command::Upload(args) => {
            let result = match output_mode {
                OutputMode::NonInteractive => app.upload(&args.file, args.mappings, &JsonOutput)?,
                OutputMode::Interactive => {
                    let mut tui = Tui::new(OperationKind::Upload);
                    let file = args.file;
                    let mappings = args.mappings;
                    tui.run(move |sink| app.upload(&file, mappings, sink))?
                }
            };
            if json {
                JsonOutput::print_upload(&result).into_diagnostic()?;
            } else {
                print_upload_summary(&result);
            }
        }
        Command::Map(args) => {
            let result = app.map(args.mappings)?;
            if json {
                JsonOutput::print_map(&result).into_diagnostic()?;
            } else {
                print_map_summary(&result);
            }
        }
        Command::View(args) => {
            let query = GridQuery {
                search: args.search,
                sort: args.sort,
                page: (args.page - 1) as usize,
                page_size: args.page_size,
            };
            if json {
                let page = app.view(args.source.source, &query);
                JsonOutput::print_page(&page).into_diagnostic()?;
            } else {
                Browser::new(args.source.source, query).run(&mut app)?;
            }
        }
        Command::Edit(args) => {
            let record = app.edit(args.source.source, &args.id, &args.field, &args.value)?;
            if json {
                JsonOutput::print_record(&record).into_diagnostic()?;
            } else {
                println!("updated {} of {}", args.field, record.id);
            }
        }
        Command::Column(args) => match args.command {
            ColumnCommand::Add {
                source,
                name,
                column_type,
                default,
            } => {
                let column = app.add_column(source.source, &name, column_type, &default)?;
                if json {
                    JsonOutput::print_column(&column).into_diagnostic()?;
                } else {
                    println!(
                        "added column {} ({}) default {}",
                        column.id, column.column_type, column.default_value
                    );
                }
            }
            ColumnCommand::Remove { source, id } => {
                let list = app.remove_column(source.source, &id)?;
                if json {
                    JsonOutput::print_columns(&list).into_diagnostic()?;
                } else {
                    println!("removed column {id}");
                }
            }
            ColumnCommand::List(source) => {
                let list = app.columns(source.source);
                if json {
                    JsonOutput::print_columns(&list).into_diagnostic()?;
                } else if list.columns.is_empty() {
                    println!("no custom columns on {}", list.source);
                } else {
                    for column in &list.columns {
                        println!(
                            "{}\t{}\t{}\tdefault {}",
                            column.id, column.name, column.column_type, column.default_value
                        );
                    }
                }
            }
        },
        Command::Export(args) => {
            let result = app.export(args.source.source, args.out)?;
            if json {
                JsonOutput::print_export(&result).into_diagnostic()?;
            } else {
                println!("exported {} rows to {}", result.rows, result.path);
            }
        }
        Command::Clear(args) => match output_mode {
            OutputMode::NonInteractive => {
                let result = app.clear(args.source, &JsonOutput);
                JsonOutput::print_clear(&result).into_diagnostic()?;
            }
            OutputMode::Interactive => {
                let mut tui = Tui::new(OperationKind::Clear);
                if !tui.confirm_clear(args.source)? {
                    return Ok(());
                }
                let result = app.clear(args.source, &JsonOutput);
                println!("cleared {} data", result.source);
            }
        },
    }
    Ok(())
}

fn parse_page_size(value: &str) -> Result<usize, String> {
    let size = value
        .parse::<usize>()
        .map_err(|err| format!("invalid page size: {err}"))?;
    if PAGE_SIZES.contains(&size) {
        Ok(size)
    } else {
        Err(format!("page size must be one of {PAGE_SIZES:?}"))
    }
}

fn print_fetch_summary(result: &FetchResult) {
    let green = "\x1b[32m";
    let yellow = "\x1b[33m";
    let cyan = "\x1b[36m";
    let reset = "\x1b[0m";

    println!("{cyan}pokelab fetch summary{reset}");
    println!(
        "{green}fetched {} of {} catalog entries{reset}",
        result.fetched, result.listed
    );
    if !result.failed.is_empty() {
        println!(
            "{yellow}{} detail fetches failed: {}{reset}",
            result.failed.len(),
            result.failed.join(", ")
        );
    }
    if result.persist_failures > 0 {
        println!(
            "{yellow}{} writes to the local store failed; see logs{reset}",
            result.persist_failures
        );
    }
}

fn print_upload_summary(result: &UploadResult) {
    println!(
        "uploaded {} rows from {}",
        result.rows,
        result.file_name.as_deref().unwrap_or("file")
    );
    println!("columns: {}", result.columns.join(", "));
    match &result.mapped {
        Some(mapped) => print_map_summary(mapped),
        None => println!("next: pokelab map --map COLUMN=FIELD ..."),
    }
}

fn print_map_summary(result: &MapResult) {
    println!("mapped {} records", result.records);
    for mapping in &result.mappings {
        println!(
            "  {} -> {} ({})",
            mapping.uploaded_column, mapping.pokemon_field, mapping.data_type
        );
    }
    if !result.unmapped_columns.is_empty() {
        println!("unmapped: {}", result.unmapped_columns.join(", "));
    }
}

/// Stands in for the network client on commands that only touch local data.
struct NopCatalog;

impl CatalogClient for NopCatalog {
    fn list(&self, _limit: usize, _offset: usize) -> Result<CatalogPage, LabError> {
        Err(LabError::CatalogHttp(
            "catalog client not configured".to_string(),
        ))
    }

    fn detail(&self, _identifier: &str) -> Result<DetailPayload, LabError> {
        Err(LabError::CatalogHttp(
            "catalog client not configured".to_string(),
        ))
    }
}
