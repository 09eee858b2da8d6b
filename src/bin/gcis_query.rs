use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use gcis_query::app::{App, BatchResult};
use gcis_query::config::ConfigLoader;
use gcis_query::domain::{CombineMode, split_input};
use gcis_query::error::GcisError;
use gcis_query::filter::BodQuery;
use gcis_query::gcis::GcisHttpClient;
use gcis_query::output::{CsvOutput, JsonOutput, OutputFormat};
use gcis_query::table::Table;

#[derive(Parser)]
#[command(name = "gcis-query")]
#[command(about = "Search Taiwanese company-registration open data (GCIS)")]
#[command(version)]
struct Cli {
    /// Config file (defaults to ./gcis-query.json when present)
    #[arg(long, global = true)]
    config: Option<String>,

    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Json)]
    format: OutputFormat,

    /// Write CSV output to this file instead of stdout
    #[arg(long, global = true)]
    output: Option<Utf8PathBuf>,

    /// Prefix CSV rows with a zero-based row index column
    #[arg(long, global = true)]
    index: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Company basic info by business number (comma-separated)")]
    Company { business_no: String },
    #[command(about = "Company keyword search (comma-separated keywords)")]
    Keyword {
        company_name: String,
        /// Company status code, 01 is approved/active
        #[arg(long)]
        status: Option<String>,
    },
    #[command(about = "Directors and supervisors by business number (comma-separated)")]
    Bod { business_no: String },
    #[command(about = "Monthly board-of-directors dataset")]
    Dataset(DatasetArgs),
}

#[derive(Args)]
struct DatasetArgs {
    #[command(subcommand)]
    command: DatasetCommand,
}

#[derive(Subcommand)]
enum DatasetCommand {
    #[command(about = "Download the current snapshot unless it is already cached")]
    Fetch,
    #[command(about = "Show the current snapshot path and cached snapshots")]
    Info,
    #[command(about = "Filter the cached dataset")]
    Search(SearchArgs),
}

#[derive(Args)]
struct SearchArgs {
    /// 統一編號, comma-separated
    #[arg(long)]
    business_no: Option<String>,
    /// 公司名稱, comma-separated
    #[arg(long)]
    company_name: Option<String>,
    /// 姓名, comma-separated
    #[arg(long)]
    director: Option<String>,
    /// 所代表法人, comma-separated
    #[arg(long)]
    representative_for: Option<String>,
    #[arg(long, value_enum, default_value_t = CombineMode::Union)]
    mode: CombineMode,
}

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(report) => {
            eprintln!("{report:?}");
            if let Some(gcis) = report.downcast_ref::<GcisError>() {
                return ExitCode::from(map_exit_code(gcis));
            }
            ExitCode::from(1)
        }
    }
}

fn map_exit_code(error: &GcisError) -> u8 {
    match error {
        GcisError::Http(_)
        | GcisError::Status { .. }
        | GcisError::InvalidJson(_)
        | GcisError::UnexpectedPayload(_) => 3,
        GcisError::ConfigRead(_)
        | GcisError::ConfigParse(_)
        | GcisError::InvalidTimezone(_)
        | GcisError::InvalidTimestampFormat(_)
        | GcisError::InvalidEncoding(_) => 2,
        _ => 1,
    }
}

fn run() -> miette::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = ConfigLoader::resolve(cli.config.as_deref())?;
    let client = GcisHttpClient::new(config.http)?;
    let app = App::new(client, config);
    let sink = Sink {
        format: cli.format,
        output: cli.output,
        index: cli.index,
    };

    match cli.command {
        Commands::Company { business_no } => {
            let ids = non_empty(split_input(&business_no))?;
            sink.batch(&app, &app.lookup_companies(&ids))
        }
        Commands::Keyword {
            company_name,
            status,
        } => {
            let names = non_empty(split_input(&company_name))?;
            sink.batch(&app, &app.lookup_keywords(&names, status.as_deref()))
        }
        Commands::Bod { business_no } => {
            let ids = non_empty(split_input(&business_no))?;
            sink.batch(&app, &app.lookup_bods(&ids))
        }
        Commands::Dataset(args) => match args.command {
            DatasetCommand::Fetch => {
                let path = app.fetch_bod_dataset()?;
                println!("{path}");
                Ok(ExitCode::SUCCESS)
            }
            DatasetCommand::Info => {
                JsonOutput::print_dataset_info(&app.dataset_info()?).into_diagnostic()?;
                Ok(ExitCode::SUCCESS)
            }
            DatasetCommand::Search(args) => {
                let query = BodQuery::from_inputs(
                    args.business_no.as_deref(),
                    args.company_name.as_deref(),
                    args.director.as_deref(),
                    args.representative_for.as_deref(),
                    args.mode,
                );
                if query.is_empty() {
                    return Err(miette::Report::msg(
                        "at least one filter is required (see `gcis-query dataset search --help`)",
                    ));
                }
                let table = app.search_bod_dataset(&query)?;
                sink.table(&app, &table)
            }
        },
    }
}

fn non_empty(items: Vec<String>) -> miette::Result<Vec<String>> {
    if items.is_empty() {
        return Err(miette::Report::msg("no query submitted"));
    }
    Ok(items)
}

struct Sink {
    format: OutputFormat,
    output: Option<Utf8PathBuf>,
    index: bool,
}

impl Sink {
    fn table(&self, app: &App<GcisHttpClient>, table: &Table) -> miette::Result<ExitCode> {
        if table.is_empty() {
            eprintln!("no matching records");
            return Ok(ExitCode::from(2));
        }
        match self.format {
            OutputFormat::Json => JsonOutput::print_table(table).into_diagnostic()?,
            OutputFormat::Csv => self.csv(app, table)?,
        }
        Ok(ExitCode::SUCCESS)
    }

    fn batch(&self, app: &App<GcisHttpClient>, result: &BatchResult) -> miette::Result<ExitCode> {
        for failure in &result.failures {
            eprintln!("{}: {}", failure.input, failure.error);
        }
        if matches!(self.format, OutputFormat::Json) {
            JsonOutput::print_batch(result).into_diagnostic()?;
        } else if !result.table.is_empty() {
            self.csv(app, &result.table)?;
        }
        if !result.table.is_empty() {
            return Ok(ExitCode::SUCCESS);
        }
        if result.failures.is_empty() {
            eprintln!("no matching records");
            Ok(ExitCode::from(2))
        } else {
            Ok(ExitCode::from(3))
        }
    }

    fn csv(&self, app: &App<GcisHttpClient>, table: &Table) -> Result<(), GcisError> {
        let bytes = app.export_csv(table, self.index)?;
        CsvOutput::write(&bytes, self.output.as_deref())
    }
}
