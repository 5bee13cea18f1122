use std::path::PathBuf;

use clap::{Parser, Subcommand};
use jiratime::{
    CsvKind, ExportTarget, GenerateReportRequest, JiraTime, Period, ReportResult, TimeMode,
};

#[derive(Parser)]
#[command(name = "jiratime", about = "Time-in-status reports over issue tracker history")]
struct Cli {
    /// Database path (default: ~/.jiratime/jiratime.db)
    #[arg(long)]
    db: Option<String>,

    /// Increase logging verbosity
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import a JSON snapshot of issues and transitions
    Import {
        /// Snapshot file
        file: PathBuf,
    },
    /// Create, inspect and export reports
    Report {
        #[command(subcommand)]
        action: ReportAction,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Show what is stored locally
    Status,
}

#[derive(Subcommand)]
enum ReportAction {
    /// Compute and store a new report
    Create {
        #[arg(long)]
        title: String,
        /// Window start (RFC 3339 or YYYY-MM-DD)
        #[arg(long)]
        start: Option<String>,
        /// Window end (RFC 3339 or YYYY-MM-DD, default: now)
        #[arg(long)]
        end: Option<String>,
        /// Period: 30d, 2024, 2024-Q1, 2024-01, 2024-W05, ytd, qtd, mtd, wtd
        #[arg(long)]
        period: Option<String>,
        /// wall_clock or business_hours
        #[arg(long, default_value = "wall_clock")]
        mode: String,
        /// Restrict to a project key (repeatable)
        #[arg(long = "project", value_name = "KEY")]
        projects: Vec<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List stored reports
    List {
        #[arg(long)]
        json: bool,
    },
    /// Show a report's per-status totals
    Show {
        id: i64,
        #[arg(long)]
        json: bool,
    },
    /// Export a report table as CSV
    Export {
        id: i64,
        /// issues, transitions or stats
        #[arg(long, default_value = "issues")]
        kind: String,
        /// Output file (default: report-<id>-<kind>.csv, `-` for stdout)
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Delete a report (imported issues are kept)
    Delete { id: i64 },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Get a config value
    Get { key: String },
    /// Set a config value
    Set { key: String, value: String },
    /// List all config values
    List,
    /// Write default settings
    Init {
        /// Replace values that are already set
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let db = match &cli.db {
        Some(path) => jiratime::Database::open_at(path).await?,
        None => jiratime::Database::open().await?,
    };
    let jt = JiraTime::new(db);

    match cli.command {
        Commands::Import { file } => {
            let counts = jt.import_file(&file).await?;
            println!(
                "Imported {} issues and {} transitions from {}",
                counts.issues,
                counts.transitions,
                file.display()
            );
        }
        Commands::Report { action } => handle_report(&jt, action).await?,
        Commands::Config { action } => handle_config(&jt, action).await?,
        Commands::Status => {
            let counts = jt.status().await?;
            println!("Store Status");
            println!("  Issues:      {}", counts.issues);
            println!("  Transitions: {}", counts.transitions);
            println!("  Reports:     {}", counts.reports);
        }
    }

    Ok(())
}

async fn handle_report(jt: &JiraTime, action: ReportAction) -> anyhow::Result<()> {
    match action {
        ReportAction::Create {
            title,
            start,
            end,
            period,
            mode,
            projects,
            json,
        } => {
            let mut request = GenerateReportRequest::new(title);
            request.window_start = start
                .as_deref()
                .map(jiratime::date_util::parse_timestamp)
                .transpose()?;
            request.window_end = end
                .as_deref()
                .map(jiratime::date_util::parse_timestamp)
                .transpose()?;
            request.period = period.as_deref().map(Period::parse).transpose()?;
            request.time_mode = mode.parse::<TimeMode>()?;
            request.projects = projects;

            let result = jt.generate_report(request, chrono::Utc::now()).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                print_report(&result);
            }
        }
        ReportAction::List { json } => {
            let reports = jt.list_reports().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&reports)?);
            } else if reports.is_empty() {
                println!("No reports.");
            } else {
                for s in &reports {
                    println!(
                        "{:>4}  {:<30}  {:<14}  {} .. {}  {} issues",
                        s.report.id,
                        s.report.title,
                        s.report.time_mode.as_str(),
                        s.report.window_start.format("%Y-%m-%d %H:%M"),
                        s.report.window_end.format("%Y-%m-%d %H:%M"),
                        s.issue_count
                    );
                }
            }
        }
        ReportAction::Show { id, json } => {
            let result = jt.report(id).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                print_report(&result);
            }
        }
        ReportAction::Export { id, kind, output } => {
            let kind = kind.parse::<CsvKind>()?;
            let bytes = jt.export_csv(id, kind).await?;
            match ExportTarget::resolve(output.as_deref(), kind, id) {
                ExportTarget::File(path) => {
                    std::fs::write(&path, &bytes)?;
                    eprintln!("Wrote {} ({} bytes)", path.display(), bytes.len());
                }
                ExportTarget::Stdout => {
                    use std::io::Write;
                    std::io::stdout().write_all(&bytes)?;
                }
            }
        }
        ReportAction::Delete { id } => {
            jt.delete_report(id).await?;
            println!("Report {id} deleted.");
        }
    }
    Ok(())
}

async fn handle_config(jt: &JiraTime, action: ConfigAction) -> anyhow::Result<()> {
    match action {
        ConfigAction::Get { key } => match jt.config_get(&key).await? {
            Some(v) => println!("{key} = {v}"),
            None => println!("{key} is not set"),
        },
        ConfigAction::Set { key, value } => {
            jt.config_set(&key, &value).await?;
            println!("Config updated.");
        }
        ConfigAction::List => {
            let items = jt.config_list().await?;
            if items.is_empty() {
                println!("No config values set. Run 'jiratime config init' for defaults.");
            } else {
                for (k, v) in items {
                    println!("{k} = {v}");
                }
            }
        }
        ConfigAction::Init { force } => {
            let written = jt.config_init(force).await?;
            if written.is_empty() {
                println!("All defaults already set.");
            } else {
                println!("Wrote: {}", written.join(", "));
            }
        }
    }
    Ok(())
}

fn print_report(result: &ReportResult) {
    let r = &result.report;
    println!("Report {}: {}", r.id, r.title);
    println!("  Mode:   {}", r.time_mode);
    println!("  Window: {} .. {}", r.window_start, r.window_end);
    if !r.projects.is_empty() {
        println!("  Projects: {}", r.projects.join(", "));
    }
    println!("  Issues: {}", result.issues.len());
    if result.issues.is_empty() {
        return;
    }

    println!();
    for issue in &result.issues {
        println!("{}  {}  [{}]", issue.issue_key, issue.summary, issue.current_status);
        if let Some(buckets) = result.buckets.get(&issue.issue_key) {
            for (status, seconds) in buckets {
                println!("    {:<20} {:>10.2}h", status, *seconds as f64 / 3600.0);
            }
        }
    }
}
