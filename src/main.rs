use std::io::{self, Write};
use std::path::PathBuf;
use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{self, Args, Parser, Subcommand};
use tracing::{error, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod db;
mod error;
mod export;
mod prompt;
mod report;
mod survey;

use config::Config;
use db::{Database, Ratings, ResponseStore, SchemaManager, SchemaVersion};
use report::Filter;

#[derive(Parser)]
#[command(name = "Wellbeing Survey")]
#[command(about = "Collect and review employee stress and motivation ratings", long_about = None)]
struct Cli {
    /// Path of TOML config file
    #[arg(short, long, value_name = "FILEPATH")]
    config: Option<PathBuf>,

    /// Path of survey database, overriding the config
    #[arg(long, value_name = "FILEPATH")]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List departments a response can be filed under
    Departments,

    /// Submit one survey response
    Submit {
        #[arg(short, long, value_parser = parse_department)]
        department: String,

        /// Answers to the three stress questions
        #[arg(
            short,
            long,
            num_args = 3,
            required = true,
            value_names = ["Q1", "Q2", "Q3"],
            value_parser = clap::value_parser!(i64).range(survey::RATING_RANGE)
        )]
        stress: Vec<i64>,

        /// Answers to the three motivation questions
        #[arg(
            short,
            long,
            num_args = 3,
            required = true,
            value_names = ["Q1", "Q2", "Q3"],
            value_parser = clap::value_parser!(i64).range(survey::RATING_RANGE)
        )]
        motivation: Vec<i64>,
    },

    /// Print the survey questions
    Questions,

    /// Show the shape of the survey database without changing it
    Schema,

    /// Print a SHA-256 digest of a new HR password for the config file
    HashPassword,

    /// List raw responses (HR)
    List(FilterArgs),

    /// Show averages per department, or monthly trend for one (HR)
    Summary(FilterArgs),

    /// Export averages as an Excel workbook, or raw responses as CSV (HR)
    Export {
        #[command(flatten)]
        filter: FilterArgs,

        /// Output file; defaults to a name derived from the filters
        #[arg(short, long, value_name = "FILEPATH")]
        out: Option<PathBuf>,

        /// Export raw responses as CSV instead of averages
        #[arg(long)]
        raw: bool,
    },

    /// Delete responses matching the filters, or all of them (HR)
    Delete {
        #[command(flatten)]
        filter: FilterArgs,

        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Args)]
struct FilterArgs {
    /// Only this department; labels outside the current list are accepted
    #[arg(short, long, value_parser = parse_filter_department)]
    department: Option<String>,

    /// First date to include (YYYY-MM-DD)
    #[arg(long, value_name = "DATE", value_parser = parse_date)]
    from: Option<NaiveDate>,

    /// Last date to include (YYYY-MM-DD)
    #[arg(long, value_name = "DATE", value_parser = parse_date)]
    to: Option<NaiveDate>,
}

impl From<FilterArgs> for Filter {
    fn from(args: FilterArgs) -> Self {
        Filter {
            department: args.department,
            start_date: args.from,
            end_date: args.to,
        }
    }
}

fn parse_department(s: &str) -> Result<String, String> {
    survey::find_department(s)
        .map(str::to_string)
        .ok_or_else(|| format!("unknown department; expected one of: {}", survey::DEPARTMENTS.join("; ")))
}

/// Known departments are matched case-insensitively; anything else is kept
/// as typed so rows filed under retired labels can still be reached.
fn parse_filter_department(s: &str) -> Result<String, String> {
    if let Some(dept) = survey::find_department(s) {
        return Ok(dept.to_string());
    }

    let label = s.trim();
    if label.is_empty() {
        return Err("department must not be empty".to_string());
    }
    Ok(label.to_string())
}

fn parse_date(s: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| format!("{} (expected YYYY-MM-DD)", e))
}

const DEFAULT_LOG_FILTER: &str = "info";

fn log_filter(from_env: Option<String>) -> String {
    from_env
        .filter(|f| !f.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string())
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(log_filter(std::env::var("RUST_LOG").ok())))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let mut config = config::get_config(cli.config.as_deref())?;
    if let Some(db_path) = cli.db {
        config.set_db_path(db_path);
    }

    match cli.command {
        Command::Departments => {
            survey::DEPARTMENTS.iter().for_each(|d| println!("{}", d));
            return Ok(());
        }
        Command::Questions => {
            print_questions();
            return Ok(());
        }
        Command::HashPassword => {
            let password = prompt::read_password("New HR password: ")?;
            let again = prompt::read_password("Repeat password: ")?;
            if password != again {
                bail!("Passwords do not match");
            }
            println!("hr_password_sha256 = \"{}\"", config::hash_password(&password));
            return Ok(());
        }
        _ => {}
    }

    let db = Database::new(config.db_path.clone());
    let schema = SchemaManager::new(db.clone());

    if let Command::Schema = cli.command {
        return print_schema(&schema, &config);
    }

    schema
        .ensure_current_schema()
        .map_err(|e| {
            if e.is_fatal() {
                error!("Survey database cannot be used: {}", e);
            } else {
                error!("Survey database left in its previous shape: {}", e);
            }
            e
        })
        .with_context(|| format!("Failed to prepare database {}", db.path().display()))?;

    let store = ResponseStore::new(db);

    match cli.command {
        Command::Submit { department, stress, motivation } => {
            submit(&store, &department, stress, motivation)
        }
        Command::List(args) => {
            authorize_hr(&config)?;
            list(&store, args.into())
        }
        Command::Summary(args) => {
            authorize_hr(&config)?;
            summary(&store, args.into())
        }
        Command::Export { filter, out, raw } => {
            authorize_hr(&config)?;
            export(&store, filter.into(), out, raw)
        }
        Command::Delete { filter, yes } => {
            authorize_hr(&config)?;
            let confirm = || prompt::confirm("This cannot be undone. Delete them?");
            delete(&store, filter.into(), yes, confirm, &mut io::stdout().lock())?;
            Ok(())
        }
        Command::Departments | Command::Questions | Command::HashPassword | Command::Schema => Ok(()),
    }
}

fn print_questions() {
    println!("Stress");
    for (i, q) in survey::STRESS_QUESTIONS.iter().enumerate() {
        println!("  {}.) {}", i + 1, q);
    }
    println!("Motivation");
    for (i, q) in survey::MOTIVATION_QUESTIONS.iter().enumerate() {
        println!("  {}.) {}", i + 4, q);
    }
}

fn print_schema(schema: &SchemaManager, config: &Config) -> Result<()> {
    let shape = match schema.version()? {
        SchemaVersion::Absent => "no responses table yet",
        SchemaVersion::Legacy => "legacy (stress, motivation); migrated on next use",
        SchemaVersion::Current => "current (three questions per dimension)",
    };

    println!("Database: {}", config.db_path.display());
    println!("Responses table: {}", if schema.table_exists()? { "present" } else { "missing" });
    println!("Legacy columns: {}", if schema.has_legacy_shape()? { "yes" } else { "no" });
    println!("Schema: {}", shape);

    Ok(())
}

fn authorize_hr(config: &Config) -> Result<()> {
    ensure_hr_enabled(config)?;
    let password = prompt::read_password("Enter HR password: ")?;
    check_hr_access(config, &password)
}

fn ensure_hr_enabled(config: &Config) -> Result<()> {
    if !config.hr_enabled() {
        bail!("HR access is not configured; add hr_password_sha256 to the config (see `hash-password`)");
    }
    Ok(())
}

fn check_hr_access(config: &Config, password: &str) -> Result<()> {
    ensure_hr_enabled(config)?;
    if !config.verify_hr_password(password) {
        warn!("Rejected HR password");
        bail!("Incorrect password.");
    }

    Ok(())
}

fn submit(store: &ResponseStore, department: &str, stress: Vec<i64>, motivation: Vec<i64>) -> Result<()> {
    let stress: [i64; 3] = stress
        .try_into()
        .map_err(|_| anyhow::anyhow!("Expected three stress answers"))?;
    let motivation: [i64; 3] = motivation
        .try_into()
        .map_err(|_| anyhow::anyhow!("Expected three motivation answers"))?;
    let ratings = Ratings::new(stress, motivation);

    println!("Your average stress: {:.2}/10", survey::round2(ratings.stress_avg()));
    println!("Your average motivation: {:.2}/10", survey::round2(ratings.motivation_avg()));

    store.add_response(department, ratings)?;
    println!("Thank you, your response has been saved.");

    Ok(())
}

fn list(store: &ResponseStore, filter: Filter) -> Result<()> {
    let rows = store.load_all()?;
    let selected = filter.apply(&rows);
    if selected.is_empty() {
        println!("No data available for the selected period or department.");
        return Ok(());
    }

    println!(
        "{:>6}  {:<20}  {:<32}  {:<8}  {:<8}",
        "id", "timestamp", "department", "stress", "motiv."
    );
    for r in selected {
        let ts = r
            .timestamp
            .map(|ts| ts.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "unknown".to_string());
        let s = r.ratings.stress;
        let m = r.ratings.motivation;
        println!(
            "{:>6}  {:<20}  {:<32}  {}/{}/{}     {}/{}/{}",
            r.id, ts, r.department, s[0], s[1], s[2], m[0], m[1], m[2]
        );
    }

    Ok(())
}

fn summary(store: &ResponseStore, filter: Filter) -> Result<()> {
    let rows = store.load_all()?;
    let selected = filter.apply(&rows);
    let timeframe = report::timeframe_label(filter.start_date, filter.end_date);

    if selected.is_empty() {
        println!("No data available for the selected period or department.");
        return Ok(());
    }

    match &filter.department {
        None => {
            println!("All departments: {}\n", timeframe);
            let summaries = report::summarize_by_department(&selected);
            print_summary_table(&summaries);
            println!("\nTotal number of responses (all departments): {}", selected.len());

            let critical = report::critical_departments(&summaries);
            if critical.is_empty() {
                println!("No critical departments identified.");
            } else {
                println!(
                    "Critical departments (stress >= {} or motivation <= {}):",
                    report::CRITICAL_STRESS,
                    report::CRITICAL_MOTIVATION
                );
                for s in critical {
                    println!("  {} (stress {:.2}, motivation {:.2})", s.department, s.stress, s.motivation);
                }
            }
        }
        Some(dept) => {
            println!("{}: {}\n", dept, timeframe);
            if let Some(s) = report::summarize(dept, &selected) {
                println!("Average motivation: {:.2}/10", s.motivation);
                println!("Average stress: {:.2}/10", s.stress);
                println!("Number of responses: {}", s.responses);
            }

            let trend = report::monthly_trend(&selected);
            if !trend.is_empty() {
                println!("\n{:<8}  {:>10}  {:>6}  {:>9}", "month", "motivation", "stress", "responses");
                for t in trend {
                    println!(
                        "{:<8}  {:>10.2}  {:>6.2}  {:>9}",
                        t.month, t.motivation, t.stress, t.responses
                    );
                }
            }
        }
    }

    Ok(())
}

fn print_summary_table(summaries: &[report::DepartmentSummary]) {
    println!("{:<32}  {:>10}  {:>6}  {:>9}", "department", "motivation", "stress", "responses");
    for s in summaries {
        println!(
            "{:<32}  {:>10.2}  {:>6.2}  {:>9}",
            s.department, s.motivation, s.stress, s.responses
        );
    }
}

fn export(store: &ResponseStore, filter: Filter, out: Option<PathBuf>, raw: bool) -> Result<()> {
    let rows = store.load_all()?;
    let selected = filter.apply(&rows);
    if selected.is_empty() {
        println!("No data available for the selected period or department.");
        return Ok(());
    }

    let department = filter.department.as_deref();
    let path = out.unwrap_or_else(|| export::default_file_name(department, raw));

    if raw {
        export::write_file(&path, |w| export::write_responses(w, &selected))?;
    } else {
        let sheet = export::sheet_name(department);
        let mut workbook = match department {
            None => {
                let means = report::question_means_by_department(&selected);
                export::question_means_workbook(&sheet, Some("department"), &means)?
            }
            Some(dept) => {
                let means: Vec<_> = report::question_means(dept, &selected).into_iter().collect();
                export::question_means_workbook(&sheet, None, &means)?
            }
        };
        export::save_workbook(&mut workbook, &path)?;
    }

    println!("Exported {} responses to {}", selected.len(), path.display());
    Ok(())
}

/// Returns the number of rows deleted. `confirm` is only asked when
/// something matches and `yes` is not set.
fn delete(
    store: &ResponseStore,
    filter: Filter,
    yes: bool,
    confirm: impl FnOnce() -> Result<bool>,
    out: &mut impl Write,
) -> Result<usize> {
    let department = filter.department.as_deref();
    let matching = store.count_matching(department, filter.start_date, filter.end_date)?;

    if matching == 0 {
        writeln!(out, "No responses match.")?;
        return Ok(0);
    }

    if filter.is_empty() {
        writeln!(out, "No filters given: this deletes ALL {} responses.", matching)?;
    } else {
        writeln!(
            out,
            "{} responses match ({}, {}).",
            matching,
            department.unwrap_or("all departments"),
            report::timeframe_label(filter.start_date, filter.end_date)
        )?;
    }
    out.flush()?;

    if !yes && !confirm()? {
        writeln!(out, "Nothing deleted.")?;
        return Ok(0);
    }

    let deleted = store.delete_responses(department, filter.start_date, filter.end_date)?;
    writeln!(out, "Deleted {} responses.", deleted)?;

    Ok(deleted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use tempfile::{tempdir, TempDir};

    fn test_store() -> (TempDir, ResponseStore) {
        let tmp = tempdir().unwrap();
        let db = Database::new(tmp.path().join("wellbeing.db"));
        SchemaManager::new(db.clone()).ensure_current_schema().unwrap();
        (tmp, ResponseStore::new(db))
    }

    fn hr_config(password: &str) -> Config {
        Config {
            hr_password_sha256: Some(config::hash_password(password)),
            ..Default::default()
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_filter_accepts_retired_department() {
        let cli = Cli::try_parse_from(["wellbeing", "delete", "--department", "Legacy Dept"]).unwrap();
        match cli.command {
            Command::Delete { filter, yes } => {
                assert_eq!(filter.department.as_deref(), Some("Legacy Dept"));
                assert!(!yes);
            }
            _ => panic!("expected delete"),
        }

        assert!(Cli::try_parse_from(["wellbeing", "summary", "-d", "Legacy Dept"]).is_ok());
        assert!(Cli::try_parse_from(["wellbeing", "list", "-d", "  "]).is_err());
    }

    #[test]
    fn test_filter_canonicalizes_known_department() {
        let cli = Cli::try_parse_from(["wellbeing", "list", "-d", "ova"]).unwrap();
        match cli.command {
            Command::List(filter) => assert_eq!(filter.department.as_deref(), Some("OVA")),
            _ => panic!("expected list"),
        }
    }

    #[test]
    fn test_submit_still_requires_known_department() {
        let args = ["wellbeing", "submit", "-d", "Legacy Dept", "-s", "1", "2", "3", "-m", "4", "5", "6"];
        assert!(Cli::try_parse_from(args).is_err());

        let args = ["wellbeing", "submit", "-d", "OVA", "-s", "1", "2", "3", "-m", "4", "5", "6"];
        assert!(Cli::try_parse_from(args).is_ok());
    }

    #[test]
    fn test_retired_department_rows_can_be_deleted() {
        let (_tmp, store) = test_store();
        store.add_response("Legacy Dept", Ratings::default()).unwrap();
        store.add_response("OVA", Ratings::default()).unwrap();

        let cli = Cli::try_parse_from(["wellbeing", "delete", "-d", "Legacy Dept", "--yes"]).unwrap();
        let Command::Delete { filter, yes } = cli.command else {
            panic!("expected delete");
        };

        let mut out = Vec::new();
        let deleted = delete(&store, filter.into(), yes, || Ok(true), &mut out).unwrap();
        assert_eq!(deleted, 1);

        let left = store.load_all().unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].department, "OVA");
    }

    #[test]
    fn test_delete_with_yes_skips_confirmation() {
        let (_tmp, store) = test_store();
        store.add_response("OVA", Ratings::default()).unwrap();

        let asked = Cell::new(false);
        let confirm = || {
            asked.set(true);
            Ok(false)
        };

        let mut out = Vec::new();
        assert_eq!(delete(&store, Filter::default(), true, confirm, &mut out).unwrap(), 1);
        assert!(!asked.get());
        assert!(store.load_all().unwrap().is_empty());
    }

    #[test]
    fn test_declined_confirmation_deletes_nothing() {
        let (_tmp, store) = test_store();
        store.add_response("OVA", Ratings::default()).unwrap();
        store.add_response("Administration", Ratings::default()).unwrap();

        let filter = Filter { department: Some("OVA".into()), ..Default::default() };
        let mut out = Vec::new();
        assert_eq!(delete(&store, filter, false, || Ok(false), &mut out).unwrap(), 0);

        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("1 responses match (OVA, All time)."));
        assert!(text.contains("Nothing deleted."));
        assert_eq!(store.load_all().unwrap().len(), 2);
    }

    #[test]
    fn test_full_wipe_is_announced() {
        let (_tmp, store) = test_store();
        store.add_response("OVA", Ratings::default()).unwrap();
        store.add_response("Administration", Ratings::default()).unwrap();

        let mut out = Vec::new();
        assert_eq!(delete(&store, Filter::default(), false, || Ok(true), &mut out).unwrap(), 2);

        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("No filters given: this deletes ALL 2 responses."));
        assert!(text.contains("Deleted 2 responses."));
        assert!(store.load_all().unwrap().is_empty());
    }

    #[test]
    fn test_nothing_matching_never_asks() {
        let (_tmp, store) = test_store();
        store.add_response("OVA", Ratings::default()).unwrap();

        let filter = Filter {
            start_date: Some(date(2000, 1, 1)),
            end_date: Some(date(2000, 1, 31)),
            ..Default::default()
        };
        let mut out = Vec::new();
        let confirm = || -> Result<bool> { panic!("should not ask") };
        assert_eq!(delete(&store, filter, false, confirm, &mut out).unwrap(), 0);
        assert_eq!(String::from_utf8(out).unwrap(), "No responses match.\n");
    }

    #[test]
    fn test_hr_access() {
        let config = hr_config("s3cret");
        assert!(check_hr_access(&config, "s3cret").is_ok());

        let err = check_hr_access(&config, "HR123").unwrap_err();
        assert_eq!(err.to_string(), "Incorrect password.");
        assert!(check_hr_access(&config, "").is_err());

        let unset = Config::default();
        let err = check_hr_access(&unset, "").unwrap_err();
        assert!(err.to_string().contains("not configured"));
    }

    #[test]
    fn test_log_filter_defaults_to_info() {
        assert_eq!(log_filter(None), "info");
        assert_eq!(log_filter(Some(String::new())), "info");
        assert_eq!(log_filter(Some("wellbeing=debug".into())), "wellbeing=debug");
    }
}
