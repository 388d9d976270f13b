use std::{env, fs, path::PathBuf, process, time::Duration};

use anyhow::{Context, Result};
use chrono::Local;
use clap::{Args, Parser, Subcommand};
use log::{error, info};
use serde_json::{Map, Value};

use catalog_sync::{
    calendar,
    fetch::make_client,
    ratings::{self, Professor, RateMyProfessors},
    schedule::SECTIONS_URL,
    simplify,
    store::{read_json, write_csv, write_json},
    synchronize, ClassSchedule, Course, RateLimiter, Session, SyncOptions, TitleCodeIndex,
};

#[derive(Parser, Debug)]
#[clap(version, about = "Scrapes the class schedule and professor ratings")]
struct CliArgs {
    /// Logging verbosity level (valid values: off, error, warn, info, debug, trace)
    #[clap(short, long, value_name = "LEVEL", default_value = "info", global = true)]
    verbosity: log::LevelFilter,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Reshape the raw catalog into the course/section document
    Simplify {
        #[clap(long, default_value = "parsed_classes.json")]
        catalog: PathBuf,
        #[clap(short, long, default_value = "simplified_courses.json")]
        output: PathBuf,
    },
    /// Fetch meeting times for every section of the simplified catalog
    Times(TimesArgs),
    /// Scrape every professor of a school from the ratings site
    Professors(ProfessorsArgs),
    /// Fetch the full ratings page of every saved professor
    Reviews(ReviewsArgs),
    /// Print saved professors whose first or last name contains NAME
    Lookup {
        name: String,
        #[clap(long, default_value = "byu_professors.json")]
        professors: PathBuf,
    },
    /// Collect assignment due dates from the calendar feeds listed in SOURCES
    Calendar {
        #[clap(long, default_value = "icals.txt")]
        sources: PathBuf,
        #[clap(short, long, default_value = "schedule.json")]
        output: PathBuf,
    },
}

#[derive(Args, Debug)]
struct TimesArgs {
    /// Session id issued by the class schedule site
    #[clap(long)]
    session_id: String,
    #[clap(long, default_value = "20261")]
    term: String,
    #[clap(long, default_value = "simplified_courses.json")]
    courses: PathBuf,
    /// Raw catalog the title codes are read from
    #[clap(long, default_value = "parsed_classes.json")]
    catalog: PathBuf,
    #[clap(short, long, default_value = "simplified_courses_with_times_final.json")]
    output: PathBuf,
    #[clap(long, default_value = SECTIONS_URL)]
    url: String,
    /// Minimum time between two requests
    #[clap(long, value_name = "MS", default_value = "130")]
    delay_ms: u64,
    /// Requests allowed in flight at once
    #[clap(long, default_value = "1")]
    concurrency: usize,
}

#[derive(Args, Debug)]
struct ProfessorsArgs {
    #[clap(long, default_value = ratings::BYU_SCHOOL_ID)]
    school_id: String,
    #[clap(long, default_value = "100")]
    batch_size: u32,
    #[clap(long, value_name = "MS", default_value = "1000")]
    delay_ms: u64,
    #[clap(long, default_value = "byu_professors.json")]
    json: PathBuf,
    #[clap(long, default_value = "byu_professors.csv")]
    csv: PathBuf,
    #[clap(long, default_value = ratings::GRAPHQL_URL)]
    url: String,
}

#[derive(Args, Debug)]
struct ReviewsArgs {
    #[clap(long, default_value = "byu_professors.json")]
    professors: PathBuf,
    #[clap(short, long, default_value = "professor_responses.json")]
    output: PathBuf,
    #[clap(long, value_name = "MS", default_value = "160")]
    delay_ms: u64,
    #[clap(long, default_value = ratings::GRAPHQL_URL)]
    url: String,
}

#[tokio::main]
async fn main() {
    let cli_args = CliArgs::parse();
    if env::var(env_logger::DEFAULT_FILTER_ENV).is_ok() {
        env_logger::init();
    } else {
        env_logger::builder()
            .filter(Some(env!("CARGO_CRATE_NAME")), cli_args.verbosity)
            .format_timestamp(None)
            .format_target(false)
            .init();
    }

    if let Err(error) = run(cli_args.command).await {
        error!("{:?}", error);
        process::exit(1);
    }
}

async fn run(command: Command) -> Result<()> {
    match command {
        Command::Simplify { catalog, output } => {
            let raw: Map<String, Value> = read_json(&catalog)?;
            let courses = simplify(&raw);
            write_json(&output, &courses)?;
            info!(
                "saved {} of {} courses to {}",
                courses.len(),
                raw.len(),
                output.display()
            );
        }
        Command::Times(args) => times(args).await?,
        Command::Professors(args) => professors(args).await?,
        Command::Reviews(args) => reviews(args).await?,
        Command::Calendar { sources, output } => schedule(sources, output).await?,
        Command::Lookup { name, professors } => {
            let saved: Vec<Professor> = read_json(&professors)?;
            for professor in ratings::search(&saved, &name) {
                println!("{}", serde_json::to_string(professor)?);
            }
        }
    }

    Ok(())
}

async fn times(args: TimesArgs) -> Result<()> {
    // both inputs are read before the first request goes out
    let mut courses: Vec<Course> = read_json(&args.courses)?;
    let raw: Map<String, Value> = read_json(&args.catalog)?;
    let index = TitleCodeIndex::from_catalog(&raw);
    info!(
        "{} courses to fetch, {} title codes known",
        courses.len(),
        index.len()
    );

    let service = ClassSchedule::new(args.url).context("could not build http client")?;
    let session = Session {
        token: args.session_id,
        term: args.term,
    };
    let limiter = RateLimiter::every(Duration::from_millis(args.delay_ms));
    let options = SyncOptions {
        concurrency: args.concurrency,
    };

    let report = synchronize(&mut courses, &index, &session, &service, &limiter, &options).await;

    write_json(&args.output, &courses)?;
    info!(
        "saved {}: {} synced, {} skipped, {} failed, {} sections with times",
        args.output.display(),
        report.synced,
        report.skipped,
        report.failed,
        report.sections_with_times
    );
    Ok(())
}

async fn professors(args: ProfessorsArgs) -> Result<()> {
    let api = RateMyProfessors::new(args.url).context("could not build http client")?;
    let limiter = RateLimiter::every(Duration::from_millis(args.delay_ms));

    let professors = ratings::scrape_all(&api, &args.school_id, args.batch_size, &limiter).await;

    write_json(&args.json, &professors)?;
    info!("saved {}", args.json.display());
    write_csv(&args.csv, &professors)?;
    info!("saved {}", args.csv.display());

    let top = ratings::top_rated(&professors, 10, 10);
    if !top.is_empty() {
        println!("Top {} highest rated professors (min 10 ratings):", top.len());
    }
    for (rank, professor) in top.into_iter().enumerate() {
        println!(
            "{}. {} ({})",
            rank + 1,
            professor.full_name(),
            professor.department.as_deref().unwrap_or("unknown department")
        );
        println!(
            "   Rating: {:.1}/5.0 | Difficulty: {:.1} | {} ratings",
            professor.avg_rating.unwrap_or_default(),
            professor.avg_difficulty.unwrap_or_default(),
            professor.num_ratings.unwrap_or_default()
        );
    }

    Ok(())
}

async fn reviews(args: ReviewsArgs) -> Result<()> {
    let professors: Vec<Professor> = read_json(&args.professors)?;
    info!("fetching {} professors", professors.len());

    let api = RateMyProfessors::new(args.url).context("could not build http client")?;
    let limiter = RateLimiter::every(Duration::from_millis(args.delay_ms));

    let responses = ratings::fetch_reviews(&api, &professors, &limiter).await;

    write_json(&args.output, &responses)?;
    info!("saved {}", args.output.display());
    Ok(())
}

async fn schedule(sources: PathBuf, output: PathBuf) -> Result<()> {
    let text = fs::read_to_string(&sources)
        .with_context(|| format!("could not read {}", sources.display()))?;
    let sources = calendar::parse_sources(&text);
    info!("{} calendar sources", sources.len());

    let client = make_client().context("could not build http client")?;
    let events = calendar::collect_events(&client, &sources).await;
    let schedule = calendar::build_schedule(&sources, events, Local::now().naive_local());

    write_json(&output, &schedule)?;
    info!(
        "saved {} events to {}",
        schedule.total_events,
        output.display()
    );
    Ok(())
}
