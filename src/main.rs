use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use attendance_forecast::cache::{age_description, AttendanceCache};
use attendance_forecast::config::Config;
use attendance_forecast::coordinator::{AttendanceCoordinator, AttendanceView, DataOrigin, LoadPhase};
use attendance_forecast::extract::{link_registers, RegisterExtractor, SummaryExtractor};
use attendance_forecast::models::{CacheKey, SubjectAttendance};
use attendance_forecast::portal::FileSource;
use attendance_forecast::report;
use clap::{ArgGroup, Args, Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "attendance-forecast")]
#[command(about = "Offline-aware attendance tracker and forecast for Group Scholar", long_about = None)]
struct Cli {
    /// TOML config file
    #[arg(long, env = "ATTENDANCE_CONFIG", global = true)]
    config: Option<PathBuf>,
    /// SQLite cache location; overrides cache.url
    #[arg(long, env = "ATTENDANCE_CACHE_URL", global = true)]
    cache_url: Option<String>,
    /// Emit logs as JSON
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct KeyArgs {
    #[arg(long)]
    user: String,
    #[arg(long)]
    institution: String,
    #[arg(long)]
    session: String,
}

impl KeyArgs {
    fn key(&self) -> CacheKey {
        CacheKey::new(&self.user, &self.institution, &self.session)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the cache schema
    InitCache,
    /// Extract saved portal pages without touching the cache
    #[command(group(
        ArgGroup::new("pages")
            .args(["summary", "register"])
            .required(true)
            .multiple(true)
    ))]
    Parse {
        #[arg(long)]
        summary: Option<PathBuf>,
        #[arg(long)]
        register: Option<PathBuf>,
    },
    /// Refresh the cache from saved portal pages
    Sync {
        #[command(flatten)]
        key: KeyArgs,
        #[arg(long)]
        summary: PathBuf,
        #[arg(long)]
        register: Option<PathBuf>,
    },
    /// Show cached attendance and its age
    Status {
        #[command(flatten)]
        key: KeyArgs,
        /// Drop every cached entry for the key
        #[arg(long)]
        clear: bool,
    },
    /// Project attendance after missing more lectures
    Project {
        #[command(flatten)]
        key: KeyArgs,
        #[arg(long, default_value_t = 1)]
        miss: i64,
        /// Saved summary page used when the cache is missing or stale
        #[arg(long)]
        summary: Option<PathBuf>,
        #[arg(long)]
        csv: Option<PathBuf>,
    },
    /// Generate a markdown report
    Report {
        #[command(flatten)]
        key: KeyArgs,
        #[arg(long, default_value_t = 1)]
        miss: i64,
        #[arg(long)]
        summary: Option<PathBuf>,
        #[arg(long, default_value = "attendance-report.md")]
        out: PathBuf,
    },
}

fn init_tracing(level: &str, json: bool) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| level.to_string().into());

    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref()).context("failed to load config")?;
    if let Some(url) = cli.cache_url.clone() {
        config.cache.url = url;
    }
    init_tracing(&config.logging.level, cli.json || config.logging.json);

    if let Commands::Parse { summary, register } = &cli.command {
        return parse_pages(&config, summary.as_deref(), register.as_deref());
    }

    let cache = AttendanceCache::connect(&config.cache.url, config.cache.ttl())
        .await
        .with_context(|| format!("failed to open cache at {}", config.cache.url))?;
    let cache = Arc::new(cache);

    match cli.command {
        Commands::InitCache => {
            cache.init().await?;
            println!("Cache ready.");
        }
        Commands::Parse { .. } => {}
        Commands::Sync {
            key,
            summary,
            register,
        } => {
            let has_register = register.is_some();
            let coordinator = coordinator(&config, &cache, key.key(), summary, register);
            let outcome = coordinator
                .refresh()
                .await
                .with_context(|| format!("sync failed for {}", coordinator.key()))?;
            println!(
                "Synced {} subjects for {}.",
                outcome.subjects,
                coordinator.key()
            );
            for skipped in outcome.skipped.iter() {
                println!("- skipped {skipped}");
            }

            if has_register {
                let registers = coordinator.load_register().await?;
                println!("Register: {} subjects.", registers.links.len());
                for link in registers.links.iter() {
                    let tally = link.register.tally();
                    let rule = match link.rule {
                        Some(rule) => format!("{rule:?}").to_lowercase(),
                        None => "nothing".to_string(),
                    };
                    println!(
                        "- {} linked by {rule}: {} present, {} absent",
                        link.register.subject_name, tally.present, tally.absent
                    );
                }
            }
        }
        Commands::Status { key, clear } => {
            let key = key.key();
            if clear {
                let removed = cache.invalidate(&key).await?;
                println!("Removed {removed} cached entries for {key}.");
                return Ok(());
            }
            match cache.get::<Vec<SubjectAttendance>>(&key).await? {
                None => println!("No cached attendance for {key}."),
                Some(entry) => {
                    let freshness = if cache.is_valid(&entry) { "fresh" } else { "stale" };
                    println!(
                        "{key}: {} subjects, fetched {} ({freshness}, ttl {}m)",
                        entry.payload.len(),
                        age_description(&entry),
                        cache.ttl().num_minutes()
                    );
                    for subject in entry.payload.iter() {
                        println!(
                            "- {} ({}) {}/{} attended, portal shows {:.2}%",
                            subject.subject_name,
                            subject.subject_code,
                            subject.lectures_attended,
                            subject.lectures_delivered,
                            subject.reported_percentage
                        );
                    }
                }
            }
        }
        Commands::Project {
            key,
            miss,
            summary,
            csv,
        } => {
            let view = current_view(&config, &cache, key.key(), summary).await?;
            let rows: Vec<report::ProjectionRow> =
                report::project_subjects(&view.subjects, miss, &config.projection)
                    .into_iter()
                    .map(|(_, row)| row)
                    .collect();

            if rows.is_empty() {
                println!("No attendance available to project.");
                return Ok(());
            }

            println!(
                "Projection after missing {}:",
                config.projection.clamp_classes(miss)
            );
            for row in rows.iter() {
                println!(
                    "- {} {:.2}% -> {:.2}% ({}, medical credit {})",
                    row.subject_code,
                    row.current_percentage,
                    row.projected_percentage,
                    row.status,
                    row.medical_leave_credit_applied
                );
            }

            if let Some(path) = csv {
                let file = std::fs::File::create(&path)
                    .with_context(|| format!("failed to create {}", path.display()))?;
                report::write_csv(&rows, file)?;
                println!("Projection written to {}.", path.display());
            }
        }
        Commands::Report {
            key,
            miss,
            summary,
            out,
        } => {
            let key = key.key();
            let view = current_view(&config, &cache, key.clone(), summary).await?;
            let report = report::build_report(&key, &view, miss, &config.projection);
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}

fn coordinator(
    config: &Config,
    cache: &Arc<AttendanceCache>,
    key: CacheKey,
    summary: PathBuf,
    register: Option<PathBuf>,
) -> AttendanceCoordinator {
    AttendanceCoordinator::new(
        key,
        Arc::clone(cache),
        Arc::new(FileSource::new(summary, register)),
        SummaryExtractor::new(config.markup.clone()),
        RegisterExtractor::new(config.markup.clone()),
    )
}

/// Cache-first view of the key. With a saved summary page the coordinator
/// fills a missing or stale cache from it; otherwise only the cache is read.
async fn current_view(
    config: &Config,
    cache: &Arc<AttendanceCache>,
    key: CacheKey,
    summary: Option<PathBuf>,
) -> anyhow::Result<AttendanceView> {
    if let Some(summary) = summary {
        let coordinator = coordinator(config, cache, key, summary, None);
        let activation = coordinator.activate().await;
        if let Some(background) = activation.background {
            background.await.context("background refresh panicked")?;
        }
        let view = coordinator.snapshot();
        if let LoadPhase::Failed { message, .. } = &view.phase {
            anyhow::bail!("no attendance available: {message}");
        }
        return Ok(view);
    }

    let entry = cache.get::<Vec<SubjectAttendance>>(&key).await?;
    Ok(match entry {
        Some(entry) => AttendanceView {
            stale: !cache.is_valid(&entry),
            subjects: entry.payload,
            fetched_at: Some(entry.fetched_at),
            origin: Some(DataOrigin::Cache),
            phase: LoadPhase::Ready,
            ..AttendanceView::default()
        },
        None => AttendanceView::default(),
    })
}

fn parse_pages(config: &Config, summary: Option<&Path>, register: Option<&Path>) -> anyhow::Result<()> {
    let mut subjects = Vec::new();
    if let Some(path) = summary {
        let html = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let extraction = SummaryExtractor::new(config.markup.clone()).extract(&html);
        println!(
            "Summary: {} subjects, {} skipped.",
            extraction.records.len(),
            extraction.skipped.len()
        );
        for subject in extraction.records.iter() {
            println!(
                "- {} ({}) taught by {}: {}/{} attended, {} absent, DL {}, ML {} of {}, portal {:.2}%",
                subject.subject_name,
                subject.subject_code,
                if subject.teacher.is_empty() { "unknown" } else { subject.teacher.as_str() },
                subject.lectures_attended,
                subject.lectures_delivered,
                subject.lectures_absent,
                subject.duty_leave_used,
                subject.medical_leave_used,
                subject.approved_medical_leave_quota,
                subject.reported_percentage
            );
        }
        for skipped in extraction.skipped.iter() {
            println!("- skipped {skipped}");
        }
        subjects = extraction.records;
    }

    if let Some(path) = register {
        let html = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let extraction = RegisterExtractor::new(config.markup.clone()).extract(&html);
        println!(
            "Register: {} subjects, {} skipped.",
            extraction.records.len(),
            extraction.skipped.len()
        );
        for skipped in extraction.skipped.iter() {
            println!("- skipped {skipped}");
        }
        for link in link_registers(&subjects, extraction.records) {
            let tally = link.register.tally();
            let linked = match link.summary_index {
                Some(idx) => format!("-> {}", subjects[idx].subject_code),
                None => "unlinked".to_string(),
            };
            println!(
                "- {} {}: {} lectures, {} present, {} absent, {} DL, {} ML",
                link.register.subject_name,
                linked,
                link.register.entries.len(),
                tally.present,
                tally.absent,
                tally.duty_leave,
                tally.medical_leave
            );
            for entry in link.register.entries.iter() {
                let date = entry.date.map(|d| d.to_string()).unwrap_or_else(|| "-".to_string());
                println!(
                    "    #{} {} {}: {}",
                    entry.lecture_number,
                    date,
                    entry.period,
                    entry.status.label()
                );
            }
        }
    }

    Ok(())
}
