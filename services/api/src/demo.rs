use crate::infra::{build_hub, load_integrations};
use clap::Args;
use std::path::PathBuf;
use talent_hub::config::{AppConfig, HubConfig};
use talent_hub::error::AppError;
use talent_hub::integrations::{
    Credentials, Integration, IntegrationId, IntegrationKind, SyncLog, SyncMode, SyncOutcome,
};
use talent_hub::telemetry;
use tokio_util::sync::CancellationToken;
use tracing::warn;

const DEMO_INTEGRATION_ID: &str = "demo-csv-export";

const SAMPLE_CANDIDATES: &str = "\
Candidate ID,First Name,Last Name,Email,Phone,Stage,Job ID,Source,Created At
c-100,Ada,Lovelace,ada@example.com,(555) 010-1000,Phone Screen,job-7,Referral,2025-02-01T09:00:00Z
c-101,Grace,Hopper,grace@example.com,555.010.1001,Onsite,job-7,LinkedIn,2025-02-03
c-102,Alan,Turing,,555-010-1002,Applied,job-8,Careers page,2025-02-04T12:30:00Z
c-103,Katherine,Johnson,katherine@example.com,,Offer,job-8,,2025-02-05T08:15:00Z
";

const SAMPLE_JOBS: &str = "\
Job ID,Title,Status,Department,Location
job-7,Staff Engineer,Open,Engineering,Remote
job-8,Data Analyst,On Hold,Analytics,Berlin
";

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Candidate export to sync. Defaults to a small built-in sample.
    #[arg(long)]
    pub(crate) candidates_csv: Option<PathBuf>,
    /// Job export to sync alongside the candidates.
    #[arg(long)]
    pub(crate) jobs_csv: Option<PathBuf>,
    /// Print every canonical record stored by the run.
    #[arg(long)]
    pub(crate) show_records: bool,
}

#[derive(Args, Debug)]
pub(crate) struct SyncArgs {
    /// Integration to sync, as named in the integrations file.
    #[arg(long)]
    pub(crate) integration_id: String,
    /// JSON file with integration records (overrides HUB_INTEGRATIONS_FILE).
    #[arg(long)]
    pub(crate) integrations: Option<PathBuf>,
    /// Only fetch records changed since the last successful sync.
    #[arg(long)]
    pub(crate) incremental: bool,
}

/// Syncs a CSV export through the full pipeline and prints the resulting log.
pub(crate) async fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        candidates_csv,
        jobs_csv,
        show_records,
    } = args;

    println!("Integration hub demo");
    let integration = demo_integration(candidates_csv, jobs_csv);
    let source = integration
        .settings
        .get("candidates_path")
        .and_then(|value| value.as_str())
        .unwrap_or("built-in sample")
        .to_string();
    println!("- source: {source}");

    let hub = build_hub(&HubConfig::default(), vec![integration]);
    let id = IntegrationId(DEMO_INTEGRATION_ID.to_string());
    let outcome = hub
        .run_sync(&id, SyncMode::Full, &CancellationToken::new())
        .await?;
    render_outcome(&outcome);

    if show_records {
        println!("\nCanonical candidates");
        for candidate in hub.store().candidates(&id) {
            println!(
                "  - {} | {} <{}> | {} | phone {}",
                candidate.external_id,
                candidate.name,
                candidate.email,
                candidate.status.label(),
                candidate.phone.as_deref().unwrap_or("-")
            );
        }
        println!("Canonical jobs");
        for job in hub.store().jobs(&id) {
            println!(
                "  - {} | {} | {} | {}",
                job.external_id,
                job.title,
                job.status.label(),
                job.location.as_deref().unwrap_or("-")
            );
        }
    }

    Ok(())
}

/// One-off sync of a configured integration. Ctrl-C cancels the run; its log is still closed.
pub(crate) async fn run_sync(args: SyncArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;
    if let Some(path) = args.integrations {
        config.integrations_file = Some(path);
    }
    telemetry::init(&config.telemetry)?;

    let integrations = match &config.integrations_file {
        Some(path) => load_integrations(path)?,
        None => Vec::new(),
    };
    let hub = build_hub(&config.hub, integrations);
    let mode = if args.incremental {
        SyncMode::Incremental
    } else {
        SyncMode::Full
    };

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received; cancelling sync");
            interrupt.cancel();
        }
    });

    let outcome = hub
        .run_sync(&IntegrationId(args.integration_id), mode, &cancel)
        .await?;
    render_outcome(&outcome);
    Ok(())
}

fn demo_integration(candidates: Option<PathBuf>, jobs: Option<PathBuf>) -> Integration {
    let mut integration = Integration::new(
        DEMO_INTEGRATION_ID,
        "demo-company",
        IntegrationKind::Ats,
        "csv_export",
        Credentials::default(),
    );

    integration = match candidates {
        Some(path) => integration.with_setting("candidates_path", path.display().to_string()),
        None => integration.with_setting("candidates_csv", SAMPLE_CANDIDATES),
    };
    match jobs {
        Some(path) => integration.with_setting("jobs_path", path.display().to_string()),
        None => integration.with_setting("jobs_csv", SAMPLE_JOBS),
    }
}

fn render_outcome(outcome: &SyncOutcome) {
    let log: &SyncLog = &outcome.log;
    println!(
        "\nSync {} ({}) -> {}",
        log.id,
        log.operation_type.label(),
        log.status.label()
    );
    println!(
        "- processed {} | stored {} | failed {}",
        log.records_processed, log.records_success, log.records_failed
    );
    if let Some(kind) = outcome.error {
        println!("- run error: {kind}");
    }
    if log.error_details.is_empty() {
        println!("- no errors recorded");
    } else {
        println!("Errors:");
        for detail in &log.error_details {
            println!(
                "  - [{}] {}{}",
                detail.kind,
                detail
                    .external_id
                    .as_deref()
                    .map(|id| format!("{id}: "))
                    .unwrap_or_default(),
                detail.message
            );
        }
    }
}
