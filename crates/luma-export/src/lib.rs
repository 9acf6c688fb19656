//! Library crate behind the `luma-export` CLI: collects every past and
//! future event visible to the authenticated Luma session, downloads each
//! event's guest list, and writes the three CSV reports.

pub mod config;
pub mod error;
pub mod export;
pub mod fetch;
pub mod guests;
pub mod logging;

use std::path::{Path, PathBuf};

use chrono::Local;
use indicatif::ProgressBar;
use reqwest::Client;
use tracing::{info, warn};

use config::{AppConfig, CliArgs, Tunables};
use error::ExportError;
use export::{EVENTS_PREFIX, REGISTRATIONS_PREFIX, UNIQUE_GUESTS_PREFIX};
use fetch::{Event, Period, download_guests_csv, fetch_events};
use guests::{GuestRow, dedupe_by_email, parse_guest_csv};

/// Counts and file locations produced by one export run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub events: usize,
    pub registrations: usize,
    pub unique_guests: usize,
    pub events_csv: PathBuf,
    pub registrations_csv: PathBuf,
    pub unique_guests_csv: PathBuf,
}

/// Runs the full export pipeline.
///
/// Only configuration errors abort the run; once fetching starts, failures
/// are logged and the export continues with whatever data it has.
pub async fn run(cli: CliArgs) -> Result<RunSummary, ExportError> {
    let AppConfig { paths, tunables } = cli.resolve()?;

    let client = Client::builder().user_agent("luma-export/0.1").build()?;

    let mut events = fetch_events(&client, &tunables, Period::Past).await;
    events.extend(fetch_events(&client, &tunables, Period::Future).await);
    info!(count = events.len(), "collected events");

    let stamp = export::date_stamp(Local::now().date_naive());
    let events_csv = export::report_path(&paths.out_dir, EVENTS_PREFIX, &stamp);
    write_report(&events_csv, export::write_events_csv(&events_csv, &events));

    let guests = collect_guests(&client, &tunables, &events).await;
    let unique = dedupe_by_email(&guests);

    let registrations_csv = export::report_path(&paths.out_dir, REGISTRATIONS_PREFIX, &stamp);
    write_report(
        &registrations_csv,
        export::write_guests_csv(&registrations_csv, &guests),
    );

    let unique_guests_csv = export::report_path(&paths.out_dir, UNIQUE_GUESTS_PREFIX, &stamp);
    write_report(
        &unique_guests_csv,
        export::write_guests_csv(&unique_guests_csv, &unique),
    );

    println!("Total events: {}", events.len());
    println!("Total registrations: {}", guests.len());
    println!("Total guests with unique emails: {}", unique.len());

    Ok(RunSummary {
        events: events.len(),
        registrations: guests.len(),
        unique_guests: unique.len(),
        events_csv,
        registrations_csv,
        unique_guests_csv,
    })
}

/// Downloads and parses the guest list of every event, strictly one at a
/// time. A failed event contributes zero rows and the loop continues.
async fn collect_guests(
    client: &Client,
    tunables: &Tunables,
    events: &[Event],
) -> Vec<GuestRow> {
    let mut all_guests = Vec::new();

    println!("Fetching guests for all events...");
    let progress = ProgressBar::new(events.len() as u64);

    for event in events {
        match download_guests_csv(client, tunables, &event.api_id).await {
            Ok(body) => match parse_guest_csv(&body, &event.name, &event.event_url()) {
                Ok(mut rows) => all_guests.append(&mut rows),
                Err(err) => {
                    warn!(event = %event.api_id, error = %err, "failed to parse guest CSV")
                }
            },
            Err(err) => warn!(event = %event.api_id, error = %err, "failed to fetch guests"),
        }
        progress.inc(1);
    }

    progress.finish();
    all_guests
}

fn write_report(path: &Path, outcome: Result<bool, ExportError>) {
    match outcome {
        Ok(true) => info!(path = %path.display(), "report written"),
        Ok(false) => warn!(path = %path.display(), "no rows to export; file not written"),
        Err(err) => warn!(path = %path.display(), error = %err, "failed to write report"),
    }
}
