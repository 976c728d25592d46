use std::error::Error;
use std::time::Duration;
use tokio::time::sleep;

use crate::config::Config;
use crate::record::{header_row, ExportRecord, TimeRange};
use crate::sheets::data::SheetsError;
use crate::sheets::SheetTarget;
use crate::spotify::data::{fetch_recently_played, fetch_top_artists, fetch_top_tracks};
use crate::utils::export_timestamp;
use crate::{sheets, spotify};

#[derive(Debug, Default, PartialEq, Eq)]
pub struct ExportReport {
    pub rows_written: usize,
    pub batches_written: usize,
    pub batches_failed: usize,
}

/// Writes the header row only when `A1` is empty. Returns whether it wrote one.
pub async fn ensure_header<T>(target: &T) -> Result<bool, SheetsError>
where
    T: SheetTarget + Sync,
{
    if target.first_cell().await?.is_some() {
        return Ok(false);
    }

    target.append_rows(&[header_row()]).await?;
    log::info!("Wrote header row to empty sheet");
    Ok(true)
}

/// Appends records in order, `batch_size` rows at a time, pausing `delay` between batches.
/// A failed batch is logged and skipped.
pub async fn export_records<T>(
    target: &T,
    records: &[ExportRecord],
    timestamp: &str,
    batch_size: usize,
    delay: Duration,
) -> ExportReport
where
    T: SheetTarget + Sync,
{
    let mut report = ExportReport::default();
    if records.is_empty() {
        log::info!("No data to export");
        return report;
    }

    let rows: Vec<_> = records.iter().map(|r| r.to_row(timestamp)).collect();
    let batch_count = rows.chunks(batch_size.max(1)).len();

    for (index, batch) in rows.chunks(batch_size.max(1)).enumerate() {
        if index > 0 && !delay.is_zero() {
            sleep(delay).await;
        }

        match target.append_rows(batch).await {
            Ok(()) => {
                report.batches_written += 1;
                report.rows_written += batch.len();
                log::debug!("Batch {}/{} written ({} rows)", index + 1, batch_count, batch.len());
            }
            Err(e) => {
                report.batches_failed += 1;
                log::error!("Error adding batch {}/{}: {}", index + 1, batch_count, e);
            }
        }
    }

    report
}

/// Per-source counts for the run summary.
struct Fetched {
    recent: usize,
    top_tracks: Vec<(TimeRange, usize)>,
    top_artists: usize,
}

/// Authenticates both services, fetches every source, and appends everything to the sheet.
pub async fn run(config: &Config) -> Result<(), Box<dyn Error>> {
    let spotify_client = spotify::auth::authenticate(&config.spotify).await?;

    let worksheet = sheets::auth::authenticate(&config.sheets)
        .await?
        .open(&config.sheets)
        .await?;
    ensure_header(&worksheet).await?;

    let export = &config.export;
    let mut all_data = Vec::new();

    let recent = fetch_recently_played(&spotify_client, export.recent_limit).await;
    let mut fetched = Fetched {
        recent: recent.len(),
        top_tracks: Vec::new(),
        top_artists: 0,
    };
    all_data.extend(recent);

    for &time_range in &export.top_track_ranges {
        let tracks = fetch_top_tracks(&spotify_client, export.top_limit, time_range).await;
        fetched.top_tracks.push((time_range, tracks.len()));
        all_data.extend(tracks);
    }

    let artists =
        fetch_top_artists(&spotify_client, export.top_limit, export.top_artist_range).await;
    fetched.top_artists = artists.len();
    all_data.extend(artists);

    if all_data.is_empty() {
        println!("No data fetched from Spotify");
        return Ok(());
    }

    let report = export_records(
        &worksheet,
        &all_data,
        &export_timestamp(),
        export.batch_size,
        Duration::from_millis(export.batch_delay_ms),
    )
    .await;

    println!("\nData Summary:");
    println!("  Recently Played: {} tracks", fetched.recent);
    for (time_range, count) in &fetched.top_tracks {
        println!("  Top Tracks ({}): {} tracks", time_range.label(), count);
    }
    println!("  Top Artists: {} artists", fetched.top_artists);
    println!("  Total exported: {} rows", report.rows_written);
    if report.batches_failed > 0 {
        println!("  Failed batches: {}", report.batches_failed);
    }

    Ok(())
}
