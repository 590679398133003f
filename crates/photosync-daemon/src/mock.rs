//! Mock data generator
//!
//! Fills the record store with synthetic records so the engine and the
//! presentation feed can be exercised without a real library. Every tick a
//! random number of records is inserted until the store holds `cap` records.
//!
//! Records get UUID ids, a creation time somewhere in January to April of
//! the configured year, a random media kind, and are randomly `Local` or
//! already `Synced` (with a placeholder locator).

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, TimeZone, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use photosync_core::domain::{MediaKind, RecordId, RemoteLocator, SyncRecord};
use photosync_core::ports::{RecordFilter, RecordStore};

/// Smallest number of records inserted per tick
pub const MIN_PER_TICK: u64 = 100;
/// Largest number of records inserted per tick
pub const MAX_PER_TICK: u64 = 150;
/// Default total-record cap
pub const DEFAULT_CAP: u64 = 15_000;

const MEDIA_KINDS: [MediaKind; 3] = [MediaKind::Image, MediaKind::Video, MediaKind::Audio];

#[derive(Debug, Clone)]
pub struct MockSettings {
    pub interval: Duration,
    /// Generation stops once the store holds this many records
    pub cap: u64,
    /// Creation times fall in months 1 to 4 of this year
    pub year: i32,
}

pub struct MockGenerator {
    store: Arc<dyn RecordStore>,
    settings: MockSettings,
    window_start: DateTime<Utc>,
    window_seconds: i64,
}

impl MockGenerator {
    pub fn new(store: Arc<dyn RecordStore>, settings: MockSettings) -> Result<Self> {
        let window_start = Utc
            .with_ymd_and_hms(settings.year, 1, 1, 0, 0, 0)
            .single()
            .with_context(|| format!("Year {} is out of range", settings.year))?;
        let window_end = Utc
            .with_ymd_and_hms(settings.year, 5, 1, 0, 0, 0)
            .single()
            .with_context(|| format!("Year {} is out of range", settings.year))?;

        Ok(Self {
            store,
            window_start,
            window_seconds: (window_end - window_start).num_seconds(),
            settings,
        })
    }

    pub fn settings(&self) -> &MockSettings {
        &self.settings
    }

    /// Builds one random record
    pub fn random_record(&self, rng: &mut impl Rng) -> Result<SyncRecord> {
        let uuid = Uuid::new_v4();
        let id = RecordId::new(uuid.to_string())?;
        let created_at =
            self.window_start + chrono::Duration::seconds(rng.gen_range(0..self.window_seconds));
        let kind = MEDIA_KINDS[rng.gen_range(0..MEDIA_KINDS.len())];

        let record = if rng.gen_bool(0.5) {
            let locator = RemoteLocator::new(format!("https://mock.invalid/{uuid}"))?;
            SyncRecord::new_synced(id, created_at, kind, locator)
        } else {
            SyncRecord::new(id, created_at, kind)
        };
        Ok(record)
    }

    /// Inserts one tick's worth of records, never exceeding the cap
    ///
    /// Returns the number of records inserted.
    pub async fn insert_round(&self, rng: &mut impl Rng) -> Result<u64> {
        let total = self
            .store
            .count(&RecordFilter::new())
            .await
            .context("Failed to count records")?;
        let room = self.settings.cap.saturating_sub(total);
        let wanted = rng.gen_range(MIN_PER_TICK..=MAX_PER_TICK).min(room);

        let mut inserted = 0;
        for _ in 0..wanted {
            let record = self.random_record(rng)?;
            if self
                .store
                .insert_if_absent(&record)
                .await
                .context("Failed to insert mock record")?
            {
                inserted += 1;
            }
        }

        debug!(inserted, total = total + inserted, "Inserted mock records");
        Ok(inserted)
    }

    /// Generates records every interval until the cap is reached or `cancel` fires
    ///
    /// Returns the number of records inserted.
    pub async fn run(&self, cancel: &CancellationToken) -> Result<u64> {
        info!(
            interval_ms = self.settings.interval.as_millis() as u64,
            cap = self.settings.cap,
            year = self.settings.year,
            "Starting mock generator"
        );

        let mut rng = StdRng::from_entropy();
        let mut interval = tokio::time::interval(self.settings.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut inserted = 0;

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!(inserted, "Mock generator cancelled");
                    break;
                }
                _ = interval.tick() => {}
            }

            let added = self.insert_round(&mut rng).await?;
            inserted += added;
            if added == 0 {
                info!(inserted, cap = self.settings.cap, "Record cap reached");
                break;
            }
        }

        Ok(inserted)
    }
}

// ============================================================================
// Unit tests
// ============================================================================
