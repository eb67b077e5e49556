//! Batched upserts with row-level fallback.
//!
//! A failed batch is retried one row at a time so a handful of bad rows
//! never costs the rest of the batch. Rows that still fail go to the
//! dead-letter log. A structural failure (no enforceable identity key)
//! aborts immediately: continuing would silently duplicate data.

pub mod dead_letter;

use crate::errors::{StoreError, WriteError};
use crate::models::MetricRow;
use crate::storage::MetricStore;
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, error, warn};

pub use self::dead_letter::{DeadLetter, DeadLetterLog};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WriteReport {
    pub succeeded: usize,
    pub dead_lettered: usize,
    /// Batches that needed the row-level fallback.
    pub degraded_batches: usize,
}

pub struct UpsertWriter {
    store: Arc<dyn MetricStore>,
    dead_letters: DeadLetterLog,
    batch_size: usize,
}

impl UpsertWriter {
    pub fn new(store: Arc<dyn MetricStore>, dead_letters: DeadLetterLog, batch_size: usize) -> Self {
        Self {
            store,
            dead_letters,
            batch_size: batch_size.max(1),
        }
    }

    pub fn write(&self, business_name: &str, rows: &[MetricRow]) -> Result<WriteReport, WriteError> {
        let mut report = WriteReport::default();

        for (batch_index, batch) in rows.chunks(self.batch_size).enumerate() {
            match self.store.upsert_rows(batch) {
                Ok(n) => {
                    debug!(business = business_name, batch = batch_index, "{} rows upserted", n);
                    report.succeeded += n;
                }
                Err(e) => {
                    let e = abort_if_structural(e, business_name, batch_index)?;
                    warn!(
                        business = business_name,
                        batch = batch_index,
                        "Batch of {} failed ({}), retrying row by row",
                        batch.len(),
                        e
                    );
                    report.degraded_batches += 1;
                    self.write_rows_individually(business_name, batch_index, batch, &mut report)?;
                }
            }
        }

        Ok(report)
    }

    fn write_rows_individually(
        &self,
        business_name: &str,
        batch_index: usize,
        batch: &[MetricRow],
        report: &mut WriteReport,
    ) -> Result<(), WriteError> {
        for row in batch {
            match self.store.upsert_rows(std::slice::from_ref(row)) {
                Ok(n) => report.succeeded += n,
                Err(e) => {
                    let e = abort_if_structural(e, business_name, batch_index)?;
                    report.dead_lettered += 1;
                    self.dead_letter(business_name, batch_index, row, &e);
                }
            }
        }
        Ok(())
    }

    fn dead_letter(&self, business_name: &str, batch_index: usize, row: &MetricRow, e: &StoreError) {
        let (account, ad, date) = row.key();
        warn!(
            business = business_name,
            batch = batch_index,
            account,
            ad,
            date = %date,
            "Dead-lettering row: {}",
            e
        );
        let entry = DeadLetter {
            failed_at: Utc::now(),
            business_name,
            batch_index,
            error: e.to_string(),
            row,
        };
        if let Err(io) = self.dead_letters.append(&entry) {
            error!(
                business = business_name,
                dir = ?self.dead_letters.dir(),
                "Could not record dead letter: {:#}",
                io
            );
        }
    }
}

fn abort_if_structural(e: StoreError, business_name: &str, batch_index: usize) -> Result<StoreError, WriteError> {
    match e {
        StoreError::Structural(detail) => {
            error!(business = business_name, batch = batch_index, "Structural store failure: {}", detail);
            Err(WriteError::Structural {
                business_name: business_name.to_string(),
                batch_index,
                detail,
            })
        }
        data => Ok(data),
    }
}
