//! Ledger replay and drift repair for balance records.
//!
//! Records are a projection of the ledger; this module recomputes them from
//! the opening baselines plus every completed row in commit order. Stored
//! records and ledger rows are read from one [`LedgerCut`], and a repair only
//! lands on a record whose version is still the one in that cut.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use garrison_core::{DomainResult, ExpectedVersion, UserId};
use garrison_inventory::{replay, BalanceCounters, BalanceKey, Replay};

use crate::error::EngineError;
use crate::store::{InventoryStore, LedgerCut, StoreError};

/// Cuts taken by one `repair` before it gives up on keys that keep moving.
const MAX_REPAIR_PASSES: u32 = 3;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Drift {
    pub key: BalanceKey,
    /// `None` when the ledger implies a record that was never written.
    pub stored: Option<BalanceCounters>,
    /// Record version in the cut; 0 when absent.
    pub stored_version: u64,
    pub expected: BalanceCounters,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DriftReport {
    pub checked: usize,
    pub last_sequence: u64,
    pub drifts: Vec<Drift>,
}

impl DriftReport {
    pub fn is_clean(&self) -> bool {
        self.drifts.is_empty()
    }

    fn from_cut(cut: &LedgerCut, expected: &Replay) -> Self {
        let stored: BTreeMap<BalanceKey, _> = cut.records.iter().map(|r| (r.key, r)).collect();

        let drifts = expected
            .balances
            .iter()
            .filter_map(|(key, counters)| {
                let record = stored.get(key);
                let current = record.map(|r| r.counters);
                (current != Some(*counters)).then(|| Drift {
                    key: *key,
                    stored: current,
                    stored_version: record.map(|r| r.version).unwrap_or(0),
                    expected: *counters,
                })
            })
            .collect();

        DriftReport {
            checked: expected.balances.len(),
            last_sequence: expected.last_sequence,
            drifts,
        }
    }
}

/// Outcome of [`Reconciler::repair`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RepairReport {
    /// Drift found by the first pass.
    pub detected: DriftReport,
    /// Keys overwritten with replayed counters.
    pub restored: Vec<BalanceKey>,
    /// Keys a concurrent commit kept moving through every pass.
    pub skipped: Vec<BalanceKey>,
    pub passes: u32,
}

impl RepairReport {
    pub fn is_complete(&self) -> bool {
        self.skipped.is_empty()
    }
}

pub struct Reconciler<S> {
    store: S,
}

impl<S> Reconciler<S>
where
    S: InventoryStore,
{
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Expected counters of every key, from stored openings + ledger.
    #[instrument(skip(self), err)]
    pub fn replay(&self) -> Result<Replay, EngineError> {
        let cut = self.store.ledger_cut()?;
        Ok(replay_cut(&cut)?)
    }

    #[instrument(skip(self), err)]
    pub fn verify(&self) -> Result<DriftReport, EngineError> {
        let cut = self.store.ledger_cut()?;
        let report = DriftReport::from_cut(&cut, &replay_cut(&cut)?);

        if report.is_clean() {
            info!(checked = report.checked, "balance records match the ledger");
        } else {
            warn!(checked = report.checked, drifted = report.drifts.len(), "balance records drifted from the ledger");
        }
        Ok(report)
    }

    /// Overwrite every drifted record with its replayed counters.
    ///
    /// Each restore is conditional on the version seen in the cut. A key a
    /// commit moved in the meantime is re-examined from a fresh cut, up to
    /// `MAX_REPAIR_PASSES` cuts.
    #[instrument(skip(self), fields(actor = %actor), err)]
    pub fn repair(&self, actor: UserId) -> Result<RepairReport, EngineError> {
        let mut out = RepairReport::default();

        while out.passes < MAX_REPAIR_PASSES {
            out.passes += 1;
            let report = self.verify()?;
            if out.passes == 1 {
                out.detected = report.clone();
            }

            let mut moved = Vec::new();
            for drift in &report.drifts {
                warn!(
                    key = %drift.key,
                    stored = ?drift.stored,
                    expected = ?drift.expected,
                    "restoring record from ledger"
                );
                let expected = ExpectedVersion::observed(drift.stored_version);
                match self.store.restore_record(drift.key, drift.expected, expected, actor) {
                    Ok(_) => {
                        if !out.restored.contains(&drift.key) {
                            out.restored.push(drift.key);
                        }
                    }
                    Err(StoreError::Conflict(msg)) => {
                        debug!(key = %drift.key, %msg, "record moved since the cut");
                        moved.push(drift.key);
                    }
                    Err(other) => return Err(other.into()),
                }
            }

            out.skipped = moved;
            if out.skipped.is_empty() {
                break;
            }
        }

        if !out.is_complete() {
            warn!(skipped = out.skipped.len(), passes = out.passes, "records kept moving during repair");
        }
        Ok(out)
    }
}

fn replay_cut(cut: &LedgerCut) -> DomainResult<Replay> {
    let openings = cut.records.iter().map(|r| (r.key, r.opening_balance()));
    replay(openings, &cut.transactions)
}
