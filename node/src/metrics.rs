//! Request counters for node monitoring.

use std::sync::atomic::{AtomicU64, Ordering};

use tally_common::ErrorKind;

/// Ledger operation counters.
#[derive(Debug, Default)]
pub struct LedgerMetrics {
    /// Accounts opened.
    pub accounts_created: AtomicU64,
    /// Deposits committed.
    pub deposits_completed: AtomicU64,
    /// Transfers committed.
    pub transfers_completed: AtomicU64,
    /// Operations refused for bad input, missing accounts or low balance.
    pub operations_rejected: AtomicU64,
    /// Operations failed on storage or consistency errors.
    pub operations_failed: AtomicU64,
}

impl LedgerMetrics {
    /// Create new metrics instance.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an opened account.
    pub fn account_created(&self) {
        self.accounts_created.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a committed deposit.
    pub fn deposit_completed(&self) {
        self.deposits_completed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a committed transfer.
    pub fn transfer_completed(&self) {
        self.transfers_completed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a failed operation by error class.
    pub fn operation_failed(&self, kind: ErrorKind) {
        let counter = match kind {
            ErrorKind::Validation | ErrorKind::NotFound | ErrorKind::Conflict => {
                &self.operations_rejected
            }
            ErrorKind::Consistency | ErrorKind::Storage => &self.operations_failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current metrics snapshot.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            accounts_created: self.accounts_created.load(Ordering::Relaxed),
            deposits_completed: self.deposits_completed.load(Ordering::Relaxed),
            transfers_completed: self.transfers_completed.load(Ordering::Relaxed),
            operations_rejected: self.operations_rejected.load(Ordering::Relaxed),
            operations_failed: self.operations_failed.load(Ordering::Relaxed),
        }
    }

    /// Export metrics in Prometheus format.
    pub fn to_prometheus(&self) -> String {
        let snapshot = self.snapshot();
        format!(
            r#"# HELP tally_accounts_created_total Accounts opened
# TYPE tally_accounts_created_total counter
tally_accounts_created_total {}

# HELP tally_deposits_total Deposits committed
# TYPE tally_deposits_total counter
tally_deposits_total {}

# HELP tally_transfers_total Transfers committed
# TYPE tally_transfers_total counter
tally_transfers_total {}

# HELP tally_operations_rejected_total Operations refused with a client error
# TYPE tally_operations_rejected_total counter
tally_operations_rejected_total {}

# HELP tally_operations_failed_total Operations failed with a server error
# TYPE tally_operations_failed_total counter
tally_operations_failed_total {}
"#,
            snapshot.accounts_created,
            snapshot.deposits_completed,
            snapshot.transfers_completed,
            snapshot.operations_rejected,
            snapshot.operations_failed,
        )
    }
}

/// Snapshot of metrics at a point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub accounts_created: u64,
    pub deposits_completed: u64,
    pub transfers_completed: u64,
    pub operations_rejected: u64,
    pub operations_failed: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failures_split_by_kind() {
        let metrics = LedgerMetrics::new();
        metrics.operation_failed(ErrorKind::Conflict);
        metrics.operation_failed(ErrorKind::NotFound);
        metrics.operation_failed(ErrorKind::Storage);
        metrics.deposit_completed();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.operations_rejected, 2);
        assert_eq!(snapshot.operations_failed, 1);
        assert_eq!(snapshot.deposits_completed, 1);
    }

    #[test]
    fn test_prometheus_export() {
        let metrics = LedgerMetrics::new();
        metrics.account_created();
        metrics.account_created();

        let text = metrics.to_prometheus();
        assert!(text.contains("tally_accounts_created_total 2"));
        assert!(text.contains("tally_transfers_total 0"));
    }
}
