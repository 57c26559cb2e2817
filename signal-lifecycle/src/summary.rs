use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Succeeded,
    Failed,
    Skipped,
}

/// Outcome of one item in a batch job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemReport {
    /// Symbol or record id the item refers to
    pub item: String,
    pub status: ItemStatus,
    pub detail: String,
}

impl ItemReport {
    pub fn succeeded(item: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::new(item, ItemStatus::Succeeded, detail)
    }

    pub fn failed(item: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::new(item, ItemStatus::Failed, detail)
    }

    pub fn skipped(item: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::new(item, ItemStatus::Skipped, detail)
    }

    fn new(item: impl Into<String>, status: ItemStatus, detail: impl Into<String>) -> Self {
        Self {
            item: item.into(),
            status,
            detail: detail.into(),
        }
    }
}

/// Counts and per-item reports of a batch job
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub items: Vec<ItemReport>,
}

impl BatchSummary {
    pub fn push(&mut self, report: ItemReport) {
        self.attempted += 1;
        match report.status {
            ItemStatus::Succeeded => self.succeeded += 1,
            ItemStatus::Failed => self.failed += 1,
            ItemStatus::Skipped => self.skipped += 1,
        }
        self.items.push(report);
    }

    pub fn log(&self, job: &str) {
        info!(
            "{}: {} attempted, {} succeeded, {} failed, {} skipped",
            job, self.attempted, self.succeeded, self.failed, self.skipped
        );
    }
}

impl FromIterator<ItemReport> for BatchSummary {
    fn from_iter<I: IntoIterator<Item = ItemReport>>(iter: I) -> Self {
        let mut summary = BatchSummary::default();
        for report in iter {
            summary.push(report);
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_follow_reports() {
        let summary: BatchSummary = vec![
            ItemReport::succeeded("BTCUSDT", "queued"),
            ItemReport::failed("ETHUSDT", "timeout"),
            ItemReport::skipped("SOLUSDT", "no fresh signal"),
            ItemReport::succeeded("XRPUSDT", "notified"),
        ]
        .into_iter()
        .collect();

        assert_eq!(summary.attempted, 4);
        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.items[1].detail, "timeout");
    }
}
