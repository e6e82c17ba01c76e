//! Transfer progress reporting.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferStage {
    Receiving,
    Resolving,
    Checkout,
}

/// A progress sample from a clone or fetch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransferProgress {
    pub stage: TransferStage,
    pub current: usize,
    pub total: usize,
    pub received_bytes: usize,
}

impl TransferProgress {
    /// Completion of the current stage, 0 to 100.
    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            return 0;
        }
        ((self.current.min(self.total) * 100) / self.total) as u8
    }

    pub(crate) fn from_stats(stats: &git2::Progress<'_>) -> Self {
        let total = stats.total_objects();
        if stats.received_objects() < total {
            Self {
                stage: TransferStage::Receiving,
                current: stats.received_objects(),
                total,
                received_bytes: stats.received_bytes(),
            }
        } else {
            Self {
                stage: TransferStage::Resolving,
                current: stats.indexed_deltas(),
                total: stats.total_deltas(),
                received_bytes: stats.received_bytes(),
            }
        }
    }
}

impl std::fmt::Display for TransferProgress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let stage = match self.stage {
            TransferStage::Receiving => "receiving objects",
            TransferStage::Resolving => "resolving deltas",
            TransferStage::Checkout => "checkout",
        };
        write!(f, "{stage} [{}/{}] {}%", self.current, self.total, self.percent())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent() {
        let mut p = TransferProgress {
            stage: TransferStage::Receiving,
            current: 25,
            total: 200,
            received_bytes: 0,
        };
        assert_eq!(p.percent(), 12);
        p.total = 0;
        assert_eq!(p.percent(), 0);
        p.total = 10;
        p.current = 11;
        assert_eq!(p.percent(), 100);
        assert_eq!(p.to_string(), "receiving objects [11/10] 100%");
    }
}
