use crate::model::{round2, BenchmarkRecord, ComparisonResult, SuspectedComponent};

/// Below this efficiency the engine tries to name a culprit.
const EFFICIENCY_ALERT_PERCENT: f64 = 85.0;
/// A channel scoring under this share of the leader's is suspected.
const CHANNEL_RATIO: f64 = 0.85;

/// Ranks a record against peers that share its hardware fingerprint.
#[derive(Debug, Default, Clone, Copy)]
pub struct ComparisonEngine;

impl ComparisonEngine {
    pub fn new() -> Self {
        Self
    }

    /// Peers from `candidates` with a matching fingerprint, excluding
    /// `record` itself (by stored id, or by identity).
    pub fn select_cohort<'a>(&self, record: &BenchmarkRecord, candidates: &'a [BenchmarkRecord]) -> Vec<&'a BenchmarkRecord> {
        candidates
            .iter()
            .filter(|peer| !std::ptr::eq(*peer, record))
            .filter(|peer| record.id.is_none() || peer.id != record.id)
            .filter(|peer| record.fingerprint.matches(&peer.fingerprint))
            .collect()
    }

    pub fn compare(&self, record: &BenchmarkRecord, cohort: &[&BenchmarkRecord]) -> ComparisonResult {
        let top = cohort
            .iter()
            .copied()
            .max_by(|a, b| a.overall_score.total_cmp(&b.overall_score));

        let Some(top) = top else {
            return ComparisonResult {
                cohort_size: 0,
                top_score: record.overall_score,
                user_rank: Some(1),
                efficiency_percent: 100.0,
                suspected_component: SuspectedComponent::None,
            };
        };

        let top_score = top.overall_score;
        let efficiency_percent = if top_score > 0.0 {
            round2(record.overall_score / top_score * 100.0)
        } else {
            100.0
        };

        let suspected_component = if efficiency_percent < EFFICIENCY_ALERT_PERCENT {
            if record.cpu_score < top.cpu_score * CHANNEL_RATIO {
                SuspectedComponent::Cpu
            } else if record.gpu_score < top.gpu_score * CHANNEL_RATIO {
                SuspectedComponent::Gpu
            } else {
                SuspectedComponent::RamIo
            }
        } else {
            SuspectedComponent::None
        };

        ComparisonResult {
            cohort_size: cohort.len(),
            top_score,
            user_rank: Some(self.rank(record, cohort)),
            efficiency_percent,
            suspected_component,
        }
    }

    /// 1 + peers strictly ahead of the owner's best score on this fingerprint.
    fn rank(&self, record: &BenchmarkRecord, cohort: &[&BenchmarkRecord]) -> usize {
        let own_best = cohort
            .iter()
            .filter(|peer| record.owner.is_some() && peer.owner == record.owner)
            .map(|peer| peer.overall_score)
            .fold(record.overall_score, f64::max);

        1 + cohort.iter().filter(|peer| peer.overall_score > own_best).count()
    }
}
