use crate::cache::key::BlobKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictionReason {
    Expired,
    OverBudget,
}

#[derive(Debug, Clone)]
pub struct DiskEntryInfo {
    pub key: BlobKey,
    pub size_bytes: u64,
    pub written_at_ms: u64,
}

#[derive(Debug, Clone)]
pub struct PlannedEviction {
    pub key: BlobKey,
    pub size_bytes: u64,
    pub reason: EvictionReason,
}

#[derive(Debug, Default)]
pub struct EvictionPlan {
    pub planned: Vec<PlannedEviction>,
    pub total_bytes_before: u64,
    pub total_bytes_after: u64,
    pub removed_expired: usize,
    pub removed_over_budget: usize,
}

/// Decide which disk entries to drop.
///
/// Entries strictly older than `max_age_ms` go first. If the remainder is
/// still above `max_bytes`, the oldest writes go next until it fits. A zero
/// `max_age_ms` or `max_bytes` disables that pass.
pub fn plan_evictions(
    mut entries: Vec<DiskEntryInfo>,
    now_ms: u64,
    max_age_ms: u64,
    max_bytes: u64,
) -> EvictionPlan {
    let mut plan = EvictionPlan::default();

    let mut total_bytes: u64 = entries.iter().map(|e| e.size_bytes).sum();
    plan.total_bytes_before = total_bytes;

    let mut kept: Vec<DiskEntryInfo> = Vec::with_capacity(entries.len());
    for e in entries.drain(..) {
        let age_ms = now_ms.saturating_sub(e.written_at_ms);
        if max_age_ms > 0 && age_ms > max_age_ms {
            total_bytes = total_bytes.saturating_sub(e.size_bytes);
            plan.planned.push(PlannedEviction {
                key: e.key,
                size_bytes: e.size_bytes,
                reason: EvictionReason::Expired,
            });
            plan.removed_expired += 1;
        } else {
            kept.push(e);
        }
    }

    if max_bytes > 0 && total_bytes > max_bytes {
        // Ties on write time fall back to key order so plans are repeatable.
        kept.sort_by(|a, b| {
            a.written_at_ms
                .cmp(&b.written_at_ms)
                .then_with(|| a.key.cmp(&b.key))
        });
        for e in kept {
            if total_bytes <= max_bytes {
                break;
            }
            total_bytes = total_bytes.saturating_sub(e.size_bytes);
            plan.planned.push(PlannedEviction {
                key: e.key,
                size_bytes: e.size_bytes,
                reason: EvictionReason::OverBudget,
            });
            plan.removed_over_budget += 1;
        }
    }

    plan.total_bytes_after = total_bytes;
    plan
}
