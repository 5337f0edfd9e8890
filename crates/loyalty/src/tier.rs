//! Tier lookup over the static tier table.

use serde::Serialize;
use std::cmp::Ordering;
use storefront_core::subscription::SubscriptionTier;

fn by_threshold(a: &&SubscriptionTier, b: &&SubscriptionTier) -> Ordering {
    a.min_spending
        .partial_cmp(&b.min_spending)
        .unwrap_or(Ordering::Equal)
}

/// Best tier the user qualifies for: the highest `min_spending` that is
/// `<= total_spending`. `None` when no tier qualifies.
pub fn resolve_tier(total_spending: f64, tiers: &[SubscriptionTier]) -> Option<&SubscriptionTier> {
    tiers
        .iter()
        .filter(|t| t.min_spending <= total_spending)
        .max_by(by_threshold)
}

/// Like `resolve_tier`, falling back to the lowest tier in the table.
pub fn resolve_tier_or_lowest(
    total_spending: f64,
    tiers: &[SubscriptionTier],
) -> Option<&SubscriptionTier> {
    resolve_tier(total_spending, tiers).or_else(|| tiers.iter().min_by(by_threshold))
}

/// Where a user stands relative to the next tier.
#[derive(Debug, Clone, Serialize)]
pub struct TierProgress {
    pub total_spending: f64,
    pub current: Option<SubscriptionTier>,
    pub next: Option<SubscriptionTier>,
    pub amount_to_next: f64,
    /// 0..=100; 100 once the top tier is reached.
    pub progress_percent: f64,
}

pub fn tier_progress(total_spending: f64, tiers: &[SubscriptionTier]) -> TierProgress {
    let current = resolve_tier(total_spending, tiers).cloned();
    let floor = current.as_ref().map_or(0.0, |t| t.min_spending);
    let next = tiers
        .iter()
        .filter(|t| t.min_spending > total_spending)
        .min_by(by_threshold)
        .cloned();

    let (amount_to_next, progress_percent) = match &next {
        Some(n) => {
            let span = n.min_spending - floor;
            let pct = if span > 0.0 {
                ((total_spending - floor) / span * 100.0).clamp(0.0, 100.0)
            } else {
                0.0
            };
            ((n.min_spending - total_spending).max(0.0), pct)
        }
        None => (0.0, 100.0),
    };

    TierProgress {
        total_spending,
        current,
        next,
        amount_to_next,
        progress_percent,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiers() -> Vec<SubscriptionTier> {
        // Deliberately unordered.
        vec![
            SubscriptionTier { id: 3, name: "gold".into(), min_spending: 3000.0, discount_bonus: 5.0 },
            SubscriptionTier { id: 1, name: "bronze".into(), min_spending: 0.0, discount_bonus: 0.0 },
            SubscriptionTier { id: 4, name: "platinum".into(), min_spending: 5000.0, discount_bonus: 8.0 },
            SubscriptionTier { id: 2, name: "silver".into(), min_spending: 1000.0, discount_bonus: 3.0 },
        ]
    }

    #[test]
    fn test_resolve_picks_highest_qualifying() {
        let t = tiers();
        assert_eq!(resolve_tier(0.0, &t).unwrap().name, "bronze");
        assert_eq!(resolve_tier(999.99, &t).unwrap().name, "bronze");
        assert_eq!(resolve_tier(1000.0, &t).unwrap().name, "silver");
        assert_eq!(resolve_tier(4200.0, &t).unwrap().name, "gold");
        assert_eq!(resolve_tier(1e9, &t).unwrap().name, "platinum");
    }

    #[test]
    fn test_no_qualifying_tier_falls_back_to_lowest() {
        let t: Vec<SubscriptionTier> = tiers().into_iter().filter(|t| t.min_spending > 0.0).collect();
        assert!(resolve_tier(10.0, &t).is_none());
        assert_eq!(resolve_tier_or_lowest(10.0, &t).unwrap().name, "silver");
        assert!(resolve_tier_or_lowest(10.0, &[]).is_none());
    }

    #[test]
    fn test_resolution_is_monotonic() {
        let t = tiers();
        let mut last = f64::MIN;
        let mut spending = 0.0;
        while spending < 7000.0 {
            let threshold = resolve_tier(spending, &t).unwrap().min_spending;
            assert!(threshold >= last, "tier dropped at spending {spending}");
            last = threshold;
            spending += 37.5;
        }
    }

    #[test]
    fn test_progress_toward_next_tier() {
        let p = tier_progress(2000.0, &tiers());
        assert_eq!(p.current.unwrap().name, "silver");
        assert_eq!(p.next.unwrap().name, "gold");
        assert!((p.amount_to_next - 1000.0).abs() < 1e-9);
        assert!((p.progress_percent - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_progress_at_top_tier() {
        let p = tier_progress(6000.0, &tiers());
        assert!(p.next.is_none());
        assert_eq!(p.amount_to_next, 0.0);
        assert_eq!(p.progress_percent, 100.0);
    }
}
