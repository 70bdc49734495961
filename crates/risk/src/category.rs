use cashguard_core::{RiskCategory, RiskTiers};

/// Map a score to its tier. Boundaries are inclusive upper bounds.
///
/// Scores outside [0, 100] are clamped; NaN is treated as the riskiest tier.
pub fn categorize(score: f64, tiers: &RiskTiers) -> RiskCategory {
    if score.is_nan() {
        return RiskCategory::VeryHigh;
    }
    let score = score.clamp(0.0, 100.0);
    if score <= tiers.low_max {
        RiskCategory::Low
    } else if score <= tiers.medium_max {
        RiskCategory::Medium
    } else if score <= tiers.high_max {
        RiskCategory::High
    } else {
        RiskCategory::VeryHigh
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_boundaries() {
        let tiers = RiskTiers::default();
        assert_eq!(categorize(0.0, &tiers), RiskCategory::Low);
        assert_eq!(categorize(30.0, &tiers), RiskCategory::Low);
        assert_eq!(categorize(31.0, &tiers), RiskCategory::Medium);
        assert_eq!(categorize(60.0, &tiers), RiskCategory::Medium);
        assert_eq!(categorize(61.0, &tiers), RiskCategory::High);
        assert_eq!(categorize(85.0, &tiers), RiskCategory::High);
        assert_eq!(categorize(86.0, &tiers), RiskCategory::VeryHigh);
        assert_eq!(categorize(100.0, &tiers), RiskCategory::VeryHigh);
    }

    #[test]
    fn out_of_range_and_nan() {
        let tiers = RiskTiers::default();
        assert_eq!(categorize(-12.0, &tiers), RiskCategory::Low);
        assert_eq!(categorize(140.0, &tiers), RiskCategory::VeryHigh);
        assert_eq!(categorize(f64::INFINITY, &tiers), RiskCategory::VeryHigh);
        assert_eq!(categorize(f64::NEG_INFINITY, &tiers), RiskCategory::Low);
        assert_eq!(categorize(f64::NAN, &tiers), RiskCategory::VeryHigh);
    }
}
