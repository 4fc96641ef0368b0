//! Top-service ranking and money formatting

use std::collections::HashMap;

/// Costs at or below this are dropped from every breakdown
pub const NEGLIGIBLE_COST: f64 = 0.001;

/// Default number of services kept in a snapshot
pub const DEFAULT_TOP_SERVICES: usize = 10;

/// Top `limit` services by cost, descending.
///
/// The sort is stable, so equal costs keep their input order.
pub fn top_services(mut services: Vec<(String, f64)>, limit: usize) -> Vec<(String, f64)> {
    services.sort_by(|a, b| b.1.total_cmp(&a.1));
    services.truncate(limit);
    services
}

/// Drop negligible entries, round to cents, then rank
pub fn rank_breakdown(services: Vec<(String, f64)>, limit: usize) -> Vec<(String, f64)> {
    let kept = services
        .into_iter()
        .filter(|(_, cost)| is_billable(*cost))
        .map(|(name, cost)| (name, round_cents(cost)))
        .collect();
    top_services(kept, limit)
}

pub fn is_billable(cost: f64) -> bool {
    cost > NEGLIGIBLE_COST
}

pub fn round_cents(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

/// Format an amount as `$123.45`
pub fn format_currency(amount: f64) -> String {
    format!("${:.2}", amount)
}

/// Per-service cost accumulator that remembers first-seen order
#[derive(Debug, Default)]
pub struct ServiceTotals {
    entries: Vec<(String, f64)>,
    index: HashMap<String, usize>,
}

impl ServiceTotals {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, service: &str, cost: f64) {
        match self.index.get(service) {
            Some(&slot) => self.entries[slot].1 += cost,
            None => {
                self.index.insert(service.to_string(), self.entries.len());
                self.entries.push((service.to_string(), cost));
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sum of the entries that survive the negligible filter
    pub fn billable_total(&self) -> f64 {
        self.entries
            .iter()
            .map(|(_, cost)| *cost)
            .filter(|cost| is_billable(*cost))
            .sum()
    }

    pub fn into_entries(self) -> Vec<(String, f64)> {
        self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries(items: &[(&str, f64)]) -> Vec<(String, f64)> {
        items.iter().map(|(n, c)| (n.to_string(), *c)).collect()
    }

    #[test]
    fn sorts_descending_and_truncates() {
        let ranked = top_services(
            entries(&[("S3", 1.0), ("EC2", 5.0), ("RDS", 3.0), ("SQS", 0.5)]),
            3,
        );
        let names: Vec<&str> = ranked.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["EC2", "RDS", "S3"]);
    }

    #[test]
    fn ties_keep_input_order() {
        let ranked = top_services(
            entries(&[("b", 2.0), ("a", 2.0), ("c", 9.0), ("d", 2.0)]),
            10,
        );
        let names: Vec<&str> = ranked.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["c", "b", "a", "d"]);
    }

    #[test]
    fn empty_input_yields_empty_output() {
        assert!(top_services(Vec::new(), 10).is_empty());
        assert!(top_services(entries(&[("x", 1.0)]), 0).is_empty());
    }

    #[test]
    fn output_is_sorted_and_bounded_for_many_inputs() {
        // Deterministic pseudo-random costs
        let mut seed: u64 = 0x2545_f491;
        for len in 0..40usize {
            let mut list = Vec::new();
            for i in 0..len {
                seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                let cost = ((seed >> 33) % 1000) as f64 / 100.0;
                list.push((format!("svc-{i}"), cost));
            }
            for limit in [0usize, 1, 5, 10, 50] {
                let ranked = top_services(list.clone(), limit);
                assert!(ranked.len() <= limit);
                assert!(ranked.windows(2).all(|w| w[0].1 >= w[1].1));
            }
        }
    }

    #[test]
    fn negligible_entries_never_ranked() {
        let ranked = rank_breakdown(
            entries(&[("tiny", 0.0009), ("edge", 0.001), ("zero", 0.0), ("real", 0.25)]),
            10,
        );
        assert_eq!(ranked, entries(&[("real", 0.25)]));
    }

    #[test]
    fn formats_currency_with_two_decimals() {
        assert_eq!(format_currency(1.5), "$1.50");
        assert_eq!(format_currency(1000.0), "$1000.00");
        assert_eq!(format_currency(0.0), "$0.00");
        assert_eq!(format_currency(123.456), "$123.46");
    }

    #[test]
    fn service_totals_accumulate_in_first_seen_order() {
        let mut totals = ServiceTotals::new();
        totals.add("Amazon S3", 0.5);
        totals.add("AWS WAF", 1.0);
        totals.add("Amazon S3", 0.25);
        totals.add("Tax", 0.0005);
        assert!((totals.billable_total() - 1.75).abs() < 1e-9);
        assert_eq!(
            totals.into_entries(),
            entries(&[("Amazon S3", 0.75), ("AWS WAF", 1.0), ("Tax", 0.0005)])
        );
    }
}
