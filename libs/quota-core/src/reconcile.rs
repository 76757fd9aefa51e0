use std::collections::BTreeMap;

use crate::model::{UsageProvenance, UsageRecord};

/// Picks one usage value per quota code from the metric and API maps.
///
/// An API count wins over a metric sample for the same quota; metric-only
/// quotas fall back to the sample. Codes missing from both maps are left out.
pub fn reconcile(
    metric: &BTreeMap<String, u64>,
    api: &BTreeMap<String, u64>,
) -> BTreeMap<String, UsageRecord> {
    let mut view: BTreeMap<String, UsageRecord> = metric
        .iter()
        .map(|(code, value)| {
            (
                code.clone(),
                UsageRecord {
                    quota_code: code.clone(),
                    value: *value,
                    source: UsageProvenance::Metric,
                },
            )
        })
        .collect();

    for (code, value) in api {
        view.insert(
            code.clone(),
            UsageRecord {
                quota_code: code.clone(),
                value: *value,
                source: UsageProvenance::Api,
            },
        );
    }

    view
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usage(entries: &[(&str, u64)]) -> BTreeMap<String, u64> {
        entries
            .iter()
            .map(|(code, value)| (code.to_string(), *value))
            .collect()
    }

    #[test]
    fn api_value_takes_precedence() {
        let metric = usage(&[("L-A", 3)]);
        let api = usage(&[("L-A", 7)]);

        let view = reconcile(&metric, &api);
        let record = view.get("L-A").unwrap();
        assert_eq!(record.value, 7);
        assert_eq!(record.source, UsageProvenance::Api);
    }

    #[test]
    fn single_source_values_keep_their_label() {
        let metric = usage(&[("L-M", 11)]);
        let api = usage(&[("L-P", 4)]);

        let view = reconcile(&metric, &api);
        assert_eq!(view.len(), 2);
        assert_eq!(view["L-M"].value, 11);
        assert_eq!(view["L-M"].source, UsageProvenance::Metric);
        assert_eq!(view["L-P"].value, 4);
        assert_eq!(view["L-P"].source, UsageProvenance::Api);
    }

    #[test]
    fn codes_absent_from_both_maps_are_excluded() {
        let view = reconcile(&usage(&[("L-M", 1)]), &usage(&[]));
        assert!(!view.contains_key("L-UNKNOWN"));
        assert!(reconcile(&usage(&[]), &usage(&[])).is_empty());
    }
}
