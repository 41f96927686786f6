use std::collections::HashSet;

use chrono::{DateTime, Utc};

use super::types::CrlMetadata;

/// Names of the records the sweep should delete: sources that are no longer
/// enabled and whose last successful fetch is past the retention window.
///
/// Enabled sources are never selected regardless of age; an old record for a
/// live source is a health problem, not garbage. A disabled source that
/// never fetched successfully has nothing worth retaining and is selected
/// right away.
pub fn select_expired(
    all_metadata: &[CrlMetadata],
    enabled_names: &HashSet<String>,
    retention_days: f64,
    now: DateTime<Utc>,
) -> Vec<String> {
    let retention_secs = retention_days * 86_400.0;
    all_metadata
        .iter()
        .filter(|metadata| !enabled_names.contains(&metadata.name))
        .filter(|metadata| match metadata.fetched_at {
            Some(fetched_at) => (now - fetched_at).num_seconds() as f64 > retention_secs,
            None => true,
        })
        .map(|metadata| metadata.name.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    const RETENTION_DAYS: f64 = 7.0;

    fn fetched_days_ago(name: &str, days: i64) -> CrlMetadata {
        let mut metadata =
            CrlMetadata::new(name, &format!("https://pki.example.org/{name}.crl"));
        metadata.fetched_at = Some(Utc::now() - Duration::days(days));
        metadata
    }

    fn enabled(names: &[&str]) -> HashSet<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    #[test]
    fn disabled_source_past_retention_is_selected() {
        let all = vec![fetched_days_ago("old-ca", 8)];
        let selected = select_expired(&all, &enabled(&[]), RETENTION_DAYS, Utc::now());
        assert_eq!(selected, vec!["old-ca".to_string()]);
    }

    #[test]
    fn enabled_source_is_kept_regardless_of_age() {
        let all = vec![fetched_days_ago("root-ca", 400)];
        let selected = select_expired(&all, &enabled(&["root-ca"]), RETENTION_DAYS, Utc::now());
        assert!(selected.is_empty());
    }

    #[test]
    fn disabled_source_inside_retention_is_kept() {
        let all = vec![fetched_days_ago("old-ca", 6)];
        let selected = select_expired(&all, &enabled(&[]), RETENTION_DAYS, Utc::now());
        assert!(selected.is_empty());
    }

    #[test]
    fn disabled_source_that_never_fetched_is_selected() {
        let all = vec![CrlMetadata::new(
            "stillborn-ca",
            "https://pki.example.org/stillborn.crl",
        )];
        let selected = select_expired(&all, &enabled(&[]), RETENTION_DAYS, Utc::now());
        assert_eq!(selected, vec!["stillborn-ca".to_string()]);
    }

    #[test]
    fn mixed_registry_only_selects_the_expired_disabled_ones() {
        let all = vec![
            fetched_days_ago("root-ca", 20),
            fetched_days_ago("old-ca", 20),
            fetched_days_ago("recent-ca", 2),
        ];
        let selected = select_expired(&all, &enabled(&["root-ca"]), RETENTION_DAYS, Utc::now());
        assert_eq!(selected, vec!["old-ca".to_string()]);
    }
}
