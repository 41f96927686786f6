use chrono::{DateTime, Utc};

use super::types::{CrlMetadata, HealthState, HealthStatus};

/// Classifies one enabled source from its stored metadata.
///
/// Precedence: no usable record is `missing`, a recorded failure is `error`,
/// then staleness. A declared `next_update` in the past marks the record
/// stale even when it is fresh by age; otherwise the age threshold decides.
pub fn evaluate(
    name: &str,
    metadata: Option<&CrlMetadata>,
    now: DateTime<Utc>,
    max_age_hours: f64,
) -> HealthStatus {
    let Some(metadata) = metadata else {
        return status(name, HealthState::Missing, None);
    };
    let age_hours = metadata.age_hours(now);
    if metadata.last_error.is_some() {
        return status(name, HealthState::Error, age_hours);
    }
    // A document without a successful fetch behind it (half of a partial
    // write) counts as missing, so the next run re-fetches.
    let Some(age) = age_hours else {
        return status(name, HealthState::Missing, None);
    };
    let overdue = metadata.next_update.is_some_and(|next_update| now > next_update);
    if overdue || age > max_age_hours {
        return status(name, HealthState::Stale, age_hours);
    }
    status(name, HealthState::Healthy, age_hours)
}

fn status(name: &str, state: HealthState, age_hours: Option<f64>) -> HealthStatus {
    HealthStatus {
        name: name.to_string(),
        status: state,
        age_hours,
    }
}
