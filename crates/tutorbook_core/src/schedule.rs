//! crates/tutorbook_core/src/schedule.rs
//!
//! Pure time-interval utilities: overlap detection over half-open intervals
//! and lazy expansion of recurrence templates into concrete occurrences.

use chrono::{DateTime, Duration, Months, Utc};

use crate::domain::Recurrence;

/// Horizon applied when a recurring-slot request carries no explicit end:
/// occurrences are generated for 90 days past the first start.
pub const DEFAULT_HORIZON_DAYS: i64 = 90;

/// Upper bound on occurrences per batch when the caller does not say.
pub const DEFAULT_MAX_OCCURRENCES: u32 = 30;

/// Half-open interval overlap: `[a_start, a_end)` and `[b_start, b_end)`
/// share an instant. Touching endpoints do not overlap.
pub fn overlaps(
    a_start: DateTime<Utc>,
    a_end: DateTime<Utc>,
    b_start: DateTime<Utc>,
    b_end: DateTime<Utc>,
) -> bool {
    a_start < b_end && a_end > b_start
}

/// A lazy, finite sequence of `(start, end)` occurrence pairs expanded from
/// a recurrence template. No side effects; iterating twice from two calls to
/// [`expand_recurrence`] yields the same pairs.
///
/// Every occurrence is computed from the base pair, not from the previous
/// occurrence. Monthly expansion clamps short months without losing the
/// anchor day: Jan 31 yields Feb 28, then Mar 31 again.
#[derive(Debug, Clone)]
pub struct Occurrences {
    base_start: DateTime<Utc>,
    base_end: DateTime<Utc>,
    pattern: Recurrence,
    horizon: DateTime<Utc>,
    step: u32,
    remaining: u32,
}

impl Iterator for Occurrences {
    type Item = (DateTime<Utc>, DateTime<Utc>);

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let current = match self.pattern {
            // A non-recurring template is a single occurrence.
            Recurrence::None => {
                if self.step > 0 {
                    return None;
                }
                (self.base_start, self.base_end)
            }
            Recurrence::Daily => {
                let shift = Duration::days(i64::from(self.step));
                (self.base_start + shift, self.base_end + shift)
            }
            Recurrence::Weekly => {
                let shift = Duration::days(7 * i64::from(self.step));
                (self.base_start + shift, self.base_end + shift)
            }
            Recurrence::Monthly => {
                let months = Months::new(self.step);
                match (
                    self.base_start.checked_add_months(months),
                    self.base_end.checked_add_months(months),
                ) {
                    (Some(start), Some(end)) => (start, end),
                    _ => return None,
                }
            }
        };
        if current.0 >= self.horizon {
            return None;
        }
        self.step += 1;
        self.remaining -= 1;
        Some(current)
    }
}

/// Expands a recurrence template into up to `max_count` occurrences whose
/// starts fall strictly before `horizon` (defaulting to the first start plus
/// [`DEFAULT_HORIZON_DAYS`]).
pub fn expand_recurrence(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    pattern: Recurrence,
    horizon: Option<DateTime<Utc>>,
    max_count: u32,
) -> Occurrences {
    Occurrences {
        base_start: start,
        base_end: end,
        pattern,
        horizon: horizon.unwrap_or(start + Duration::days(DEFAULT_HORIZON_DAYS)),
        step: 0,
        remaining: max_count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn overlap_is_half_open() {
        let a = at(2025, 12, 1, 10, 0);
        let b = at(2025, 12, 1, 11, 0);
        let c = at(2025, 12, 1, 12, 0);

        assert!(overlaps(a, c, b, c));
        assert!(overlaps(a, b, a, c));
        // Touching endpoints share no instant.
        assert!(!overlaps(a, b, b, c));
        assert!(!overlaps(b, c, a, b));
        // Disjoint.
        assert!(!overlaps(a, b, c, at(2025, 12, 1, 13, 0)));
    }

    #[test]
    fn containment_counts_as_overlap() {
        let outer_start = at(2025, 12, 1, 9, 0);
        let outer_end = at(2025, 12, 1, 13, 0);
        let inner_start = at(2025, 12, 1, 10, 0);
        let inner_end = at(2025, 12, 1, 11, 0);

        assert!(overlaps(inner_start, inner_end, outer_start, outer_end));
        assert!(overlaps(outer_start, outer_end, inner_start, inner_end));
    }

    #[test]
    fn weekly_expansion_stops_at_horizon() {
        let occurrences: Vec<_> = expand_recurrence(
            at(2025, 12, 1, 10, 0),
            at(2025, 12, 1, 11, 0),
            Recurrence::Weekly,
            Some(at(2025, 12, 22, 0, 0)),
            30,
        )
        .collect();

        // Dec 22 itself is excluded: a start equal to the horizon is out.
        assert_eq!(
            occurrences,
            vec![
                (at(2025, 12, 1, 10, 0), at(2025, 12, 1, 11, 0)),
                (at(2025, 12, 8, 10, 0), at(2025, 12, 8, 11, 0)),
                (at(2025, 12, 15, 10, 0), at(2025, 12, 15, 11, 0)),
            ]
        );
    }

    #[test]
    fn daily_expansion_respects_max_count() {
        let count = expand_recurrence(
            at(2026, 1, 1, 9, 0),
            at(2026, 1, 1, 10, 0),
            Recurrence::Daily,
            Some(at(2027, 1, 1, 0, 0)),
            30,
        )
        .count();
        assert_eq!(count, 30);
    }

    #[test]
    fn default_horizon_is_ninety_days() {
        let count = expand_recurrence(
            at(2026, 1, 1, 9, 0),
            at(2026, 1, 1, 10, 0),
            Recurrence::Daily,
            None,
            500,
        )
        .count();
        assert_eq!(count, 90);
    }

    #[test]
    fn monthly_expansion_clamps_day_of_month() {
        let occurrences: Vec<_> = expand_recurrence(
            at(2026, 1, 31, 14, 0),
            at(2026, 1, 31, 15, 0),
            Recurrence::Monthly,
            Some(at(2026, 4, 1, 0, 0)),
            30,
        )
        .collect();

        assert_eq!(
            occurrences,
            vec![
                (at(2026, 1, 31, 14, 0), at(2026, 1, 31, 15, 0)),
                (at(2026, 2, 28, 14, 0), at(2026, 2, 28, 15, 0)),
                (at(2026, 3, 31, 14, 0), at(2026, 3, 31, 15, 0)),
            ]
        );
    }

    #[test]
    fn none_pattern_yields_a_single_occurrence() {
        let occurrences: Vec<_> = expand_recurrence(
            at(2026, 1, 1, 9, 0),
            at(2026, 1, 1, 10, 0),
            Recurrence::None,
            None,
            30,
        )
        .collect();
        assert_eq!(occurrences.len(), 1);
    }

    #[test]
    fn expansion_is_restartable() {
        let make = || {
            expand_recurrence(
                at(2026, 3, 2, 8, 0),
                at(2026, 3, 2, 9, 0),
                Recurrence::Weekly,
                None,
                5,
            )
        };
        let first: Vec<_> = make().collect();
        let second: Vec<_> = make().collect();
        assert_eq!(first, second);
        assert_eq!(first.len(), 5);
    }
}
