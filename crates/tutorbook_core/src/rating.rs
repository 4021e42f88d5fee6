//! crates/tutorbook_core/src/rating.rs
//!
//! The tutor aggregate-rating calculator.

/// Recomputes a tutor's aggregate from the full set of their rated bookings:
/// the arithmetic mean rounded to 2 decimal places, and the review count.
///
/// This is a full recompute on purpose. An incremental running-average
/// update would drift under repeated floating rounding; recomputing from
/// every stored rating keeps the aggregate exact at O(rated bookings) cost.
/// Callers guarantee `ratings` is non-empty (the rating just submitted is
/// always in the set).
pub fn recompute(ratings: &[i64]) -> (f64, i64) {
    debug_assert!(!ratings.is_empty());
    let sum: i64 = ratings.iter().sum();
    let mean = sum as f64 / ratings.len() as f64;
    ((mean * 100.0).round() / 100.0, ratings.len() as i64)
}
