//! Queue priority calculation.
//!
//! Pure and deterministic: the dispatcher recomputes priorities at enqueue
//! time, and test fixtures rely on identical inputs producing identical
//! scores.

use crate::registry::SearchKind;

use super::types::PriorityInput;

/// Age contribution saturates after a year.
const AGE_CAP_DAYS: i64 = 365;
/// Maximum points the age score can contribute.
const AGE_MAX_SCORE: i64 = 70;
/// Points subtracted per prior failed attempt.
const ATTEMPT_PENALTY: i64 = 10;
/// The computed base never drops below this.
const BASE_FLOOR: i64 = 5;
/// The computed base never exceeds this; manual boost stacks on top.
const BASE_CAP: i64 = 100;

fn kind_weight(kind: SearchKind) -> i64 {
    match kind {
        SearchKind::Gap => 20,
        SearchKind::Upgrade => 5,
    }
}

/// Compute the queue priority for an entry.
///
/// Base score: age (older scores higher, capped at a year) plus the search
/// kind weight, minus a penalty per prior attempt, clamped to
/// `[BASE_FLOOR, BASE_CAP]`. A manual boost of 0 to 100 is added on top of
/// the clamped base, so a boosted entry can outrank any unboosted one.
pub fn compute_priority(input: &PriorityInput) -> u32 {
    let age_days = input.age_days.clamp(0, AGE_CAP_DAYS);
    let age_score = age_days * AGE_MAX_SCORE / AGE_CAP_DAYS;
    let penalty = i64::from(input.attempt_count) * ATTEMPT_PENALTY;

    let base = (age_score + kind_weight(input.search_kind) - penalty).clamp(BASE_FLOOR, BASE_CAP);
    let boost = i64::from(input.manual_boost.unwrap_or(0).min(100));

    (base + boost) as u32
}
