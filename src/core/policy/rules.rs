//! Pure score functions. Every input arrives as an argument; nothing here
//! touches process state.

use crate::common::constants::FOREGROUND_APP_ADJ;
use crate::core::config::ScoringParams;

pub fn strict_main(_p: &ScoringParams, _raw: i32) -> i32 {
    FOREGROUND_APP_ADJ
}

pub fn strict_high_priority_sub(_p: &ScoringParams, _raw: i32) -> i32 {
    FOREGROUND_APP_ADJ
}

pub fn balance_main(p: &ScoringParams, _raw: i32) -> i32 {
    p.min_background_adj
}

pub fn balance_high_priority_sub(p: &ScoringParams, _raw: i32) -> i32 {
    p.min_background_adj.saturating_add(p.subprocess_offset)
}

pub fn balance_plus_main(p: &ScoringParams, raw: i32) -> i32 {
    (raw / p.conversion_factor.max(1)).clamp(p.min_background_adj, p.max_background_adj)
}

pub fn balance_plus_high_priority_sub(p: &ScoringParams, raw: i32) -> i32 {
    balance_plus_main(p, raw).saturating_add(p.subprocess_offset)
}

pub fn negative_main(p: &ScoringParams, _raw: i32) -> i32 {
    p.negative_adj
}

pub fn negative_high_priority_sub(p: &ScoringParams, _raw: i32) -> i32 {
    p.negative_adj.saturating_add(p.subprocess_offset)
}

/// Three buckets for kernels that only honour a handful of levels.
pub fn simple_lmk_tier(p: &ScoringParams, raw: i32) -> i32 {
    let min = p.min_background_adj;
    let max = p.max_background_adj;
    if raw <= p.simple_lmk_low_threshold {
        min
    } else if raw <= p.simple_lmk_high_threshold {
        mid(min, max)
    } else {
        max
    }
}

/// `round((min + max) / 2)`, halves away from zero.
#[inline]
pub fn mid(min: i32, max: i32) -> i32 {
    let sum = min.saturating_add(max);
    if sum >= 0 { (sum + 1) / 2 } else { (sum - 1) / 2 }
}

/// Lenient floor for high-priority processes that never showed UI.
pub fn hidden_high_priority(p: &ScoringParams, raw: i32) -> i32 {
    raw.max(p.min_subprocess_adj)
}
