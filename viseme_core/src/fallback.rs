//! Degraded single-category mapping.
//!
//! Direct character → category lookup without normalization, coarticulation
//! or smoothing. Kept for renderers that cannot blend shapes; the weighted
//! [`VisemeMapper`](crate::VisemeMapper) stays the canonical output.

use serde::{Deserialize, Serialize};

use crate::category::{category_for, VisemeCategory};
use crate::mapper::TimestampEvent;

/// Default hold time for a single-category viseme.
pub const DEFAULT_SIMPLE_DURATION_MS: u64 = 80;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimpleViseme {
    pub value: VisemeCategory,
    pub pts_ms: u64,
    pub duration_ms: u64,
}

/// Map one event to a single category. Same silence rule as the weighted
/// mapper: no phoneme, no output.
pub fn simple_viseme(event: &TimestampEvent, duration_ms: u64) -> Option<SimpleViseme> {
    let value = category_for(event.phoneme.as_deref()?)?;
    Some(SimpleViseme {
        value,
        pts_ms: event.t_ms,
        duration_ms,
    })
}
