//! Viseme mapping for streamed speech.
//!
//! Turns timestamped phoneme events from a speech provider into blended
//! mouth-shape weights. One [`VisemeMapper`] belongs to exactly one session.

mod category;
mod fallback;
mod mapper;
mod weights;

pub use category::{category_for, VisemeCategory};
pub use fallback::{simple_viseme, SimpleViseme, DEFAULT_SIMPLE_DURATION_MS};
pub use mapper::{
    coarticulate, normalize, raw_weights, smooth, SmoothingParams, SmoothingState,
    TimestampEvent, VisemeFrame, VisemeMapper,
};
pub use weights::VisemeWeights;

/// How visemes are rendered to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VisemeMode {
    /// Smoothed multi-category weights.
    #[default]
    Weighted,
    /// Single category per event, no blending.
    Simple,
}

impl VisemeMode {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "weighted" => Some(VisemeMode::Weighted),
            "simple" | "single" => Some(VisemeMode::Simple),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_viseme_mode_parse() {
        assert_eq!(VisemeMode::parse("weighted"), Some(VisemeMode::Weighted));
        assert_eq!(VisemeMode::parse(" Simple "), Some(VisemeMode::Simple));
        assert_eq!(VisemeMode::parse("fancy"), None);
        assert_eq!(VisemeMode::default(), VisemeMode::Weighted);
    }
}
