use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::category::VisemeCategory;

/// Sparse category → weight map. Missing categories weigh zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VisemeWeights(BTreeMap<VisemeCategory, f32>);

impl VisemeWeights {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// A vector holding a single category at full weight.
    pub fn single(category: VisemeCategory) -> Self {
        let mut weights = Self::new();
        weights.set(category, 1.0);
        weights
    }

    pub fn get(&self, category: VisemeCategory) -> f32 {
        self.0.get(&category).copied().unwrap_or(0.0)
    }

    pub fn set(&mut self, category: VisemeCategory, weight: f32) {
        self.0.insert(category, weight);
    }

    pub fn contains(&self, category: VisemeCategory) -> bool {
        self.0.contains_key(&category)
    }

    pub fn iter(&self) -> impl Iterator<Item = (VisemeCategory, f32)> + '_ {
        self.0.iter().map(|(k, v)| (*k, *v))
    }

    pub fn categories(&self) -> impl Iterator<Item = VisemeCategory> + '_ {
        self.0.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn sum(&self) -> f32 {
        self.0.values().sum()
    }

    /// Category with the highest weight, if any.
    pub fn dominant(&self) -> Option<(VisemeCategory, f32)> {
        self.iter()
            .fold(None, |best: Option<(VisemeCategory, f32)>, (k, v)| match best {
                Some((_, w)) if w >= v => best,
                _ => Some((k, v)),
            })
    }
}

impl FromIterator<(VisemeCategory, f32)> for VisemeWeights {
    fn from_iter<I: IntoIterator<Item = (VisemeCategory, f32)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
