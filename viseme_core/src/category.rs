//! Viseme categories and the phoneme/character lookup table.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Mouth shape categories driven on the avatar.
///
/// `Rest` is implicit: it is never produced by a lookup and is only present
/// so renderers can name the neutral pose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum VisemeCategory {
    #[serde(rename = "AI")]
    Ai,
    #[serde(rename = "E")]
    E,
    #[serde(rename = "O")]
    O,
    #[serde(rename = "U")]
    U,
    #[serde(rename = "MBP")]
    Mbp,
    #[serde(rename = "FV")]
    Fv,
    #[serde(rename = "L")]
    L,
    #[serde(rename = "R")]
    R,
    #[serde(rename = "WQ")]
    Wq,
    #[serde(rename = "CH")]
    Ch,
    #[serde(rename = "TH")]
    Th,
    #[serde(rename = "Rest")]
    Rest,
}

impl VisemeCategory {
    /// Every category that a lookup can produce.
    pub const SPOKEN: [VisemeCategory; 11] = [
        VisemeCategory::Ai,
        VisemeCategory::E,
        VisemeCategory::O,
        VisemeCategory::U,
        VisemeCategory::Mbp,
        VisemeCategory::Fv,
        VisemeCategory::L,
        VisemeCategory::R,
        VisemeCategory::Wq,
        VisemeCategory::Ch,
        VisemeCategory::Th,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            VisemeCategory::Ai => "AI",
            VisemeCategory::E => "E",
            VisemeCategory::O => "O",
            VisemeCategory::U => "U",
            VisemeCategory::Mbp => "MBP",
            VisemeCategory::Fv => "FV",
            VisemeCategory::L => "L",
            VisemeCategory::R => "R",
            VisemeCategory::Wq => "WQ",
            VisemeCategory::Ch => "CH",
            VisemeCategory::Th => "TH",
            VisemeCategory::Rest => "Rest",
        }
    }
}

impl fmt::Display for VisemeCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Look up the category for a phoneme code or a single character.
///
/// Providers emit either plain characters of the input text (`"a"`, `"ß"`),
/// ARPAbet codes (`"AA1"`, stress digits are ignored) or IPA symbols
/// (`"ʃ"`). Matching is case-insensitive. Anything unknown, including
/// whitespace and punctuation, yields `None`.
pub fn category_for(code: &str) -> Option<VisemeCategory> {
    let code = code.trim();
    if code.is_empty() {
        return None;
    }
    let lowered = code.to_lowercase();
    let key = lowered.trim_end_matches(|c: char| c.is_ascii_digit());
    if key.is_empty() {
        return None;
    }

    use VisemeCategory::*;
    let category = match key {
        // open vowels
        "a" | "á" | "à" | "â" | "i" | "í" | "ì" | "î" | "aa" | "ae" | "ah" | "ay" | "ih" | "iy"
        | "ɑ" | "æ" | "ʌ" | "ɪ" | "aɪ" | "ɐ" | "ə" => Ai,
        // spread vowels and the generic alveolar/velar consonants
        "e" | "é" | "è" | "ê" | "ä" | "eh" | "ey" | "er" | "ɛ" | "eɪ" | "ɜ" | "ɚ" | "s" | "z"
        | "c" | "k" | "g" | "x" | "h" | "y" | "ß" | "t" | "d" | "n" | "hh" | "ng" | "ŋ" => E,
        // rounded vowels
        "o" | "ó" | "ò" | "ô" | "ö" | "ao" | "aw" | "ow" | "oy" | "ɔ" | "oʊ" | "ø" | "œ" => O,
        "u" | "ú" | "ù" | "û" | "ü" | "uh" | "uw" | "ʊ" | "y:" | "ʏ" => U,
        // bilabials
        "m" | "b" | "p" | "em" => Mbp,
        // labiodentals
        "f" | "v" | "ph" => Fv,
        "l" | "el" | "en" | "ɫ" => L,
        "r" | "ɹ" | "ʁ" | "ɾ" => R,
        "w" | "q" | "qu" => Wq,
        // postalveolars and affricates
        "j" | "ch" | "sh" | "zh" | "jh" | "ʃ" | "ʒ" | "tʃ" | "dʒ" | "ç" => Ch,
        "th" | "dh" | "θ" | "ð" => Th,
        _ => return None,
    };
    Some(category)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_characters() {
        assert_eq!(category_for("a"), Some(VisemeCategory::Ai));
        assert_eq!(category_for("A"), Some(VisemeCategory::Ai));
        assert_eq!(category_for("m"), Some(VisemeCategory::Mbp));
        assert_eq!(category_for("w"), Some(VisemeCategory::Wq));
        assert_eq!(category_for("l"), Some(VisemeCategory::L));
        assert_eq!(category_for("j"), Some(VisemeCategory::Ch));
    }

    #[test]
    fn test_german_characters() {
        assert_eq!(category_for("ä"), Some(VisemeCategory::E));
        assert_eq!(category_for("Ö"), Some(VisemeCategory::O));
        assert_eq!(category_for("ü"), Some(VisemeCategory::U));
        assert_eq!(category_for("ß"), Some(VisemeCategory::E));
    }

    #[test]
    fn test_arpabet_stress_digits_ignored() {
        assert_eq!(category_for("AA1"), Some(VisemeCategory::Ai));
        assert_eq!(category_for("OW0"), Some(VisemeCategory::O));
        assert_eq!(category_for("TH"), Some(VisemeCategory::Th));
        assert_eq!(category_for("SH"), Some(VisemeCategory::Ch));
    }

    #[test]
    fn test_ipa_symbols() {
        assert_eq!(category_for("ʃ"), Some(VisemeCategory::Ch));
        assert_eq!(category_for("θ"), Some(VisemeCategory::Th));
        assert_eq!(category_for("ɔ"), Some(VisemeCategory::O));
    }

    #[test]
    fn test_unknown_codes() {
        assert_eq!(category_for(""), None);
        assert_eq!(category_for(" "), None);
        assert_eq!(category_for("."), None);
        assert_eq!(category_for("?"), None);
        assert_eq!(category_for("1"), None);
        assert_eq!(category_for("xyz"), None);
    }

    #[test]
    fn test_rest_is_never_looked_up() {
        assert_eq!(category_for("rest"), None);
        assert!(!VisemeCategory::SPOKEN.contains(&VisemeCategory::Rest));
    }

    #[test]
    fn test_serialized_names() {
        let json = serde_json::to_string(&VisemeCategory::Mbp).unwrap();
        assert_eq!(json, "\"MBP\"");
        for category in VisemeCategory::SPOKEN {
            let json = serde_json::to_string(&category).unwrap();
            assert_eq!(json, format!("\"{}\"", category));
        }
    }
}
