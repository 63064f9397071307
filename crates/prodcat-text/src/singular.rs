//! Rule-based English singularizer.
//!
//! Irregular plurals and uncountable nouns are looked up first, then
//! suffix rules are tried longest-first. Words ending in a double `s`
//! are never changed.

use once_cell::sync::Lazy;
use std::collections::{HashMap, HashSet};

static IRREGULAR: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    [
        ("people", "person"),
        ("men", "man"),
        ("women", "woman"),
        ("children", "child"),
        ("feet", "foot"),
        ("teeth", "tooth"),
        ("geese", "goose"),
        ("mice", "mouse"),
        ("oxen", "ox"),
        ("dice", "die"),
        ("knives", "knife"),
        ("wives", "wife"),
        ("lives", "life"),
        ("leaves", "leaf"),
        ("loaves", "loaf"),
        ("thieves", "thief"),
        ("halves", "half"),
        ("shelves", "shelf"),
        ("wolves", "wolf"),
        ("calves", "calf"),
        ("scarves", "scarf"),
        ("potatoes", "potato"),
        ("tomatoes", "tomato"),
        ("heroes", "hero"),
        ("echoes", "echo"),
        ("cookies", "cookie"),
        ("movies", "movie"),
        ("zombies", "zombie"),
        ("buses", "bus"),
        ("gases", "gas"),
        ("lenses", "lens"),
        ("indices", "index"),
        ("matrices", "matrix"),
        ("vertices", "vertex"),
        ("appendices", "appendix"),
        ("criteria", "criterion"),
        ("phenomena", "phenomenon"),
        ("cacti", "cactus"),
        ("fungi", "fungus"),
    ]
    .into_iter()
    .collect()
});

static UNCOUNTABLE: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "series", "species", "news", "sheep", "fish", "deer", "moose", "equipment",
        "information", "rice", "aircraft", "headquarters", "means", "pants", "jeans",
        "shorts", "scissors", "tights", "leggings", "trousers", "pliers", "tongs",
        "binoculars", "clothes", "lens", "canvas", "atlas", "chaos",
    ]
    .into_iter()
    .collect()
});

/// Suffix rules: (suffix, replacement, minimum word length). Longer suffixes first.
const RULES: &[(&str, &str, usize)] = &[
    ("sses", "ss", 5),
    ("zzes", "zz", 5),
    ("aches", "ache", 6),
    ("ches", "ch", 5),
    ("shes", "sh", 5),
    ("xes", "x", 4),
    ("ies", "y", 5),
    ("ous", "ous", 0),
    ("ss", "ss", 0),
    ("us", "us", 0),
    ("is", "is", 0),
    ("s", "", 4),
];

/// Singularize a single lower-case word.
pub fn singularize(word: &str) -> String {
    if word.ends_with("ss") {
        return word.to_string();
    }
    if UNCOUNTABLE.contains(word) {
        return word.to_string();
    }
    if let Some(single) = IRREGULAR.get(word) {
        return single.to_string();
    }

    for &(suffix, replacement, min_len) in RULES {
        if word.ends_with(suffix) && word.len() >= min_len {
            let stem = &word[..word.len() - suffix.len()];
            return format!("{}{}", stem, replacement);
        }
    }

    word.to_string()
}
