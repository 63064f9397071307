//! Product title cleaning.
//!
//! Pipeline (order matters):
//! 1. Lowercase
//! 2. Noise phrases, parentheticals, whitespace, accent folding
//! 3. Brand names
//! 4. Package markers (`pack x2`, `pack 12`)
//! 5. Dimensions (`10x5`, `2.5 x 3 x 4`)
//! 6. HTML tags
//! 7. Direct replacements (`a/c`, separators, `other`)
//! 8. Model numbers, digits, punctuation
//! 9. Per token: plant-compound split, singularize, synonyms
//! 10. Descriptors
//! 11. Stopwords

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use tracing::debug;

use prodcat_core::{Error, Language, Lexicon, Result};

use crate::singular;
use crate::stopwords;

static NOISE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"[p|P]arámetro por [o|O]misión",
        r"[r|R]eady to [w|W]ear",
        r"variety pack",
        r"\(.*\)",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());
static PACKAGE: Lazy<Regex> = Lazy::new(|| Regex::new(r"pack (x\d*|\d*)").unwrap());
static DIMENSIONS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\d+(\.\d+)?\s*x\s*\d+(\.\d+)?(\s*x\s*\d+(\.\d+)?)?").unwrap()
});
static HTML_TAG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"<(?:"[^"]*"['"]*|'[^']*'['"]*|[^'">])+>"#).unwrap()
});
static OTHERS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bothers?\b").unwrap());
static MODEL_NUMBERS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b[a-z]\d[a-z\d]*\b|\d[a-z]*").unwrap());
static NON_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-zA-Z0-9_áéíóúñ ]").unwrap());

/// Mis-encoded and accented sequences folded to plain letters.
const ACCENT_FOLDS: &[(&str, &str)] = &[
    ("√©", "e"),
    ("√≥", "o"),
    ("√≠", "i"),
    ("√±", "ñ"),
    ("√°", "a"),
    ("√∫", "u"),
    ("á", "a"),
    ("é", "e"),
    ("í", "i"),
    ("ó", "o"),
    ("ú", "u"),
    ("ü", "u"),
];

/// Compound plant names split into `<prefix> <suffix>` before singularization.
const PLANT_SUFFIXES: &[&str] = &["ferns", "grass", "plants", "trees", "shrubs"];

/// Deterministic normalizer for product titles.
pub struct TextCleaner {
    language: Language,
    brand_patterns: Vec<Regex>,
    singular_exceptions: HashMap<String, String>,
    synonyms: HashMap<String, String>,
    descriptors: HashSet<String>,
}

impl TextCleaner {
    /// Build a cleaner from the catalog lexicon. Fails only if a brand
    /// cannot be turned into a pattern.
    pub fn new(lexicon: &Lexicon, language: Language) -> Result<Self> {
        let mut brand_patterns = Vec::with_capacity(lexicon.brands.len());
        for brand in &lexicon.brands {
            let brand = brand.trim().to_lowercase();
            if brand.is_empty() {
                continue;
            }
            let pattern = format!(r"\b{}\b", regex::escape(&brand));
            let re = Regex::new(&pattern)
                .map_err(|e| Error::Config(format!("Invalid brand pattern '{}': {}", brand, e)))?;
            brand_patterns.push(re);
        }

        debug!(
            "TextCleaner ready: {} brands, {} exceptions, {} synonyms, {} descriptors, language={}",
            brand_patterns.len(),
            lexicon.singularize.len(),
            lexicon.synonyms.len(),
            lexicon.descriptors.len(),
            language
        );

        Ok(Self {
            language,
            brand_patterns,
            singular_exceptions: lexicon.singularize.clone(),
            synonyms: lexicon.synonyms.clone(),
            descriptors: lexicon.descriptors.iter().map(|d| d.to_lowercase()).collect(),
        })
    }

    /// Run the full cleaning pipeline. Returns space-separated lower-case tokens.
    pub fn clean_text(&self, text: &str) -> String {
        let text = text.to_lowercase();
        let text = remove_noise(&text);
        let text = self.remove_brands(&text);
        let text = PACKAGE.replace_all(&text, "").into_owned();
        let text = DIMENSIONS.replace_all(&text, "").into_owned();
        let text = HTML_TAG.replace_all(&text, "").into_owned();
        let text = direct_replacements(&text);
        let text = MODEL_NUMBERS.replace_all(&text, "").into_owned();
        let text = NON_WORD.replace_all(&text, "").into_owned();

        let tokens: Vec<String> = split_plant_compounds(text.split_whitespace())
            .into_iter()
            .map(|token| self.singularize_word(token))
            .map(|token| self.synonym(token))
            .filter(|token| !token.is_empty())
            .filter(|token| !self.descriptors.contains(token))
            .filter(|token| !stopwords::is_stopword(token, self.language))
            .collect();

        tokens.join(" ")
    }

    /// Singularize one word, honoring the catalog's exception dictionary.
    pub fn singularize_word(&self, word: &str) -> String {
        if word.ends_with("ss") {
            return word.to_string();
        }
        if let Some(exception) = self.singular_exceptions.get(word) {
            return exception.clone();
        }
        singular::singularize(word)
    }

    /// Singularize every whitespace-separated word.
    pub fn singularize_text(&self, text: &str) -> String {
        text.split_whitespace()
            .map(|w| self.singularize_word(w))
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn language(&self) -> Language {
        self.language
    }

    fn remove_brands(&self, text: &str) -> String {
        let mut text = text.to_string();
        for re in &self.brand_patterns {
            text = re.replace_all(&text, "").into_owned();
        }
        text
    }

    fn synonym(&self, token: String) -> String {
        match self.synonyms.get(&token) {
            Some(replacement) => replacement.clone(),
            None => token,
        }
    }
}

fn remove_noise(text: &str) -> String {
    let mut text = text.to_string();
    for re in NOISE_PATTERNS.iter() {
        text = re.replace_all(&text, "").into_owned();
    }
    let mut text = WHITESPACE.replace_all(&text, " ").into_owned();
    for &(from, to) in ACCENT_FOLDS {
        if text.contains(from) {
            text = text.replace(from, to);
        }
    }
    text.trim().to_string()
}

fn direct_replacements(text: &str) -> String {
    let text = text.replace("a/c", "air conditioner");
    let text = text.replace(['/', '-'], " ");
    OTHERS.replace_all(&text, "").into_owned()
}

fn split_plant_compounds<'a>(tokens: impl Iterator<Item = &'a str>) -> Vec<&'a str> {
    let mut out = Vec::new();
    for token in tokens {
        let split = PLANT_SUFFIXES.iter().find_map(|suffix| {
            token
                .strip_suffix(suffix)
                .filter(|prefix| !prefix.is_empty())
                .map(|prefix| (prefix, &token[prefix.len()..]))
        });
        match split {
            Some((prefix, suffix)) => {
                out.push(prefix);
                out.push(suffix);
            }
            None => out.push(token),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lexicon() -> Lexicon {
        Lexicon {
            brands: vec!["Apple".into(), "Samsung".into(), "Acme".into(), "".into()],
            singularize: HashMap::from([("cookies".to_string(), "cookie".to_string())]),
            synonyms: HashMap::from([("laptop".to_string(), "computer".to_string())]),
            descriptors: vec!["new".into(), "improved".into()],
        }
    }

    fn cleaner() -> TextCleaner {
        TextCleaner::new(&lexicon(), Language::English).unwrap()
    }

    #[test]
    fn test_clean_laptop_title() {
        let out = cleaner().clean_text("New Apple Laptop (15-inch) - 2020 Model");
        assert_eq!(out, "computer model");
    }

    #[test]
    fn test_clean_shoe_title() {
        let out = cleaner().clean_text("Acme Red Running Shoes 10x5 pack x2");
        assert_eq!(out, "red running shoe");
        assert!(!out.contains("acme"));
        assert!(!out.contains("10x5"));
        assert!(!out.contains("pack"));
    }

    #[test]
    fn test_brand_matches_whole_words_only() {
        let out = cleaner().clean_text("Pineapple Slicer");
        assert_eq!(out, "pineapple slicer");
    }

    #[test]
    fn test_html_and_punctuation_removed() {
        let out = cleaner().clean_text("<b>Wooden</b> Chairs, set!");
        assert_eq!(out, "wooden chair set");
    }

    #[test]
    fn test_direct_replacements() {
        let c = cleaner();
        assert_eq!(c.clean_text("Portable A/C Unit"), "portable air conditioner unit");
        assert_eq!(c.clean_text("Garden Tools & Others"), "garden tool");
        assert_eq!(c.clean_text("Brother Printer"), "brother printer");
    }

    #[test]
    fn test_model_numbers_and_digits_removed() {
        let out = cleaner().clean_text("Router x500ac 5ghz dual band");
        assert_eq!(out, "router dual band");
    }

    #[test]
    fn test_accent_folding_and_noise() {
        let out = cleaner().clean_text("Camiseta Ready to Wear algodón");
        assert_eq!(out, "camiseta algodon");
    }

    #[test]
    fn test_plant_compounds_split() {
        let out = cleaner().clean_text("Seagrass Baskets and Palmtrees");
        assert_eq!(out, "sea grass basket palm tree");
    }

    #[test]
    fn test_singularize_exceptions_and_ss() {
        let c = cleaner();
        assert_eq!(c.singularize_word("cookies"), "cookie");
        assert_eq!(c.singularize_word("glass"), "glass");
        assert_eq!(c.singularize_text("running shoes"), "running shoe");
    }

    #[test]
    fn test_clean_is_stable_on_clean_output() {
        let c = cleaner();
        for input in [
            "Acme Red Running Shoes 10x5 pack x2",
            "New Apple Laptop (15-inch) - 2020 Model",
            "<b>Wooden</b> Chairs, set!",
        ] {
            let once = c.clean_text(input);
            assert_eq!(c.clean_text(&once), once, "unstable for {}", input);
        }
    }

    #[test]
    fn test_irregular_plural_settles_on_second_pass() {
        // Irregular plurals settle only on the second pass: "men's" becomes
        // "mens", which singularizes to "men", and "men" to "man" next time.
        let c = cleaner();
        let once = c.clean_text("Men's Running Shoes");
        assert_eq!(once, "men running shoe");
        let twice = c.clean_text(&once);
        assert_eq!(twice, "man running shoe");
        assert_eq!(c.clean_text(&twice), twice);
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(cleaner().clean_text("   "), "");
        assert_eq!(cleaner().clean_text("The (and)"), "");
    }

    #[test]
    fn test_spanish_stopwords() {
        let c = TextCleaner::new(&Lexicon::default(), Language::Spanish).unwrap();
        assert_eq!(c.clean_text("Funda para el teléfono"), "funda telefono");
    }
}
