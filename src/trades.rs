use std::collections::HashMap;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

/// Outcome of trade normalization. A trade is either one of the configured
/// canonical crafts or arbitrary free text the system stores as given.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "label")]
pub enum TradeLabel {
    Canonical(String),
    Freeform(String),
}

impl TradeLabel {
    pub fn text(&self) -> &str {
        match self {
            TradeLabel::Canonical(label) | TradeLabel::Freeform(label) => label,
        }
    }

    pub fn into_text(self) -> String {
        match self {
            TradeLabel::Canonical(label) | TradeLabel::Freeform(label) => label,
        }
    }
}

#[derive(Debug, Clone)]
struct TradeEntry {
    canonical: String,
    aliases: Vec<String>,
}

/// Immutable alias book. The reverse index is built once at construction and
/// never mutated afterwards, so a shared reference is safe across concurrent
/// requests without synchronization.
#[derive(Debug, Clone)]
pub struct TradeBook {
    entries: Vec<TradeEntry>,
    reverse: HashMap<String, usize>,
}

static DEFAULT_BOOK: Lazy<TradeBook> = Lazy::new(|| {
    TradeBook::new(&[
        ("Boilermaker", &[]),
        ("Bricklayer", &["Mason", "Brick Mason"]),
        ("Carpenter", &["Finish Carpenter", "Rough Carpenter", "Framer"]),
        ("Cement Mason", &["Concrete Finisher"]),
        (
            "Electrician",
            &[
                "Electrician (Inside Wireman)",
                "Inside Wireman",
                "Journeyman Electrician",
            ],
        ),
        ("Elevator Constructor", &["Elevator Mechanic"]),
        ("Glazier", &[]),
        (
            "HVAC Technician",
            &["HVAC Tech", "HVAC Mechanic", "Heating and Air Technician"],
        ),
        ("Insulator", &["Heat and Frost Insulator"]),
        ("Ironworker", &["Iron Worker", "Structural Ironworker"]),
        ("Laborer", &["Construction Laborer", "General Laborer"]),
        ("Lineman", &["Line Worker", "Outside Lineman"]),
        ("Millwright", &[]),
        (
            "Operating Engineer",
            &["Heavy Equipment Operator", "Crane Operator"],
        ),
        ("Painter", &["Painter and Decorator"]),
        ("Pipefitter", &["Pipe Fitter", "Steamfitter"]),
        ("Plasterer", &[]),
        ("Plumber", &["Journeyman Plumber"]),
        ("Roofer", &["Roofer and Waterproofer"]),
        (
            "Sheet Metal Worker",
            &["Sheetmetal Worker", "Sheet Metal Mechanic"],
        ),
        ("Sprinkler Fitter", &["Fire Sprinkler Fitter"]),
        ("Teamster", &["Construction Driver"]),
    ])
});

impl TradeBook {
    pub fn new(table: &[(&str, &[&str])]) -> Self {
        let mut entries = Vec::with_capacity(table.len());
        let mut reverse = HashMap::new();
        for (index, (canonical, aliases)) in table.iter().enumerate() {
            // The canonical label is always a member of its own alias set.
            reverse.insert(fold_key(canonical), index);
            for alias in *aliases {
                reverse.insert(fold_key(alias), index);
            }
            entries.push(TradeEntry {
                canonical: (*canonical).to_string(),
                aliases: aliases.iter().map(|a| (*a).to_string()).collect(),
            });
        }
        Self { entries, reverse }
    }

    /// Shared book with the default construction-craft aliases.
    pub fn default_book() -> &'static TradeBook {
        &DEFAULT_BOOK
    }

    /// Case- and space-insensitive lookup against the alias book. Unmatched
    /// text passes through trimmed; callers guard empties separately.
    pub fn normalize(&self, input: &str) -> TradeLabel {
        let trimmed = input.trim();
        match self.reverse.get(&fold_key(trimmed)) {
            Some(&index) => TradeLabel::Canonical(self.entries[index].canonical.clone()),
            None => TradeLabel::Freeform(trimmed.to_string()),
        }
    }

    /// All labels that should be treated as the same trade, suitable for an
    /// `IN` filter. Accepts the canonical form or any alias; freeform text
    /// yields a single-element set.
    pub fn synonyms(&self, canonical_or_alias: &str) -> Vec<String> {
        match self.normalize(canonical_or_alias) {
            TradeLabel::Canonical(canonical) => {
                let index = self.reverse[&fold_key(&canonical)];
                let entry = &self.entries[index];
                let mut set = vec![entry.canonical.clone()];
                for alias in &entry.aliases {
                    if !set.contains(alias) {
                        set.push(alias.clone());
                    }
                }
                set
            }
            TradeLabel::Freeform(text) => vec![text],
        }
    }

    pub fn canonical_labels(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|entry| entry.canonical.as_str())
    }
}

fn fold_key(value: &str) -> String {
    value
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(|c| c.to_lowercase())
        .collect()
}
