use serde::Serialize;

/// Canonical two-letter US state code. Only constructed through
/// [`normalize_state`], so every value is a member of [`STATE_TABLE`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct StateCode(&'static str);

impl StateCode {
    pub fn as_str(&self) -> &'static str {
        self.0
    }
}

impl std::fmt::Display for StateCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.0)
    }
}

/// The 50 states, ordered alphabetically by full name. Prefix matching
/// resolves ambiguity by taking the first hit in this order, which makes
/// the tie-break explicit rather than an accident of table layout.
pub const STATE_TABLE: &[(&str, &str)] = &[
    ("AL", "Alabama"),
    ("AK", "Alaska"),
    ("AZ", "Arizona"),
    ("AR", "Arkansas"),
    ("CA", "California"),
    ("CO", "Colorado"),
    ("CT", "Connecticut"),
    ("DE", "Delaware"),
    ("FL", "Florida"),
    ("GA", "Georgia"),
    ("HI", "Hawaii"),
    ("ID", "Idaho"),
    ("IL", "Illinois"),
    ("IN", "Indiana"),
    ("IA", "Iowa"),
    ("KS", "Kansas"),
    ("KY", "Kentucky"),
    ("LA", "Louisiana"),
    ("ME", "Maine"),
    ("MD", "Maryland"),
    ("MA", "Massachusetts"),
    ("MI", "Michigan"),
    ("MN", "Minnesota"),
    ("MS", "Mississippi"),
    ("MO", "Missouri"),
    ("MT", "Montana"),
    ("NE", "Nebraska"),
    ("NV", "Nevada"),
    ("NH", "New Hampshire"),
    ("NJ", "New Jersey"),
    ("NM", "New Mexico"),
    ("NY", "New York"),
    ("NC", "North Carolina"),
    ("ND", "North Dakota"),
    ("OH", "Ohio"),
    ("OK", "Oklahoma"),
    ("OR", "Oregon"),
    ("PA", "Pennsylvania"),
    ("RI", "Rhode Island"),
    ("SC", "South Carolina"),
    ("SD", "South Dakota"),
    ("TN", "Tennessee"),
    ("TX", "Texas"),
    ("UT", "Utah"),
    ("VT", "Vermont"),
    ("VA", "Virginia"),
    ("WA", "Washington"),
    ("WV", "West Virginia"),
    ("WI", "Wisconsin"),
    ("WY", "Wyoming"),
];

/// Maps arbitrary state text to its canonical code, or `None` when nothing
/// in the table matches. Handles codes ("tx"), punctuated codes ("Tx-99"),
/// full names ("New  York"), and partial names ("Cali").
pub fn normalize_state(input: Option<&str>) -> Option<StateCode> {
    let trimmed = input?.trim();
    if trimmed.is_empty() {
        return None;
    }

    let upper = trimmed.to_ascii_uppercase();
    if let Some(code) = exact_code(&upper) {
        return Some(code);
    }

    let letters = letters_only(&upper);
    if letters.is_empty() {
        return None;
    }
    if let Some(code) = exact_code(&letters) {
        return Some(code);
    }

    for (code, name) in STATE_TABLE {
        if letters_only(&name.to_ascii_uppercase()) == letters {
            return Some(StateCode(code));
        }
    }

    // Partial entries resolve in both directions: "Cali" hits California,
    // and "North Carolina Coast" still hits North Carolina.
    for (code, name) in STATE_TABLE {
        let name_letters = letters_only(&name.to_ascii_uppercase());
        if name_letters.starts_with(&letters) || letters.starts_with(&name_letters) {
            return Some(StateCode(code));
        }
    }

    None
}

/// Reverse lookup from a canonical code to the full state name.
pub fn state_name(code: &str) -> Option<&'static str> {
    let upper = code.trim().to_ascii_uppercase();
    STATE_TABLE
        .iter()
        .find(|(candidate, _)| *candidate == upper)
        .map(|(_, name)| *name)
}

fn exact_code(candidate: &str) -> Option<StateCode> {
    if candidate.len() != 2 {
        return None;
    }
    STATE_TABLE
        .iter()
        .find(|(code, _)| *code == candidate)
        .map(|(code, _)| StateCode(code))
}

fn letters_only(value: &str) -> String {
    value.chars().filter(|c| c.is_ascii_alphabetic()).collect()
}
