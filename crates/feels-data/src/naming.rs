//! Identifier case translation between API field names and store columns
//!
//! Fields use camel case (`volumeUSD24h`, `token0Id`), columns use snake case
//! (`volume_usd_24h`, `token_0_id`). Acronyms on the allow-list are treated as
//! single tokens so that `USD` never becomes `u_s_d`.

use serde::{Deserialize, Serialize};

const SEPARATOR: char = '_';

/// Acronym allow-list shared by the translator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamingRules {
    pub acronyms: Vec<String>,
}

impl Default for NamingRules {
    fn default() -> Self {
        Self {
            acronyms: ["USD", "TVL", "APR", "URL", "API"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

/// Bidirectional field <-> column translator
#[derive(Debug, Clone)]
pub struct CaseTranslator {
    /// (upper-case acronym, capital-plus-lowercase form), longest first
    acronyms: Vec<(String, String)>,
}

impl Default for CaseTranslator {
    fn default() -> Self {
        Self::new(&NamingRules::default())
    }
}

impl CaseTranslator {
    pub fn new(rules: &NamingRules) -> Self {
        let mut acronyms: Vec<(String, String)> = rules
            .acronyms
            .iter()
            .filter(|a| !a.is_empty())
            .map(|a| {
                let upper = a.to_ascii_uppercase();
                (upper.clone(), capitalize(&upper.to_ascii_lowercase()))
            })
            .collect();
        acronyms.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(&b.0)));
        acronyms.dedup_by(|a, b| a.0 == b.0);

        Self { acronyms }
    }

    /// Translate an API field name into a store column name.
    ///
    /// Never fails: unknown names degrade to a plain case-boundary split.
    pub fn to_column(&self, field: &str) -> String {
        // Acronyms first, or the digit rules below split them mid-token
        let mut normalized = field.to_string();
        for (upper, capitalized) in &self.acronyms {
            normalized = normalized.replace(upper.as_str(), capitalized);
        }

        let chars: Vec<char> = normalized.chars().collect();
        let mut out = String::with_capacity(chars.len() + 4);
        for (i, &c) in chars.iter().enumerate() {
            if let Some(&prev) = i.checked_sub(1).and_then(|p| chars.get(p)) {
                let boundary = (prev.is_ascii_alphabetic() && c.is_ascii_digit())
                    || (prev.is_ascii_digit() && c.is_ascii_uppercase())
                    || (prev.is_ascii_lowercase() && c.is_ascii_uppercase());
                if boundary {
                    out.push(SEPARATOR);
                }
            }
            out.push(c);
        }

        out.to_lowercase()
    }

    /// Translate a store column name back into an API field name
    pub fn to_field(&self, column: &str) -> String {
        let mut out = String::with_capacity(column.len());
        for (i, segment) in column.split(SEPARATOR).enumerate() {
            if i == 0 {
                out.push_str(segment);
                continue;
            }
            match self.acronym_for(segment) {
                Some(acronym) => out.push_str(acronym),
                None => out.push_str(&capitalize(segment)),
            }
        }
        out
    }

    fn acronym_for(&self, segment: &str) -> Option<&str> {
        self.acronyms
            .iter()
            .find(|(upper, _)| upper.eq_ignore_ascii_case(segment))
            .map(|(upper, _)| upper.as_str())
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
