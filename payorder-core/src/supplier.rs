use serde::{Deserialize, Serialize};
use std::fmt;

const NAME_SEPARATOR: &str = " - ";
const CNPJ_MARKER: &str = "CNPJ";

/// Supplier identity with its tax id kept as a separate field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Supplier {
    pub name: String,
    pub cnpj: Option<String>,
}

impl Supplier {
    pub fn new(name: impl Into<String>, cnpj: Option<String>) -> Self {
        Self {
            name: name.into(),
            cnpj,
        }
    }

    /// Parse the legacy single-string form, e.g. `"ACME LTDA - SP CNPJ 12.345.678/0001-90"`.
    ///
    /// The name is whatever precedes the first `" - "`; the tax id is whatever
    /// follows the literal `CNPJ` marker. Either part may be absent.
    pub fn parse_display(raw: &str) -> Self {
        let raw = raw.trim();

        let name = match raw.find(NAME_SEPARATOR) {
            Some(pos) => &raw[..pos],
            None => match raw.find(CNPJ_MARKER) {
                Some(pos) => &raw[..pos],
                None => raw,
            },
        };

        let cnpj = raw
            .find(CNPJ_MARKER)
            .map(|pos| raw[pos + CNPJ_MARKER.len()..].trim_start_matches([':', ' ']).trim())
            .filter(|s| !s.is_empty())
            .map(String::from);

        Self {
            name: name.trim().to_string(),
            cnpj,
        }
    }

    /// Uppercased name as shown in order listings.
    pub fn display_name(&self) -> String {
        self.name.to_uppercase()
    }
}

impl fmt::Display for Supplier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.cnpj {
            Some(cnpj) => write!(f, "{}{}{} {}", self.name, NAME_SEPARATOR, CNPJ_MARKER, cnpj),
            None => write!(f, "{}", self.name),
        }
    }
}
