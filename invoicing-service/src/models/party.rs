//! Bill-to / from contact blocks.

use serde::{Deserialize, Serialize};

/// Contact block for either side of a document.
///
/// Every field is optional. Missing fields render as empty lines.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PartyBlock {
    pub name: Option<String>,
    pub company: Option<String>,
    pub address_line1: Option<String>,
    pub address_line2: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
}

impl PartyBlock {
    /// Display name for listings: the person, then the company.
    pub fn display_name(&self) -> Option<&str> {
        self.name
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .or_else(|| self.company.as_deref().filter(|s| !s.trim().is_empty()))
    }
}
