//! Azure regions
//!
//! Region names come in two spellings: the programmatic `eastus` and the
//! display form `East US` used by provider metadata. Both normalise to the
//! same [`Region`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Region {
    /// Normalised name, e.g. `eastus`
    pub name: String,
    /// Human readable label, e.g. `East US`
    pub display_name: String,
}

/// Lowercase and strip whitespace: `"East US 2"` -> `"eastus2"`
pub fn normalize_region_name(name: &str) -> String {
    name.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

impl Region {
    pub fn new(name: &str, display_name: &str) -> Self {
        Self {
            name: normalize_region_name(name),
            display_name: display_name.to_string(),
        }
    }

    /// Build from either spelling; the display name is kept as given
    pub fn from_name(name: &str) -> Self {
        Self::new(name, name.trim())
    }
}

impl PartialEq for Region {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for Region {}

impl Hash for Region {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Location entry of `GET /subscriptions/{id}/locations`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct LocationPayload {
    pub name: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub metadata: Option<LocationMetadata>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct LocationMetadata {
    #[serde(default)]
    pub region_type: Option<String>,
}

impl LocationPayload {
    /// Logical locations (`global`, geography groupings) are not deployable
    pub fn is_physical(&self) -> bool {
        self.metadata
            .as_ref()
            .and_then(|m| m.region_type.as_deref())
            .map(|t| t.eq_ignore_ascii_case("Physical"))
            .unwrap_or(true)
    }
}

impl From<LocationPayload> for Region {
    fn from(location: LocationPayload) -> Self {
        let display = location.display_name.unwrap_or_else(|| location.name.clone());
        Region::new(&location.name, &display)
    }
}
