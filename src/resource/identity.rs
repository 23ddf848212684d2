//! Resource identity
//!
//! Builds canonical ARM resource ids from a name and its parent context, and
//! parses them back. Also defines the cache key modules use to guarantee one
//! instance per identity.

use crate::error::{Error, Result};
use std::fmt;

/// Stands in for the resource group of resources that live above one
pub const RESOURCE_GROUP_PLACEHOLDER: &str = "${rg}";

/// Parent a module's children hang off
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Scope {
    /// Root of a service; children are per-subscription
    None,
    Subscription(String),
}

/// `None` for absent, blank or placeholder groups
pub fn normalize_resource_group(resource_group: Option<&str>) -> Option<&str> {
    resource_group
        .map(str::trim)
        .filter(|rg| !rg.is_empty() && *rg != RESOURCE_GROUP_PLACEHOLDER)
}

pub fn resource_group_or_placeholder(resource_group: Option<&str>) -> &str {
    normalize_resource_group(resource_group).unwrap_or(RESOURCE_GROUP_PLACEHOLDER)
}

/// Id of a service's per-subscription root:
/// `/subscriptions/{name}/resourceGroups/{rg}/providers/{service}`
pub fn service_resource_id(service: &str, name: &str, resource_group: Option<&str>) -> String {
    format!(
        "/subscriptions/{}/resourceGroups/{}/providers/{}",
        name,
        resource_group_or_placeholder(resource_group),
        service
    )
}

/// Id of a resource under a subscription:
/// `/subscriptions/{sub}/resourceGroups/{rg}/providers/{type}/{name}`
pub fn scoped_resource_id(
    subscription_id: &str,
    resource_type: &str,
    name: &str,
    resource_group: Option<&str>,
) -> String {
    format!(
        "/subscriptions/{}/resourceGroups/{}/providers/{}/{}",
        subscription_id,
        resource_group_or_placeholder(resource_group),
        resource_type,
        name
    )
}

/// Cache key: Azure names compare case-insensitively
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceKey {
    name: String,
    resource_group: Option<String>,
}

impl ResourceKey {
    pub fn new(name: &str, resource_group: Option<&str>) -> Self {
        Self {
            name: name.trim().to_lowercase(),
            resource_group: normalize_resource_group(resource_group).map(str::to_lowercase),
        }
    }
}

/// Parsed ARM resource id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceId {
    pub subscription_id: String,
    pub resource_group: Option<String>,
    /// Provider namespace, e.g. `Microsoft.Web`
    pub provider: Option<String>,
    /// Type segments below the namespace, e.g. `["sites", "slots"]`
    pub types: Vec<String>,
    /// Names matching `types`, e.g. `["app", "staging"]`
    pub names: Vec<String>,
    /// Whether the source had a `resourceGroups` segment, placeholder or not
    group_segment: bool,
}

impl ResourceId {
    /// Parse `/subscriptions/{sub}[/resourceGroups/{rg}][/providers/{ns}[/{type}/{name}]*]`
    pub fn parse(id: &str) -> Result<Self> {
        let invalid = |why: &str| Error::Configuration(format!("invalid resource id '{}': {}", id, why));
        let segments: Vec<&str> = id.trim().trim_matches('/').split('/').collect();

        let mut iter = segments.into_iter();
        match (iter.next(), iter.next()) {
            (Some(key), Some(sub)) if key.eq_ignore_ascii_case("subscriptions") && !sub.is_empty() => {
                let mut parsed = ResourceId {
                    subscription_id: sub.to_string(),
                    resource_group: None,
                    provider: None,
                    types: Vec::new(),
                    names: Vec::new(),
                    group_segment: false,
                };

                let rest: Vec<&str> = iter.collect();
                let mut idx = 0;

                if rest.len() >= 2 && rest[0].eq_ignore_ascii_case("resourceGroups") {
                    parsed.resource_group = normalize_resource_group(Some(rest[1])).map(str::to_string);
                    parsed.group_segment = true;
                    idx = 2;
                }

                if idx < rest.len() {
                    if !rest[idx].eq_ignore_ascii_case("providers") || idx + 1 >= rest.len() {
                        return Err(invalid("expected 'providers/{namespace}'"));
                    }
                    parsed.provider = Some(rest[idx + 1].to_string());
                    let pairs = &rest[idx + 2..];
                    if pairs.len() % 2 != 0 {
                        return Err(invalid("type without name"));
                    }
                    for pair in pairs.chunks(2) {
                        if pair[0].is_empty() || pair[1].is_empty() {
                            return Err(invalid("empty segment"));
                        }
                        parsed.types.push(pair[0].to_string());
                        parsed.names.push(pair[1].to_string());
                    }
                }

                Ok(parsed)
            }
            _ => Err(invalid("must start with '/subscriptions/{id}'")),
        }
    }

    /// Full type, e.g. `Microsoft.Web/sites/slots`
    pub fn full_resource_type(&self) -> Option<String> {
        let provider = self.provider.as_ref()?;
        if self.types.is_empty() {
            return Some(provider.clone());
        }
        Some(format!("{}/{}", provider, self.types.join("/")))
    }

    /// Innermost name
    pub fn name(&self) -> Option<&str> {
        self.names.last().map(String::as_str)
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/subscriptions/{}", self.subscription_id)?;
        if let Some(rg) = &self.resource_group {
            write!(f, "/resourceGroups/{}", rg)?;
        } else if self.group_segment {
            write!(f, "/resourceGroups/{}", RESOURCE_GROUP_PLACEHOLDER)?;
        }
        if let Some(provider) = &self.provider {
            write!(f, "/providers/{}", provider)?;
            for (t, n) in self.types.iter().zip(&self.names) {
                write!(f, "/{}/{}", t, n)?;
            }
        }
        Ok(())
    }
}
