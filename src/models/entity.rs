//! Cached entity model and the category taxonomy shared by both platform families

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The two independent cache domains refreshed on separate schedules.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum PlatformFamily {
    /// CTI graph store (GraphQL)
    Cti,
    /// Breach and attack simulation platform (REST)
    Simulation,
}

impl PlatformFamily {
    pub const ALL: [PlatformFamily; 2] = [PlatformFamily::Cti, PlatformFamily::Simulation];

    /// Entity categories fetched for this family during a refresh, in fetch order.
    pub fn categories(&self) -> Vec<EntityCategory> {
        let types: &[EntityType] = match self {
            PlatformFamily::Cti => &[
                EntityType::ThreatActor,
                EntityType::IntrusionSet,
                EntityType::Malware,
                EntityType::Campaign,
                EntityType::AttackPattern,
                EntityType::Vulnerability,
                EntityType::Tool,
                EntityType::Sector,
                EntityType::Organization,
                EntityType::Country,
            ],
            PlatformFamily::Simulation => &[
                EntityType::Asset,
                EntityType::AssetGroup,
                EntityType::Player,
                EntityType::Team,
                EntityType::AttackPattern,
                EntityType::Finding,
            ],
        };

        types
            .iter()
            .map(|t| EntityCategory::new(*self, *t))
            .collect()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PlatformFamily::Cti => "cti",
            PlatformFamily::Simulation => "simulation",
        }
    }
}

impl fmt::Display for PlatformFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Entity category as reported by the source platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntityType {
    #[serde(rename = "Asset")]
    Asset,
    #[serde(rename = "Asset-Group")]
    AssetGroup,
    #[serde(rename = "Player")]
    Player,
    #[serde(rename = "Team")]
    Team,
    #[serde(rename = "Attack-Pattern")]
    AttackPattern,
    #[serde(rename = "Finding")]
    Finding,
    #[serde(rename = "Threat-Actor")]
    ThreatActor,
    #[serde(rename = "Intrusion-Set")]
    IntrusionSet,
    #[serde(rename = "Malware")]
    Malware,
    #[serde(rename = "Campaign")]
    Campaign,
    #[serde(rename = "Vulnerability")]
    Vulnerability,
    #[serde(rename = "Tool")]
    Tool,
    #[serde(rename = "Sector")]
    Sector,
    #[serde(rename = "Organization")]
    Organization,
    #[serde(rename = "Country")]
    Country,
    #[serde(rename = "Indicator")]
    Indicator,
}

impl EntityType {
    pub const ALL: [EntityType; 16] = [
        EntityType::Asset,
        EntityType::AssetGroup,
        EntityType::Player,
        EntityType::Team,
        EntityType::AttackPattern,
        EntityType::Finding,
        EntityType::ThreatActor,
        EntityType::IntrusionSet,
        EntityType::Malware,
        EntityType::Campaign,
        EntityType::Vulnerability,
        EntityType::Tool,
        EntityType::Sector,
        EntityType::Organization,
        EntityType::Country,
        EntityType::Indicator,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Asset => "Asset",
            EntityType::AssetGroup => "Asset-Group",
            EntityType::Player => "Player",
            EntityType::Team => "Team",
            EntityType::AttackPattern => "Attack-Pattern",
            EntityType::Finding => "Finding",
            EntityType::ThreatActor => "Threat-Actor",
            EntityType::IntrusionSet => "Intrusion-Set",
            EntityType::Malware => "Malware",
            EntityType::Campaign => "Campaign",
            EntityType::Vulnerability => "Vulnerability",
            EntityType::Tool => "Tool",
            EntityType::Sector => "Sector",
            EntityType::Organization => "Organization",
            EntityType::Country => "Country",
            EntityType::Indicator => "Indicator",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = String;

    /// Accepts the canonical name in any case, with `-`, `_` or no separator.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = normalize_type_name(s);
        EntityType::ALL
            .into_iter()
            .find(|t| normalize_type_name(t.as_str()) == wanted)
            .ok_or_else(|| format!("unknown entity type '{}'", s))
    }
}

fn normalize_type_name(s: &str) -> String {
    s.chars()
        .filter(|c| *c != '-' && *c != '_' && !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

/// One entity list fetched independently during a refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntityCategory {
    pub family: PlatformFamily,
    pub entity_type: EntityType,
}

impl EntityCategory {
    pub fn new(family: PlatformFamily, entity_type: EntityType) -> Self {
        Self {
            family,
            entity_type,
        }
    }
}

impl fmt::Display for EntityCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.family, self.entity_type)
    }
}

/// One remembered entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedEntity {
    /// Stable identifier in the source platform
    pub id: String,

    /// Primary matchable name
    pub name: String,

    /// Secondary matchable strings (alternate names, hostnames, IPs, MITRE ids, ...)
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub aliases: BTreeSet<String>,

    #[serde(rename = "type")]
    pub entity_type: EntityType,

    /// Owning platform instance
    pub platform_id: String,
}

impl CachedEntity {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        entity_type: EntityType,
        platform_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            aliases: BTreeSet::new(),
            entity_type,
            platform_id: platform_id.into(),
        }
    }

    /// Add aliases, ignoring blanks and trimming surrounding whitespace.
    pub fn with_aliases<I, S>(mut self, aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for alias in aliases {
            let alias = alias.as_ref().trim();
            if !alias.is_empty() {
                self.aliases.insert(alias.to_string());
            }
        }
        self
    }

    /// Name followed by every alias, in index insertion order.
    pub fn matchable_strings(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.name.as_str()).chain(self.aliases.iter().map(String::as_str))
    }
}
