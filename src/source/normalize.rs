//! Category-specific mapping from raw platform entities to cached entities

use std::collections::HashSet;

use log::debug;

use super::RawEntity;
use crate::models::{CachedEntity, EntityCategory, EntityType, PlatformFamily};

/// Field names used to locate the id, the name and the alias values of one category.
struct FieldMap {
    id: &'static [&'static str],
    name: &'static [&'static str],
    aliases: &'static [&'static str],
}

const CTI_ALIASES: &[&str] = &["aliases", "x_opencti_aliases"];

fn field_map(category: EntityCategory) -> FieldMap {
    use EntityType::*;

    match (category.family, category.entity_type) {
        (PlatformFamily::Simulation, Asset) => FieldMap {
            id: &["endpoint_id", "asset_id", "id"],
            name: &["endpoint_name", "asset_name", "name"],
            aliases: &[
                "endpoint_hostname",
                "endpoint_ips",
                "endpoint_mac_addresses",
            ],
        },
        (PlatformFamily::Simulation, AssetGroup) => FieldMap {
            id: &["asset_group_id", "id"],
            name: &["asset_group_name", "name"],
            aliases: &[],
        },
        (PlatformFamily::Simulation, Player) => FieldMap {
            id: &["user_id", "player_id", "id"],
            // Name is assembled from first/last name, see `player_name`
            name: &["user_email", "email", "name"],
            aliases: &["user_email", "email"],
        },
        (PlatformFamily::Simulation, Team) => FieldMap {
            id: &["team_id", "id"],
            name: &["team_name", "name"],
            aliases: &[],
        },
        (PlatformFamily::Simulation, AttackPattern) => FieldMap {
            id: &["attack_pattern_id", "id"],
            name: &["attack_pattern_name", "name"],
            aliases: &["attack_pattern_external_id", "external_id"],
        },
        (PlatformFamily::Simulation, Finding) => FieldMap {
            id: &["finding_id", "id"],
            name: &["finding_value", "value", "name"],
            aliases: &[],
        },
        (PlatformFamily::Cti, AttackPattern) => FieldMap {
            id: &["id", "standard_id"],
            name: &["name"],
            aliases: &["aliases", "x_opencti_aliases", "x_mitre_id"],
        },
        (_, _) => FieldMap {
            id: &["id", "standard_id"],
            name: &["name", "value"],
            aliases: CTI_ALIASES,
        },
    }
}

fn player_name(raw: &RawEntity) -> Option<String> {
    let parts: Vec<String> = [
        raw.text(&["user_firstname", "firstname"]),
        raw.text(&["user_lastname", "lastname"]),
    ]
    .into_iter()
    .flatten()
    .collect();

    if parts.is_empty() {
        None
    } else {
        Some(parts.join(" "))
    }
}

/// Map one raw entity; `None` when it has no usable id or name.
pub fn normalize(
    platform_id: &str,
    category: EntityCategory,
    raw: &RawEntity,
) -> Option<CachedEntity> {
    let fields = field_map(category);
    let id = raw.text(fields.id)?;

    let name = if category.entity_type == EntityType::Player {
        player_name(raw).or_else(|| raw.text(fields.name))
    } else {
        raw.text(fields.name)
    }?;

    Some(
        CachedEntity::new(id, name, category.entity_type, platform_id)
            .with_aliases(raw.text_list(fields.aliases)),
    )
}

/// Map a whole category, dropping unusable entries and repeated ids (first wins).
pub fn normalize_all(
    platform_id: &str,
    category: EntityCategory,
    raws: Vec<RawEntity>,
) -> Vec<CachedEntity> {
    let total = raws.len();
    let mut seen = HashSet::new();

    let entities: Vec<CachedEntity> = raws
        .iter()
        .filter_map(|raw| normalize(platform_id, category, raw))
        .filter(|entity| seen.insert(entity.id.clone()))
        .collect();

    if entities.len() != total {
        debug!(
            "{} on {}: kept {} of {} raw entities",
            category,
            platform_id,
            entities.len(),
            total
        );
    }

    entities
}
