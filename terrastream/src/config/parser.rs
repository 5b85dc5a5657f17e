//! INI parsing: `Ini` → `ConfigFile`.
//!
//! This is the single place where INI key names are mapped to struct fields.
//! Unknown sections and keys are ignored.

use std::path::PathBuf;
use std::str::FromStr;

use ini::{Ini, Properties};

use super::file::ConfigFileError;
use super::settings::ConfigFile;
use crate::terrain::TerrainError;

/// Parses an `Ini` into a `ConfigFile`.
///
/// Starts from `ConfigFile::default()` and overlays any values found.
pub(super) fn parse_ini(ini: &Ini) -> Result<ConfigFile, ConfigFileError> {
    let mut config = ConfigFile::default();

    // [terrain] section
    if let Some(section) = ini.section(Some("terrain")) {
        let terrain = &mut config.terrain;
        if let Some(v) = section.get("profile") {
            config.profile = v.trim().parse().map_err(|_| {
                invalid(
                    "terrain",
                    "profile",
                    v,
                    "must be 'global-geodetic' or 'spherical-mercator'",
                )
            })?;
        }
        set_parsed(
            section,
            "terrain",
            "tile_size",
            "must be a positive integer",
            &mut terrain.tile_size,
        )?;
        set_parsed(
            section,
            "terrain",
            "skirt_ratio",
            "must be a number",
            &mut terrain.skirt_ratio,
        )?;
        set_bool(section, "morph_terrain", &mut terrain.morph_terrain);
        set_parsed(
            section,
            "terrain",
            "min_level_of_detail",
            "must be a non-negative integer",
            &mut terrain.min_level_of_detail,
        )?;
        set_parsed(
            section,
            "terrain",
            "max_level_of_detail",
            "must be a non-negative integer",
            &mut terrain.max_level_of_detail,
        )?;
        set_parsed(
            section,
            "terrain",
            "lod_transition_factor",
            "must be a number",
            &mut terrain.lod_transition_factor,
        )?;
        set_parsed(
            section,
            "terrain",
            "morph_ratio",
            "must be a number",
            &mut terrain.morph_ratio,
        )?;
        set_bool(section, "load_elevation_separately", &mut terrain.load_elevation_separately);
        set_bool(section, "generate_normal_maps", &mut terrain.generate_normal_maps);
        set_bool(section, "enable_geometry_pool", &mut terrain.enable_geometry_pool);
        if let Some(v) = section.get("max_dispose_per_frame") {
            let v = v.trim();
            terrain.max_dispose_per_frame = if v.is_empty() || v.eq_ignore_ascii_case("none") {
                None
            } else {
                Some(v.parse().map_err(|_| {
                    invalid(
                        "terrain",
                        "max_dispose_per_frame",
                        v,
                        "must be a positive integer or 'none'",
                    )
                })?)
            };
        }
    }

    // [scheduler] section
    if let Some(section) = ini.section(Some("scheduler")) {
        if let Some(v) = section.get("name") {
            let v = v.trim();
            if !v.is_empty() {
                config.scheduler.name = v.to_string();
            }
        }
        set_parsed(
            section,
            "scheduler",
            "workers",
            "must be a non-negative integer (0 = manual)",
            &mut config.scheduler.workers,
        )?;
    }

    // [logging] section
    if let Some(section) = ini.section(Some("logging")) {
        if let Some(v) = section.get("directory") {
            let v = v.trim();
            if !v.is_empty() {
                config.logging.directory = expand_tilde(v);
            }
        }
        if let Some(v) = section.get("file") {
            let v = v.trim();
            if !v.is_empty() {
                config.logging.file = v.to_string();
            }
        }
        if let Some(v) = section.get("level") {
            let v = v.trim();
            if !v.is_empty() {
                config.logging.level = v.to_string();
            }
        }
        set_bool(section, "stdout", &mut config.logging.stdout);
    }

    config.terrain.validate().map_err(|e| match e {
        TerrainError::InvalidSettings { field, reason } => {
            let value = ini
                .section(Some("terrain"))
                .and_then(|s| s.get(field))
                .unwrap_or("<default>")
                .to_string();
            ConfigFileError::InvalidValue {
                section: "terrain".to_string(),
                key: field.to_string(),
                value,
                reason,
            }
        }
        other => ConfigFileError::InvalidValue {
            section: "terrain".to_string(),
            key: String::new(),
            value: String::new(),
            reason: other.to_string(),
        },
    })?;

    Ok(config)
}

fn invalid(section: &str, key: &str, value: &str, reason: &str) -> ConfigFileError {
    ConfigFileError::InvalidValue {
        section: section.to_string(),
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

/// Overwrites `target` with the parsed value of `key`, if present.
fn set_parsed<T: FromStr>(
    section: &Properties,
    section_name: &str,
    key: &str,
    reason: &str,
    target: &mut T,
) -> Result<(), ConfigFileError> {
    if let Some(v) = section.get(key) {
        *target = v
            .trim()
            .parse()
            .map_err(|_| invalid(section_name, key, v, reason))?;
    }
    Ok(())
}

fn set_bool(section: &Properties, key: &str, target: &mut bool) {
    if let Some(v) = section.get(key) {
        *target = parse_bool(v);
    }
}

/// Parses a boolean. Accepts true/false, yes/no, 1/0, on/off (case-insensitive).
pub(super) fn parse_bool(value: &str) -> bool {
    let v = value.trim().to_lowercase();
    v == "true" || v == "1" || v == "yes" || v == "on"
}

/// Expands a leading `~/` to the home directory.
pub(super) fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}
