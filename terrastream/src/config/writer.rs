//! INI serialization: `ConfigFile` → commented INI text.

use std::path::Path;

use super::settings::ConfigFile;

/// Converts a `ConfigFile` to the commented INI written to `config.ini`.
pub(super) fn to_config_string(config: &ConfigFile) -> String {
    let terrain = &config.terrain;
    let max_dispose = terrain
        .max_dispose_per_frame
        .map(|n| n.to_string())
        .unwrap_or_else(|| "none".to_string());

    format!(
        r#"[terrain]
; Tiling scheme: global-geodetic or spherical-mercator
profile = {}
; Vertices per tile edge
tile_size = {}
; Skirt depth relative to tile size (0 disables skirts)
skirt_ratio = {}
; Blend geometry between levels of detail
morph_terrain = {}
; Level root tiles are created at
min_level_of_detail = {}
; Deepest level tiles subdivide to
max_level_of_detail = {}
; Visibility range as a multiple of tile radius
lod_transition_factor = {}
; Fraction of each level's range spent morphing
morph_ratio = {}
; Fetch elevation and imagery as separate requests
load_elevation_separately = {}
generate_normal_maps = {}
; Maximum tiles evicted per frame, or none
max_dispose_per_frame = {}
enable_geometry_pool = {}

[scheduler]
; Worker thread name prefix
name = {}
; Worker threads (0 = manual mode, jobs run only when drained)
workers = {}

[logging]
directory = {}
file = {}
; Filter used when RUST_LOG is unset, e.g. info or terrastream=debug
level = {}
stdout = {}
"#,
        config.profile,
        terrain.tile_size,
        terrain.skirt_ratio,
        terrain.morph_terrain,
        terrain.min_level_of_detail,
        terrain.max_level_of_detail,
        terrain.lod_transition_factor,
        terrain.morph_ratio,
        terrain.load_elevation_separately,
        terrain.generate_normal_maps,
        max_dispose,
        terrain.enable_geometry_pool,
        config.scheduler.name,
        config.scheduler.workers,
        path_to_string(&config.logging.directory),
        config.logging.file,
        config.logging.level,
        config.logging.stdout,
    )
}

/// Converts a path to a string, collapsing the home directory to `~`.
fn path_to_string(path: &Path) -> String {
    if let Some(home) = dirs::home_dir() {
        if let Ok(stripped) = path.strip_prefix(&home) {
            return format!("~/{}", stripped.display());
        }
    }
    path.display().to_string()
}
