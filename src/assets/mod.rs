//! Asset loading: scene-list dispatch, glTF import, packed files.

pub mod cornell;
pub mod gltf;
pub mod pack;

use std::path::Path;

use crate::errors::{EmberError, Result};
use crate::scene::environment::Environment;
use crate::scene::scene::SceneContent;

pub use pack::PackageFileSystem;

/// Everything a finished scene parse hands back to the main thread.
#[derive(Clone, Debug)]
pub struct ParsedScene {
    /// Short scene name (file stem).
    pub name: String,
    pub content: SceneContent,
    pub environment: Environment,
}

/// Parses a scene by path. `.proc` names select built-in procedural
/// scenes; `.glb` / `.gltf` go through the glTF importer.
pub fn load_scene(path: &str) -> Result<ParsedScene> {
    let file = Path::new(path);
    let stem = file
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(path)
        .to_string();

    let extension = file
        .extension()
        .and_then(|s| s.to_str())
        .map(str::to_ascii_lowercase);

    match extension.as_deref() {
        Some("proc") => {
            // Procedural names may carry an ordering prefix ("0cornellbox").
            let name = stem.trim_start_matches(|c: char| c.is_ascii_digit());
            let (content, environment) = match name {
                "cornellbox" => cornell::create_cornell_box(),
                "cornellbox_anim" => cornell::create_cornell_box_animated(),
                other => {
                    return Err(EmberError::AssetParse(format!(
                        "unknown procedural scene '{other}'"
                    )));
                }
            };
            Ok(ParsedScene {
                name: name.to_string(),
                content,
                environment,
            })
        }
        Some("glb" | "gltf") => {
            let (content, environment) = gltf::load_gltf_scene(file)?;
            Ok(ParsedScene {
                name: stem,
                content,
                environment,
            })
        }
        _ => Err(EmberError::AssetParse(format!(
            "unsupported scene file '{path}'"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn proc_dispatch_builds_cornell() {
        let parsed = load_scene("0cornellbox.proc").expect("builtin scene");
        assert_eq!(parsed.name, "cornellbox");
        assert_eq!(parsed.content.nodes.len(), 3);
        assert_eq!(parsed.content.models.len(), 2);
        assert_eq!(parsed.content.lights.len(), 1);
    }

    #[test]
    fn unknown_scene_is_a_parse_error() {
        assert!(load_scene("missing.proc").is_err());
        assert!(load_scene("scene.xyz").is_err());
    }
}
