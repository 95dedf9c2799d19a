//! Patch-merge of a loader profile over its base game manifest.
//!
//! The profile on disk is patched in place: a field is only filled when the
//! profile lacks it, so values chosen by the loader always survive. Running
//! the merge again over an already patched profile changes nothing, which
//! keeps the file untouched on every later launch.

use std::collections::HashSet;
use std::path::Path;

use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::core::error::{LauncherError, LauncherResult};
use crate::core::maven::MavenArtifact;

use super::version_file::{contains_run, VersionJson};

/// Game flags a Heavyweight profile must always carry, with their template tokens.
pub const REQUIRED_GAME_FLAGS: [(&str, &str); 5] = [
    ("--gameDir", "${game_directory}"),
    ("--accessToken", "${auth_access_token}"),
    ("--version", "${version_name}"),
    ("--username", "${auth_player_name}"),
    ("--uuid", "${auth_uuid}"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeFlavor {
    /// Profiles fetched from a metadata service (Fabric, Quilt).
    Lightweight,
    /// Profiles generated by an installer (Forge).
    Heavyweight,
}

/// A loader profile after reconciliation. Lives for one launch attempt.
#[derive(Debug, Clone)]
pub struct ReconciledProfile {
    pub id: String,
    pub document: Value,
    /// Whether the patched profile had to be written back.
    pub written: bool,
}

impl ReconciledProfile {
    pub fn typed(&self) -> LauncherResult<VersionJson> {
        VersionJson::from_value(self.document.clone())
    }
}

/// Patch `profile` with whatever it lacks from `base`. Returns `true` when
/// anything changed.
pub fn reconcile(profile: &mut Value, base: &Value, flavor: MergeFlavor) -> bool {
    let Some(profile_obj) = profile.as_object_mut() else {
        return false;
    };
    let Some(base_obj) = base.as_object() else {
        return false;
    };

    let before = profile_obj.clone();

    patch_downloads(profile_obj, base_obj);
    patch_assets(profile_obj, base_obj);
    patch_libraries(profile_obj, base_obj);
    patch_arguments(profile_obj, base_obj, flavor);
    if flavor == MergeFlavor::Heavyweight {
        normalize_game_flags(profile_obj);
    }

    *profile_obj != before
}

/// Load both documents, reconcile, and write the profile back only when it changed.
pub async fn reconcile_files(
    id: &str,
    profile_path: &Path,
    base_path: &Path,
    flavor: MergeFlavor,
) -> LauncherResult<ReconciledProfile> {
    let mut profile = VersionJson::read_document(profile_path).await?;
    let base = VersionJson::read_document(base_path).await?;

    let dirty = reconcile(&mut profile, &base, flavor);
    if dirty {
        let pretty = serde_json::to_string_pretty(&profile)?;
        tokio::fs::write(profile_path, pretty)
            .await
            .map_err(|e| LauncherError::from(e).at_path(profile_path))?;
        info!("Reconciled profile {} written", id);
    } else {
        debug!("Profile {} already reconciled", id);
    }

    Ok(ReconciledProfile {
        id: id.to_string(),
        document: profile,
        written: dirty,
    })
}

fn patch_downloads(profile: &mut Map<String, Value>, base: &Map<String, Value>) {
    let Some(base_downloads) = base.get("downloads").and_then(Value::as_object) else {
        return;
    };

    for side in ["client", "server"] {
        let Some(descriptor) = base_downloads.get(side) else {
            continue;
        };
        let downloads = profile
            .entry("downloads")
            .or_insert_with(|| Value::Object(Map::new()));
        if let Some(downloads) = downloads.as_object_mut() {
            downloads
                .entry(side)
                .or_insert_with(|| descriptor.clone());
        }
    }
}

fn patch_assets(profile: &mut Map<String, Value>, base: &Map<String, Value>) {
    for key in ["assetIndex", "assets"] {
        if let Some(value) = base.get(key) {
            profile.entry(key).or_insert_with(|| value.clone());
        }
    }
}

fn library_name(library: &Value) -> Option<&str> {
    library.get("name").and_then(Value::as_str)
}

fn patch_libraries(profile: &mut Map<String, Value>, base: &Map<String, Value>) {
    let Some(base_libs) = base.get("libraries").and_then(Value::as_array) else {
        return;
    };
    if base_libs.is_empty() {
        return;
    }

    let libraries = profile
        .entry("libraries")
        .or_insert_with(|| Value::Array(Vec::new()));
    let Some(libraries) = libraries.as_array_mut() else {
        return;
    };

    let present: HashSet<String> = libraries
        .iter()
        .filter_map(library_name)
        .map(ToString::to_string)
        .collect();

    // The base list's first entry already being there means an earlier pass merged it.
    if base_libs
        .first()
        .and_then(library_name)
        .is_some_and(|first| present.contains(first))
    {
        return;
    }

    let overridden: HashSet<String> = present
        .iter()
        .filter_map(|name| MavenArtifact::parse(name).ok())
        .filter(MavenArtifact::is_asm)
        .map(|artifact| artifact.key())
        .collect();

    for library in base_libs {
        let Some(name) = library_name(library) else {
            continue;
        };
        if present.contains(name) {
            continue;
        }
        let is_overridden = MavenArtifact::parse(name)
            .map(|artifact| artifact.is_asm() && overridden.contains(&artifact.key()))
            .unwrap_or(false);
        if is_overridden {
            debug!("Keeping loader copy over inherited {}", name);
            continue;
        }
        libraries.push(library.clone());
    }
}

fn patch_arguments(
    profile: &mut Map<String, Value>,
    base: &Map<String, Value>,
    flavor: MergeFlavor,
) {
    let has_arguments = profile.contains_key("arguments");
    let has_legacy = profile.contains_key("minecraftArguments");

    if !has_arguments {
        if has_legacy {
            return;
        }
        if let Some(arguments) = base.get("arguments") {
            profile.insert("arguments".into(), arguments.clone());
        } else if let Some(legacy) = base.get("minecraftArguments") {
            profile.insert("minecraftArguments".into(), legacy.clone());
        }
        return;
    }

    let Some(base_arguments) = base.get("arguments").and_then(Value::as_object) else {
        return;
    };
    let Some(arguments) = profile.get_mut("arguments").and_then(Value::as_object_mut) else {
        return;
    };

    for side in ["game", "jvm"] {
        let Some(base_list) = base_arguments.get(side).and_then(Value::as_array) else {
            continue;
        };
        if base_list.is_empty() {
            continue;
        }

        let list = arguments
            .entry(side)
            .or_insert_with(|| Value::Array(Vec::new()));
        let Some(list) = list.as_array_mut() else {
            continue;
        };

        if contains_run(list, base_list) {
            continue;
        }
        if flavor == MergeFlavor::Heavyweight && side == "game" {
            // game flags get de-duplicated afterwards, so presence is checked per entry
            append_missing_entries(list, base_list);
        } else {
            list.extend(base_list.iter().cloned());
        }
    }
}

/// Append base entries whose flag (or identical object) the list lacks.
fn append_missing_entries(list: &mut Vec<Value>, base_list: &[Value]) {
    let mut merged = list.clone();
    merged.extend(base_list.iter().cloned());
    *list = dedupe_flag_pairs(&merged);
}

fn normalize_game_flags(profile: &mut Map<String, Value>) {
    let Some(game) = profile
        .get_mut("arguments")
        .and_then(|arguments| arguments.get_mut("game"))
        .and_then(Value::as_array_mut)
    else {
        return;
    };

    let mut normalized = dedupe_flag_pairs(game);
    for (flag, token) in REQUIRED_GAME_FLAGS {
        if !normalized.iter().any(|arg| arg.as_str() == Some(flag)) {
            normalized.push(Value::String(flag.to_string()));
            normalized.push(Value::String(token.to_string()));
        }
    }

    if normalized != *game {
        *game = normalized;
    }
}

/// Drop repeated `--flag value` pairs, keeping the first occurrence.
/// Rule objects are kept once each.
pub fn dedupe_flag_pairs(args: &[Value]) -> Vec<Value> {
    let mut seen_flags: HashSet<String> = HashSet::new();
    let mut seen_objects: Vec<&Value> = Vec::new();
    let mut out = Vec::with_capacity(args.len());
    let mut i = 0;

    while i < args.len() {
        let arg = &args[i];
        match arg.as_str() {
            Some(flag) if flag.starts_with("--") => {
                let value = args
                    .get(i + 1)
                    .and_then(Value::as_str)
                    .filter(|next| !next.starts_with("--"));
                let span = if value.is_some() { 2 } else { 1 };

                if seen_flags.insert(flag.to_string()) {
                    out.extend(args[i..i + span].iter().cloned());
                }
                i += span;
            }
            Some(_) => {
                out.push(arg.clone());
                i += 1;
            }
            None => {
                if !seen_objects.contains(&arg) {
                    seen_objects.push(arg);
                    out.push(arg.clone());
                }
                i += 1;
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn base_manifest(libs: usize) -> Value {
        let libraries: Vec<Value> = (0..libs)
            .map(|i| json!({"name": format!("com.example:lib{i}:1.0")}))
            .collect();
        json!({
            "id": "1.20.1",
            "downloads": {
                "client": {"url": "https://example.com/client.jar", "sha1": "aa", "size": 1},
                "server": {"url": "https://example.com/server.jar", "sha1": "bb", "size": 1}
            },
            "assetIndex": {"id": "5", "url": "https://example.com/5.json"},
            "assets": "5",
            "libraries": libraries,
            "arguments": {
                "game": [
                    "--username", "${auth_player_name}",
                    "--version", "${version_name}",
                    {"rules": [{"action": "allow", "features": {"is_demo_user": true}}], "value": "--demo"}
                ],
                "jvm": ["-Djava.library.path=${natives_directory}", "-cp", "${classpath}"]
            }
        })
    }

    fn count_flag(profile: &Value, flag: &str) -> usize {
        profile["arguments"]["game"]
            .as_array()
            .unwrap()
            .iter()
            .filter(|arg| arg.as_str() == Some(flag))
            .count()
    }

    #[test]
    fn empty_profile_receives_every_base_library() {
        let base = base_manifest(7);
        let mut profile = json!({"id": "fabric-loader-0.15.7-1.20.1", "libraries": []});

        assert!(reconcile(&mut profile, &base, MergeFlavor::Lightweight));
        assert_eq!(profile["libraries"].as_array().unwrap().len(), 7);
    }

    #[test]
    fn missing_fields_are_filled_and_present_ones_kept() {
        let base = base_manifest(1);
        let mut profile = json!({
            "id": "fabric-loader-0.15.7-1.20.1",
            "assets": "custom",
            "downloads": {"client": {"url": "https://loader.example/client.jar"}}
        });

        reconcile(&mut profile, &base, MergeFlavor::Lightweight);

        assert_eq!(profile["assets"], "custom");
        assert_eq!(profile["assetIndex"]["id"], "5");
        assert_eq!(profile["downloads"]["client"]["url"], "https://loader.example/client.jar");
        assert_eq!(profile["downloads"]["server"]["url"], "https://example.com/server.jar");
        assert_eq!(profile["arguments"], base["arguments"]);
    }

    #[test]
    fn second_pass_is_a_no_op() {
        for flavor in [MergeFlavor::Lightweight, MergeFlavor::Heavyweight] {
            let base = base_manifest(3);
            let mut profile = json!({
                "id": "profile",
                "libraries": [{"name": "net.fabricmc:fabric-loader:0.15.7"}],
                "arguments": {"game": ["--launchTarget", "forgeclient"], "jvm": ["-DignoreList=x"]}
            });

            assert!(reconcile(&mut profile, &base, flavor));
            let once = profile.clone();
            assert!(!reconcile(&mut profile, &base, flavor));
            assert_eq!(profile, once);
        }
    }

    #[test]
    fn loader_arguments_come_before_inherited_ones() {
        let base = base_manifest(0);
        let mut profile = json!({"arguments": {"jvm": ["-DFabricMcEmu=x"]}});

        reconcile(&mut profile, &base, MergeFlavor::Lightweight);

        let jvm = profile["arguments"]["jvm"].as_array().unwrap();
        assert_eq!(jvm[0], "-DFabricMcEmu=x");
        assert_eq!(jvm.len(), 4);
        assert_eq!(profile["arguments"]["game"], base["arguments"]["game"]);
    }

    #[test]
    fn asm_from_base_is_skipped_when_loader_ships_its_own() {
        let base = json!({
            "libraries": [
                {"name": "com.mojang:logging:1.1.1"},
                {"name": "org.ow2.asm:asm:9.3"},
                {"name": "org.ow2.asm:asm-tree:9.3"}
            ]
        });
        let mut profile = json!({"libraries": [{"name": "org.ow2.asm:asm:9.6"}]});

        reconcile(&mut profile, &base, MergeFlavor::Lightweight);

        let names: Vec<&str> = profile["libraries"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(library_name)
            .collect();
        assert_eq!(
            names,
            vec!["org.ow2.asm:asm:9.6", "com.mojang:logging:1.1.1", "org.ow2.asm:asm-tree:9.3"]
        );
    }

    #[test]
    fn first_library_already_present_skips_library_merge() {
        let base = base_manifest(3);
        let mut profile = json!({"libraries": [{"name": "com.example:lib0:1.0"}]});

        reconcile(&mut profile, &base, MergeFlavor::Lightweight);
        assert_eq!(profile["libraries"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn existing_version_flag_wins_over_inherited_one() {
        let base = base_manifest(0);
        let mut profile = json!({
            "arguments": {"game": ["--version", "1.20.1-forge-47.4.10", "--version", "stale"]}
        });

        reconcile(&mut profile, &base, MergeFlavor::Heavyweight);

        assert_eq!(count_flag(&profile, "--version"), 1);
        let game = profile["arguments"]["game"].as_array().unwrap();
        let idx = game.iter().position(|a| a == "--version").unwrap();
        assert_eq!(game[idx + 1], "1.20.1-forge-47.4.10");
    }

    #[test]
    fn heavyweight_guarantees_required_flags() {
        let base = json!({});
        let mut profile = json!({"arguments": {"game": ["--launchTarget", "forgeclient"]}});

        assert!(reconcile(&mut profile, &base, MergeFlavor::Heavyweight));

        for (flag, token) in REQUIRED_GAME_FLAGS {
            assert_eq!(count_flag(&profile, flag), 1);
            let game = profile["arguments"]["game"].as_array().unwrap();
            let idx = game.iter().position(|a| a == flag).unwrap();
            assert_eq!(game[idx + 1], token);
        }
    }

    #[test]
    fn lightweight_does_not_inject_flags() {
        let base = json!({});
        let mut profile = json!({"arguments": {"game": []}});
        assert!(!reconcile(&mut profile, &base, MergeFlavor::Lightweight));
    }

    #[test]
    fn dedupe_keeps_objects_and_bare_values() {
        let rule = json!({"rules": [], "value": "--demo"});
        let args = vec![
            json!("--width"),
            json!("854"),
            rule.clone(),
            json!("--fullscreen"),
            json!("--width"),
            json!("1280"),
            rule.clone(),
        ];

        let deduped = dedupe_flag_pairs(&args);
        assert_eq!(
            deduped,
            vec![json!("--width"), json!("854"), rule, json!("--fullscreen")]
        );
    }

    #[tokio::test]
    async fn unchanged_profile_is_not_rewritten() {
        let dir = tempfile::tempdir().unwrap();
        let profile_path = dir.path().join("profile.json");
        let base_path = dir.path().join("base.json");
        std::fs::write(&base_path, base_manifest(2).to_string()).unwrap();
        std::fs::write(&profile_path, json!({"id": "p", "mainClass": "Main"}).to_string()).unwrap();

        let first = reconcile_files("p", &profile_path, &base_path, MergeFlavor::Lightweight)
            .await
            .unwrap();
        assert!(first.written);
        let on_disk = std::fs::read_to_string(&profile_path).unwrap();

        let second = reconcile_files("p", &profile_path, &base_path, MergeFlavor::Lightweight)
            .await
            .unwrap();
        assert!(!second.written);
        assert_eq!(std::fs::read_to_string(&profile_path).unwrap(), on_disk);
        assert_eq!(second.typed().unwrap().main_class, "Main");
    }
}
