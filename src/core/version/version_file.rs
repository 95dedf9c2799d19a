// ─── Version File ───
// Typed view of a version document plus OS rule evaluation and
// `inheritsFrom` resolution.

use std::collections::HashSet;
use std::path::Path;

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::core::error::{LauncherError, LauncherResult};
use crate::core::maven::MavenArtifact;

use super::layout::GameDir;

const MAX_INHERITANCE_DEPTH: usize = 8;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionJson {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub main_class: String,
    #[serde(default)]
    pub inherits_from: Option<String>,
    /// Version whose jar this one runs on.
    #[serde(default)]
    pub jar: Option<String>,
    #[serde(default)]
    pub libraries: Vec<LibraryEntry>,
    #[serde(default)]
    pub downloads: Option<VersionDownloads>,
    #[serde(default)]
    pub asset_index: Option<AssetIndexInfo>,
    #[serde(default)]
    pub assets: Option<String>,
    #[serde(default)]
    pub arguments: Option<Arguments>,
    /// Legacy `minecraftArguments` field (pre-1.13).
    #[serde(default)]
    pub minecraft_arguments: Option<String>,
    #[serde(default)]
    pub java_version: Option<JavaVersionInfo>,
    #[serde(rename = "type", default)]
    pub version_type: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JavaVersionInfo {
    pub major_version: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VersionDownloads {
    #[serde(default)]
    pub client: Option<DownloadArtifact>,
    #[serde(default)]
    pub server: Option<DownloadArtifact>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DownloadArtifact {
    #[serde(default)]
    pub sha1: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetIndexInfo {
    pub id: String,
    pub url: String,
    #[serde(default)]
    pub sha1: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Arguments {
    #[serde(default)]
    pub game: Vec<Value>,
    #[serde(default)]
    pub jvm: Vec<Value>,
}

// ─── Library Entry with Rules ───

#[derive(Debug, Clone, Deserialize)]
pub struct LibraryEntry {
    pub name: String,
    /// Maven repository base for libraries without a `downloads` block.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub downloads: Option<LibraryDownloads>,
    #[serde(default)]
    pub rules: Option<Vec<Value>>,
    #[serde(default)]
    pub natives: Option<serde_json::Map<String, Value>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LibraryDownloads {
    #[serde(default)]
    pub artifact: Option<LibraryArtifact>,
    #[serde(default)]
    pub classifiers: Option<serde_json::Map<String, Value>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LibraryArtifact {
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub sha1: Option<String>,
    #[serde(default)]
    pub url: String,
}

impl LibraryEntry {
    /// No rules means allowed; otherwise the last matching rule decides.
    pub fn is_allowed_for_current_os(&self) -> bool {
        match &self.rules {
            Some(rules) => rules_allow_current_os(rules),
            None => true,
        }
    }

    /// Natives classifier for this platform, with `${arch}` resolved.
    pub fn native_classifier_for_current_os(&self) -> Option<String> {
        let natives = self.natives.as_ref()?;
        let classifier = natives.get(current_os_name())?.as_str()?;
        let arch = if cfg!(target_pointer_width = "64") {
            "64"
        } else {
            "32"
        };
        Some(classifier.replace("${arch}", arch))
    }

    pub fn artifact(&self) -> Option<MavenArtifact> {
        MavenArtifact::parse(&self.name).ok()
    }
}

/// Mojang OS name for the current platform.
pub fn current_os_name() -> &'static str {
    if cfg!(target_os = "windows") {
        "windows"
    } else if cfg!(target_os = "macos") {
        "osx"
    } else {
        "linux"
    }
}

/// Evaluate a rule list top to bottom starting from "disallowed".
///
/// Rules gated on launcher features (`is_demo_user`, `has_custom_resolution`,
/// quick play) never match.
pub fn rules_allow_current_os(rules: &[Value]) -> bool {
    let current_os = current_os_name();
    let mut allowed = false;

    for rule in rules {
        if rule.get("features").is_some() {
            continue;
        }

        let os_matches = match rule
            .get("os")
            .and_then(|os| os.get("name"))
            .and_then(Value::as_str)
        {
            None => true,
            Some(name) => name == current_os,
        };

        if os_matches {
            allowed = rule.get("action").and_then(Value::as_str) == Some("allow");
        }
    }

    allowed
}

/// String values of one argument entry, or nothing when its rules exclude this OS.
pub fn extract_argument_values(value: &Value) -> Vec<String> {
    if let Some(arg) = value.as_str() {
        return vec![arg.to_string()];
    }

    let Some(obj) = value.as_object() else {
        return vec![];
    };

    if let Some(rules) = obj.get("rules").and_then(Value::as_array) {
        if !rules_allow_current_os(rules) {
            return vec![];
        }
    }

    match obj.get("value") {
        Some(Value::String(s)) => vec![s.clone()],
        Some(Value::Array(arr)) => arr
            .iter()
            .filter_map(|v| v.as_str().map(ToString::to_string))
            .collect(),
        _ => vec![],
    }
}

impl VersionJson {
    pub fn from_value(document: Value) -> LauncherResult<Self> {
        Ok(serde_json::from_value(document)?)
    }

    pub async fn read_document(path: &Path) -> LauncherResult<Value> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| LauncherError::from(e).at_path(path))?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Java major declared by the document, if any.
    pub fn required_java_major(&self) -> Option<u32> {
        self.java_version.as_ref().map(|j| j.major_version)
    }

    pub fn game_arguments(&self) -> Vec<String> {
        match &self.arguments {
            Some(args) if !args.game.is_empty() => {
                args.game.iter().flat_map(extract_argument_values).collect()
            }
            _ => self
                .minecraft_arguments
                .as_deref()
                .map(|s| s.split_whitespace().map(ToString::to_string).collect())
                .unwrap_or_default(),
        }
    }

    pub fn jvm_arguments(&self) -> Vec<String> {
        match &self.arguments {
            Some(args) => args.jvm.iter().flat_map(extract_argument_values).collect(),
            None => vec![],
        }
    }
}

/// Load `id` and fold its `inheritsFrom` chain into one document.
pub async fn resolve_with_inheritance(game: &GameDir, id: &str) -> LauncherResult<Value> {
    let mut document = VersionJson::read_document(&game.version_json(id)).await?;
    let mut visited = HashSet::from([id.to_string()]);

    while let Some(parent_id) = document
        .get("inheritsFrom")
        .and_then(Value::as_str)
        .map(ToString::to_string)
    {
        if !visited.insert(parent_id.clone()) || visited.len() > MAX_INHERITANCE_DEPTH {
            return Err(LauncherError::Other(format!(
                "Inheritance chain of {id} loops or is too deep at {parent_id}"
            )));
        }

        debug!("Merging {} over parent {}", id, parent_id);
        let parent = VersionJson::read_document(&game.version_json(&parent_id)).await?;
        document = merge_with_parent_json(&document, &parent);
    }

    Ok(document)
}

/// Merge `child` over `parent`.
///
/// Scalar keys from the child win. Libraries are unioned child-first, with a
/// parent library dropped when the child ships the same `group:artifact`.
/// Argument lists from the child replace the parent's only when they already
/// contain them; otherwise the parent's entries come first. The result no
/// longer carries `inheritsFrom` unless the parent had one.
pub fn merge_with_parent_json(child: &Value, parent: &Value) -> Value {
    let mut merged = parent.clone();
    let Some(merged_obj) = merged.as_object_mut() else {
        return child.clone();
    };
    merged_obj.remove("inheritsFrom");

    let Some(child_obj) = child.as_object() else {
        return merged;
    };

    for (key, value) in child_obj {
        match key.as_str() {
            "inheritsFrom" => {}
            "libraries" => {
                let libraries = merge_libraries(value, parent.get("libraries"));
                merged_obj.insert(key.clone(), libraries);
            }
            "arguments" => {
                let arguments = merge_arguments(value, parent.get("arguments"));
                merged_obj.insert(key.clone(), arguments);
            }
            _ => {
                merged_obj.insert(key.clone(), value.clone());
            }
        }
    }

    if let Some(grandparent) = parent.get("inheritsFrom") {
        merged_obj.insert("inheritsFrom".into(), grandparent.clone());
    }

    merged
}

fn library_key(library: &Value) -> Option<String> {
    let name = library.get("name")?.as_str()?;
    Some(match MavenArtifact::parse(name) {
        Ok(artifact) => match &artifact.classifier {
            Some(classifier) => format!("{}:{}", artifact.key(), classifier),
            None => artifact.key(),
        },
        Err(_) => name.to_string(),
    })
}

fn merge_libraries(child: &Value, parent: Option<&Value>) -> Value {
    let mut out: Vec<Value> = child.as_array().cloned().unwrap_or_default();
    let mut keys: HashSet<String> = out.iter().filter_map(library_key).collect();

    if let Some(parent_libs) = parent.and_then(Value::as_array) {
        for library in parent_libs {
            if let Some(key) = library_key(library) {
                if !keys.insert(key) {
                    continue;
                }
            }
            out.push(library.clone());
        }
    }

    Value::Array(out)
}

fn merge_arguments(child: &Value, parent: Option<&Value>) -> Value {
    let mut merged = parent.cloned().unwrap_or_else(|| Value::Object(Default::default()));
    let Some(merged_obj) = merged.as_object_mut() else {
        return child.clone();
    };

    for side in ["game", "jvm"] {
        let child_list = child.get(side).and_then(Value::as_array);
        let parent_list = parent.and_then(|p| p.get(side)).and_then(Value::as_array);

        let list = match (child_list, parent_list) {
            (Some(child_list), Some(parent_list)) => {
                if contains_run(child_list, parent_list) {
                    child_list.clone()
                } else {
                    append_parent_arguments(child_list, parent_list)
                }
            }
            (Some(child_list), None) => child_list.clone(),
            (None, Some(parent_list)) => parent_list.clone(),
            (None, None) => continue,
        };
        merged_obj.insert(side.to_string(), Value::Array(list));
    }

    merged
}

/// Child arguments first, then the parent's. A parent `--flag [value]` pair
/// is dropped when the child already sets that flag.
fn append_parent_arguments(child: &[Value], parent: &[Value]) -> Vec<Value> {
    let child_flags: HashSet<&str> = child
        .iter()
        .filter_map(Value::as_str)
        .filter(|arg| arg.starts_with("--"))
        .collect();

    let mut out = child.to_vec();
    let mut i = 0;
    while i < parent.len() {
        let arg = &parent[i];
        match arg.as_str() {
            Some(flag) if flag.starts_with("--") => {
                let takes_value = parent
                    .get(i + 1)
                    .and_then(Value::as_str)
                    .is_some_and(|next| !next.starts_with("--"));
                let span = if takes_value { 2 } else { 1 };
                if !child_flags.contains(flag) {
                    out.extend(parent[i..i + span].iter().cloned());
                }
                i += span;
            }
            _ => {
                if arg.is_string() || !out.contains(arg) {
                    out.push(arg.clone());
                }
                i += 1;
            }
        }
    }
    out
}

/// `true` when `needle` appears in `haystack` as one contiguous run.
pub fn contains_run(haystack: &[Value], needle: &[Value]) -> bool {
    needle.is_empty()
        || (haystack.len() >= needle.len()
            && haystack.windows(needle.len()).any(|window| window == needle))
}
