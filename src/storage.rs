use crate::config::SerialiserConfig;
use crate::error::QuamError;
use crate::quam::Quam;
use crate::schema::ClassRegistry;
use crate::serialise::{self, InstantiateOptions};
use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::{Map, Value as JsonValue};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// Output filename (may contain subfolders) -> top-level keys stored in that file.
pub type ContentMapping = BTreeMap<String, Vec<String>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveWarning {
    /// A mapping entry names a key the document does not have.
    MissingKey { file: String, key: String },
    /// An absolute filename in the mapping; its keys went to the default file.
    AbsolutePath { file: String },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SaveReport {
    pub files: Vec<PathBuf>,
    pub warnings: Vec<SaveWarning>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyCollision {
    pub key: String,
    pub previous: PathBuf,
    pub winner: PathBuf,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadedState {
    pub contents: Map<String, JsonValue>,
    /// Top-level key -> file it was read from.
    pub sources: BTreeMap<String, PathBuf>,
    pub collisions: Vec<KeyCollision>,
    pub default_filename: Option<String>,
}

impl LoadedState {
    pub fn into_document(self) -> JsonValue {
        JsonValue::Object(self.contents)
    }

    /// Mapping that writes every key back to the file it came from.
    pub fn content_mapping(&self, base: &Path) -> ContentMapping {
        let mut mapping = ContentMapping::new();
        for (key, source) in &self.sources {
            let relative = source.strip_prefix(base).unwrap_or(source);
            let name = relative.to_string_lossy().replace('\\', "/");
            if Some(name.as_str()) == self.default_filename.as_deref() {
                continue;
            }
            mapping.entry(name).or_default().push(key.clone());
        }
        mapping
    }
}

#[derive(Debug, Clone, Default)]
pub struct JsonSerialiser {
    pub config: SerialiserConfig,
}

fn write_json(path: &Path, contents: &JsonValue) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create folder: {}", parent.display()))?;
    }
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    contents.serialize(&mut ser)?;
    fs::write(path, buf).with_context(|| format!("Failed to write to file: {}", path.display()))?;
    debug!(path = %path.display(), "wrote json file");
    Ok(())
}

fn read_json_object(path: &Path) -> Result<Map<String, JsonValue>> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("Failed to read file: {}", path.display()))?;
    let value: JsonValue = serde_json::from_str(&data)
        .with_context(|| format!("Failed to parse JSON file: {}", path.display()))?;
    match value {
        JsonValue::Object(map) => Ok(map),
        _ => Err(anyhow::anyhow!(QuamError::MalformedDocument(format!(
            "{} does not contain a JSON object",
            path.display()
        )))),
    }
}

fn is_json_extension(ext: &str) -> bool {
    ext.eq_ignore_ascii_case("json")
}

fn is_json(path: &Path) -> bool {
    path.extension()
        .is_some_and(|e| is_json_extension(&e.to_string_lossy()))
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .is_some_and(|n| n.to_string_lossy().starts_with('.'))
}

fn collect_json_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    let entries =
        fs::read_dir(dir).with_context(|| format!("Failed to read folder: {}", dir.display()))?;
    for entry in entries {
        let path = entry?.path();
        if path.is_dir() {
            if is_hidden(&path) {
                debug!(path = %path.display(), "skipping hidden folder");
                continue;
            }
            collect_json_files(&path, out)?;
        } else if is_json(&path) {
            out.push(path);
        }
    }
    Ok(())
}

impl JsonSerialiser {
    pub fn new(config: SerialiserConfig) -> Self {
        Self { config }
    }

    /// Folder to write into and the name of the default file inside it.
    fn parse_path(&self, path: Option<&Path>, split: bool) -> Result<(PathBuf, String)> {
        let path = path.map(Path::to_path_buf).or_else(|| self.config.state_path.clone());
        let default_filename = self.config.default_filename.clone();
        let Some(path) = path else {
            let folder = if split {
                self.config.working_dir.join(&self.config.default_foldername)
            } else {
                self.config.working_dir.clone()
            };
            return Ok((folder, default_filename));
        };

        let extension = path.extension().map(|e| e.to_string_lossy().into_owned());
        match extension.as_deref() {
            None => Ok((path, default_filename)),
            Some(ext) if is_json_extension(ext) => {
                let folder = path
                    .parent()
                    .filter(|p| !p.as_os_str().is_empty())
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| PathBuf::from("."));
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or(default_filename);
                Ok((folder, name))
            }
            Some(_) => Err(anyhow::anyhow!(QuamError::UnsupportedPath(path))),
        }
    }

    pub fn save(
        &self,
        quam: &Quam,
        path: Option<&Path>,
        content_mapping: Option<&ContentMapping>,
        ignore: &[&str],
    ) -> Result<SaveReport> {
        let document = quam.to_dict(self.config.include_defaults)?;
        let JsonValue::Object(mut contents) = document else {
            return Err(anyhow::anyhow!(QuamError::MalformedDocument(
                "root did not serialise to an object".to_string()
            )));
        };
        for key in ignore {
            contents.remove(*key);
        }
        self.save_contents(contents, path, content_mapping)
    }

    /// Write an already serialised document, splitting it per `content_mapping`.
    pub fn save_contents(
        &self,
        mut contents: Map<String, JsonValue>,
        path: Option<&Path>,
        content_mapping: Option<&ContentMapping>,
    ) -> Result<SaveReport> {
        let mapping = content_mapping
            .unwrap_or(&self.config.content_mapping)
            .clone();
        let (folder, default_filename) = self.parse_path(path, !mapping.is_empty())?;
        fs::create_dir_all(&folder)
            .with_context(|| format!("Failed to create folder: {}", folder.display()))?;

        let mut report = SaveReport::default();
        let mut files: BTreeMap<PathBuf, Map<String, JsonValue>> = BTreeMap::new();
        for (filename, keys) in &mapping {
            if Path::new(filename).is_absolute() {
                warn!(file = %filename, "absolute path in content mapping ignored, keys stay in the default file");
                report.warnings.push(SaveWarning::AbsolutePath {
                    file: filename.clone(),
                });
                continue;
            }
            let target = folder.join(filename);
            for key in keys {
                match contents.remove(key) {
                    Some(value) => {
                        files.entry(target.clone()).or_default().insert(key.clone(), value);
                    }
                    None => {
                        warn!(file = %filename, key = %key, "content mapping key not found in data");
                        report.warnings.push(SaveWarning::MissingKey {
                            file: filename.clone(),
                            key: key.clone(),
                        });
                    }
                }
            }
        }

        for (target, file_contents) in files {
            write_json(&target, &JsonValue::Object(file_contents))?;
            report.files.push(target);
        }

        if !contents.is_empty() || report.files.is_empty() {
            let target = folder.join(&default_filename);
            write_json(&target, &JsonValue::Object(contents))?;
            report.files.push(target);
        }

        Ok(report)
    }

    /// Read a single JSON file, or merge every JSON file below a folder.
    ///
    /// Folder files are read in lexicographic order of their relative path, so on
    /// a key collision the later file wins.
    pub fn load(&self, path: Option<&Path>) -> Result<LoadedState> {
        let path = path
            .map(Path::to_path_buf)
            .or_else(|| self.config.state_path.clone())
            .unwrap_or_else(|| self.config.working_dir.join(&self.config.default_foldername));

        if !path.exists() {
            return Err(anyhow::anyhow!(QuamError::PathNotFound(path)));
        }

        let mut state = LoadedState::default();
        if path.is_file() {
            if !is_json(&path) {
                return Err(anyhow::anyhow!(QuamError::NotJsonFile(path)));
            }
            state.contents = read_json_object(&path)?;
            state.sources = state
                .contents
                .keys()
                .map(|k| (k.clone(), path.clone()))
                .collect();
            state.default_filename = path.file_name().map(|n| n.to_string_lossy().into_owned());
            return Ok(state);
        }

        let mut files = Vec::new();
        collect_json_files(&path, &mut files)?;
        files.sort_by(|a, b| a.strip_prefix(&path).ok().cmp(&b.strip_prefix(&path).ok()));
        for file in files {
            let file_contents = read_json_object(&file)?;
            if file.strip_prefix(&path).ok() == Some(Path::new(&self.config.default_filename)) {
                state.default_filename = Some(self.config.default_filename.clone());
            }
            for (key, value) in file_contents {
                if let Some(previous) = state.sources.insert(key.clone(), file.clone()) {
                    warn!(key = %key, previous = %previous.display(), winner = %file.display(), "key appears in several state files");
                    state.collisions.push(KeyCollision {
                        key: key.clone(),
                        previous,
                        winner: file.clone(),
                    });
                }
                state.contents.insert(key, value);
            }
        }
        Ok(state)
    }

    pub fn load_quam(
        &self,
        path: Option<&Path>,
        registry: Arc<ClassRegistry>,
        root_class: Option<&str>,
        options: &InstantiateOptions,
    ) -> Result<Quam> {
        let state = self.load(path)?;
        let quam = serialise::load_root(registry, root_class, &state.into_document(), options)?;
        Ok(quam)
    }
}

pub fn save(quam: &Quam, path: &Path) -> Result<SaveReport> {
    JsonSerialiser::default().save(quam, Some(path), None, &[])
}

pub fn load(path: &Path) -> Result<LoadedState> {
    JsonSerialiser::default().load(Some(path))
}

pub fn exists(path: &Path) -> bool {
    path.exists()
}
