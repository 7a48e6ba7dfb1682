//! Personas: named bundles of system prompt, engine settings and context
//! files, stored as `<id>.json` in the persona directory.

use serde::Deserialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::core::provider::Provider;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Persona {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub system_prompt: String,
    #[serde(default)]
    pub engine: Option<Provider>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub stream: Option<bool>,
    /// Relative entries are resolved against the persona directory on load.
    #[serde(default)]
    pub attachments: Vec<PathBuf>,
}

/// A persona together with the file stem it was loaded from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersonaFile {
    pub id: String,
    pub persona: Persona,
}

#[derive(Debug)]
pub enum PersonaError {
    NotFound { id: String, available: Vec<String> },
    Read { path: PathBuf, source: std::io::Error },
    Parse { path: PathBuf, source: serde_json::Error },
}

impl fmt::Display for PersonaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PersonaError::NotFound { id, available } if available.is_empty() => {
                write!(f, "Persona '{id}' not found. No personas are installed.")
            }
            PersonaError::NotFound { id, available } => write!(
                f,
                "Persona '{}' not found. Available personas: {}",
                id,
                available.join(", ")
            ),
            PersonaError::Read { path, source } => {
                write!(f, "Could not read persona {}: {}", path.display(), source)
            }
            PersonaError::Parse { path, source } => {
                write!(f, "Invalid persona file {}: {}", path.display(), source)
            }
        }
    }
}

impl std::error::Error for PersonaError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PersonaError::NotFound { .. } => None,
            PersonaError::Read { source, .. } => Some(source),
            PersonaError::Parse { source, .. } => Some(source),
        }
    }
}

fn persona_ids(dir: &Path) -> Vec<String> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut ids: Vec<String> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
        .filter_map(|path| path.file_stem()?.to_str().map(str::to_string))
        .collect();
    ids.sort();
    ids
}

/// Load `<dir>/<id>.json`. A trailing `.json` on `id` is accepted.
pub fn load_persona(dir: &Path, id: &str) -> Result<PersonaFile, PersonaError> {
    let id = id.trim();
    let id = id.strip_suffix(".json").unwrap_or(id);
    let path = dir.join(format!("{id}.json"));
    let contents = match fs::read_to_string(&path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Err(PersonaError::NotFound {
                id: id.to_string(),
                available: persona_ids(dir),
            });
        }
        Err(source) => return Err(PersonaError::Read { path, source }),
    };
    let mut persona: Persona =
        serde_json::from_str(&contents).map_err(|source| PersonaError::Parse {
            path: path.clone(),
            source,
        })?;
    for attachment in &mut persona.attachments {
        if attachment.is_relative() {
            *attachment = dir.join(&*attachment);
        }
    }
    Ok(PersonaFile {
        id: id.to_string(),
        persona,
    })
}

/// Every readable persona in `dir`, sorted by display name. Broken files are
/// skipped with a warning.
pub fn list_personas(dir: &Path) -> Vec<PersonaFile> {
    let mut personas: Vec<PersonaFile> = persona_ids(dir)
        .iter()
        .filter_map(|id| match load_persona(dir, id) {
            Ok(persona) => Some(persona),
            Err(err) => {
                warn!(persona = %id, error = %err, "skipping persona");
                None
            }
        })
        .collect();
    personas.sort_by(|a, b| a.persona.name.cmp(&b.persona.name));
    personas
}
