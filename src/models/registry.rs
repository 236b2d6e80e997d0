//! Voice model index.
//!
//! The models directory holds the model weights next to an `index.json`
//! mapping display names to weight file names:
//!
//! ```json
//! { "Alto Singer": "alto_v2.pth", "Tenor": "tenor.pth" }
//! ```

use crate::config::ModelsConfig;
use crate::defaults::AUTOCOMPLETE_LIMIT;
use crate::error::{Result, VoicoverError};
use crate::pipeline::types::ModelRef;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Display-name → weight-file index for one models directory.
#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    dir: PathBuf,
    entries: BTreeMap<String, String>,
}

impl ModelRegistry {
    /// Load the index file described by `config`.
    ///
    /// A missing index yields an empty registry so the daemon can start
    /// before any model is installed.
    pub fn load(config: &ModelsConfig) -> Result<Self> {
        let path = config.index_path();
        match std::fs::read_to_string(&path) {
            Ok(contents) => Self::from_json(&config.dir, &contents),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(path = %path.display(), "model index not found, no models available");
                Ok(Self {
                    dir: config.dir.clone(),
                    entries: BTreeMap::new(),
                })
            }
            Err(e) => Err(VoicoverError::ModelIndex {
                message: format!("cannot read {}: {}", path.display(), e),
            }),
        }
    }

    /// Parse an index from its JSON text.
    pub fn from_json(dir: &Path, contents: &str) -> Result<Self> {
        let entries: BTreeMap<String, String> =
            serde_json::from_str(contents).map_err(|e| VoicoverError::ModelIndex {
                message: format!("invalid model index: {}", e),
            })?;
        Ok(Self {
            dir: dir.to_path_buf(),
            entries,
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolve a display name or a weight file name.
    ///
    /// Display names match case-insensitively.
    pub fn resolve(&self, name: &str) -> Result<ModelRef> {
        let found = self
            .entries
            .iter()
            .find(|(display, _)| display.eq_ignore_ascii_case(name))
            .or_else(|| self.entries.iter().find(|(_, file)| file.as_str() == name));

        match found {
            Some((display, file)) => Ok(ModelRef {
                name: display.clone(),
                path: self.dir.join(file),
            }),
            None => Err(VoicoverError::ModelNotFound {
                name: name.to_string(),
            }),
        }
    }

    /// Display names matching `query` case-insensitively, at most 25.
    ///
    /// Names starting with the query come first, then names merely containing
    /// it; each group stays sorted.
    pub fn autocomplete(&self, query: &str) -> Vec<String> {
        let needle = query.to_lowercase();
        let (prefixed, contained): (Vec<&String>, Vec<&String>) = self
            .entries
            .keys()
            .filter(|name| name.to_lowercase().contains(&needle))
            .partition(|name| name.to_lowercase().starts_with(&needle));

        prefixed
            .into_iter()
            .chain(contained)
            .take(AUTOCOMPLETE_LIMIT)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const INDEX: &str = r#"{"Alto Singer": "alto_v2.pth", "Tenor": "tenor.pth", "Baritone": "bari.pth"}"#;

    fn registry() -> ModelRegistry {
        ModelRegistry::from_json(Path::new("/models"), INDEX).unwrap()
    }

    #[test]
    fn resolves_display_name_case_insensitively() {
        let model = registry().resolve("alto singer").unwrap();
        assert_eq!(model.name, "Alto Singer");
        assert_eq!(model.path, PathBuf::from("/models/alto_v2.pth"));
    }

    #[test]
    fn resolves_file_name() {
        let model = registry().resolve("tenor.pth").unwrap();
        assert_eq!(model.name, "Tenor");
    }

    #[test]
    fn unknown_model_is_not_found() {
        let err = registry().resolve("Soprano").unwrap_err();
        assert!(matches!(err, VoicoverError::ModelNotFound { name } if name == "Soprano"));
    }

    #[test]
    fn autocomplete_ranks_prefix_matches_first() {
        assert_eq!(registry().autocomplete("t"), vec!["Tenor", "Alto Singer", "Baritone"]);
        assert_eq!(registry().autocomplete("a"), vec!["Alto Singer", "Baritone"]);
        assert_eq!(registry().autocomplete("TEN"), vec!["Tenor"]);
        assert!(registry().autocomplete("xyz").is_empty());
    }

    #[test]
    fn autocomplete_caps_results() {
        let many: BTreeMap<String, String> = (0..40)
            .map(|i| (format!("model {:02}", i), format!("m{}.pth", i)))
            .collect();
        let json = serde_json::to_string(&many).unwrap();
        let registry = ModelRegistry::from_json(Path::new("/m"), &json).unwrap();

        assert_eq!(registry.autocomplete("").len(), AUTOCOMPLETE_LIMIT);
    }

    #[test]
    fn load_missing_index_is_empty() {
        let dir = TempDir::new().unwrap();
        let config = ModelsConfig {
            dir: dir.path().to_path_buf(),
            ..ModelsConfig::default()
        };
        let registry = ModelRegistry::load(&config).unwrap();
        assert!(registry.is_empty());
    }

    #[test]
    fn load_reads_index_from_models_dir() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("index.json"), INDEX).unwrap();
        let config = ModelsConfig {
            dir: dir.path().to_path_buf(),
            ..ModelsConfig::default()
        };

        let registry = ModelRegistry::load(&config).unwrap();

        assert_eq!(registry.len(), 3);
        assert_eq!(
            registry.resolve("Baritone").unwrap().path,
            dir.path().join("bari.pth")
        );
    }

    #[test]
    fn load_rejects_malformed_index() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("index.json"), "[1, 2]").unwrap();
        let config = ModelsConfig {
            dir: dir.path().to_path_buf(),
            ..ModelsConfig::default()
        };
        assert!(matches!(
            ModelRegistry::load(&config),
            Err(VoicoverError::ModelIndex { .. })
        ));
    }
}
