use super::EngineError;
use std::collections::BTreeSet;
use std::path::Path;

/// The set of installed model names.
///
/// A deployment installs a model by adding a sub-directory named after it to
/// the model directory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelCatalog {
    names: BTreeSet<String>,
}

impl ModelCatalog {
    /// Lists the sub-directories of `dir`. Hidden entries and plain files are
    /// skipped.
    pub fn scan(dir: &Path) -> Result<Self, EngineError> {
        let io_err = |source| EngineError::Io {
            path: dir.to_path_buf(),
            source,
        };

        let mut names = BTreeSet::new();
        for entry in std::fs::read_dir(dir).map_err(io_err)? {
            let entry = entry.map_err(io_err)?;
            if !entry.file_type().map_err(io_err)?.is_dir() {
                continue;
            }
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            if !name.starts_with('.') {
                names.insert(name);
            }
        }
        Ok(Self { names })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for ModelCatalog {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            names: iter.into_iter().map(Into::into).collect(),
        }
    }
}
