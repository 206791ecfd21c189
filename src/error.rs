use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, ProjectTreeError>;

/// Errors surfaced by the tree engine and its collaborators.
///
/// Expected conditions (an empty directory, an ignored file, a stale cache)
/// are never reported through this type.
#[derive(Debug, thiserror::Error)]
pub enum ProjectTreeError {
    #[error("IO error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("No tree entry for {}", .0.display())]
    NotFound(PathBuf),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Git error: {0}")]
    Git(String),

    #[error("Watcher error: {0}")]
    Watcher(#[from] notify::Error),

    #[error("Config error: {0}")]
    Config(#[from] serde_json::Error),

    #[error("Error: {0}")]
    Generic(String),
}

impl ProjectTreeError {
    /// Wrap an IO failure together with the path it happened on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ProjectTreeError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn is_io(&self) -> bool {
        matches!(self, ProjectTreeError::Io { .. })
    }
}

impl From<std::io::Error> for ProjectTreeError {
    fn from(error: std::io::Error) -> Self {
        ProjectTreeError::Io {
            path: PathBuf::new(),
            source: error,
        }
    }
}

impl From<String> for ProjectTreeError {
    fn from(error: String) -> Self {
        ProjectTreeError::Generic(error)
    }
}

impl From<&str> for ProjectTreeError {
    fn from(error: &str) -> Self {
        ProjectTreeError::Generic(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_io_error_carries_path() {
        let err = ProjectTreeError::io(
            "/project/src",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(err.is_io());
        assert!(err.to_string().contains("/project/src"));
        assert_matches!(err, ProjectTreeError::Io { ref path, .. } if path == &PathBuf::from("/project/src"));
    }

    #[test]
    fn test_string_conversions() {
        let err: ProjectTreeError = "boom".into();
        assert_matches!(err, ProjectTreeError::Generic(ref msg) if msg == "boom");

        let err: ProjectTreeError = String::from("bang").into();
        assert_eq!(err.to_string(), "Error: bang");
    }

    #[test]
    fn test_config_error_from_serde() {
        let parse = serde_json::from_str::<serde_json::Value>("{not json");
        let err: ProjectTreeError = parse.unwrap_err().into();
        assert_matches!(err, ProjectTreeError::Config(_));
    }
}
