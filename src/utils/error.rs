use thiserror::Error;

#[derive(Error, Debug)]
pub enum FtwError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Season table error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("Invalid coordinates '{input}': {reason}")]
    InvalidCoordinates { input: String, reason: String },

    #[error("Unsupported coordinate reference system: {crs}")]
    UnsupportedCrs { crs: String },

    #[error("Invalid date '{value}': expected YYYY-MM-DD")]
    InvalidDate { value: String },

    #[error("Missing required input: {field}")]
    MissingInput { field: String },

    #[error("Invalid raster '{path}': {reason}")]
    InvalidRaster { path: String, reason: String },

    #[error("Configuration error in '{field}': {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Invalid value '{value}' for '{field}': {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Conda not found: {message}")]
    CondaNotFound { message: String },

    #[error("Failed to download model '{model}': {message}")]
    ModelDownload { model: String, message: String },

    #[error("Unknown model: {name}")]
    UnknownModel { name: String },

    #[error("Catalog error: {message}")]
    CatalogError { message: String },

    #[error("Could not find suitable images for window {window} ({start} to {end}) even with {max_cloud}% cloud cover")]
    NoImageFound {
        window: char,
        start: String,
        end: String,
        max_cloud: u8,
    },

    #[error("{context} failed:\n{message}")]
    Subprocess {
        context: String,
        exit_code: Option<i32>,
        message: String,
    },

    #[error("Output file not found: {path}")]
    MissingOutput { path: String },

    #[error("Another job is already running: {running}")]
    Busy { running: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Input,
    Environment,
    RemoteData,
    Subprocess,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl FtwError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            FtwError::InvalidCoordinates { .. }
            | FtwError::UnsupportedCrs { .. }
            | FtwError::InvalidDate { .. }
            | FtwError::MissingInput { .. }
            | FtwError::InvalidRaster { .. }
            | FtwError::ConfigValidationError { .. }
            | FtwError::InvalidConfigValueError { .. }
            | FtwError::UnknownModel { .. }
            | FtwError::Busy { .. } => ErrorCategory::Input,
            FtwError::CondaNotFound { .. } | FtwError::ModelDownload { .. } => {
                ErrorCategory::Environment
            }
            FtwError::HttpError(_)
            | FtwError::CatalogError { .. }
            | FtwError::NoImageFound { .. } => ErrorCategory::RemoteData,
            FtwError::Subprocess { .. } | FtwError::MissingOutput { .. } => {
                ErrorCategory::Subprocess
            }
            FtwError::IoError(_) | FtwError::SerializationError(_) | FtwError::CsvError(_) => {
                ErrorCategory::System
            }
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self.category() {
            ErrorCategory::Input => ErrorSeverity::High,
            ErrorCategory::RemoteData => ErrorSeverity::Medium,
            ErrorCategory::Environment | ErrorCategory::Subprocess => ErrorSeverity::High,
            ErrorCategory::System => ErrorSeverity::Critical,
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            FtwError::InvalidCoordinates { .. } => {
                "Use the form 'lon,lat; lon,lat [EPSG:4326]' with the top-left corner first"
            }
            FtwError::UnsupportedCrs { .. } => {
                "Use EPSG:4326, EPSG:3857 or a UTM zone (EPSG:326xx / EPSG:327xx)"
            }
            FtwError::InvalidDate { .. } => "Dates must be written as YYYY-MM-DD",
            FtwError::MissingInput { .. } => "Provide the missing argument and run again",
            FtwError::InvalidRaster { .. } => {
                "Select an 8-band raster produced by the download command"
            }
            FtwError::ConfigValidationError { .. } | FtwError::InvalidConfigValueError { .. } => {
                "Check the configuration file and command-line values"
            }
            FtwError::CondaNotFound { .. } => {
                "Install Miniconda or run 'ftw-runner settings set --conda-path <path>'"
            }
            FtwError::ModelDownload { .. } => {
                "Check your network connection or pass a local checkpoint with --checkpoint"
            }
            FtwError::UnknownModel { .. } => "Run 'ftw-runner models' to list the known models",
            FtwError::HttpError(_) | FtwError::CatalogError { .. } => {
                "Check your network connection and the catalog URL"
            }
            FtwError::NoImageFound { .. } => {
                "Widen the season dates or choose a different region"
            }
            FtwError::Subprocess { .. } => {
                "Inspect the error output above; re-run 'ftw-runner setup' if the environment is broken"
            }
            FtwError::MissingOutput { .. } => {
                "Check the output directory permissions and disk space"
            }
            FtwError::Busy { .. } => "Wait for the running job to finish",
            FtwError::IoError(_)
            | FtwError::SerializationError(_)
            | FtwError::CsvError(_) => "Check file paths and permissions",
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self.category() {
            ErrorCategory::Input => format!("Invalid input: {}", self),
            ErrorCategory::Environment => format!("Environment problem: {}", self),
            ErrorCategory::RemoteData => format!("Imagery catalog problem: {}", self),
            ErrorCategory::Subprocess => self.to_string(),
            ErrorCategory::System => format!("System error: {}", self),
        }
    }
}

pub type Result<T> = std::result::Result<T, FtwError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categories_follow_taxonomy() {
        let input = FtwError::InvalidCoordinates {
            input: "1,2".to_string(),
            reason: "missing ';'".to_string(),
        };
        assert_eq!(input.category(), ErrorCategory::Input);

        let remote = FtwError::NoImageFound {
            window: 'A',
            start: "2024-05-17".to_string(),
            end: "2024-06-16".to_string(),
            max_cloud: 100,
        };
        assert_eq!(remote.category(), ErrorCategory::RemoteData);
        assert!(remote.to_string().contains("window A"));

        let subprocess = FtwError::Subprocess {
            context: "Process".to_string(),
            exit_code: Some(1),
            message: "boom".to_string(),
        };
        assert_eq!(subprocess.category(), ErrorCategory::Subprocess);
        assert!(subprocess.user_friendly_message().contains("boom"));
    }
}
