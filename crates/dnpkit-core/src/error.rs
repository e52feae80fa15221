use std::path::PathBuf;
use thiserror::Error;

/// Errors loading dnpkit configuration.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Failed to read config at {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config at {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl Error {
    /// Get the stable error code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::ConfigRead { .. } => "CONFIG_READ_ERROR",
            Self::ConfigParse { .. } => "CONFIG_PARSE_ERROR",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes() {
        let read = Error::ConfigRead {
            path: PathBuf::from("dnpkit.json"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
        };
        assert_eq!(read.code(), "CONFIG_READ_ERROR");
        assert!(read.to_string().contains("dnpkit.json"));

        let source = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let parse = Error::ConfigParse {
            path: PathBuf::from("dnpkit.json"),
            source,
        };
        assert_eq!(parse.code(), "CONFIG_PARSE_ERROR");
    }
}
