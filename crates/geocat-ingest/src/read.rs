use geocat_doc::Document;
use serde::Deserialize;
use serde_json::Value;
use std::path::Path;
use thiserror::Error;

use crate::resolve::file_uri;
use crate::IngestError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Yaml,
    Json,
}

impl DocumentFormat {
    pub(crate) const EXTENSIONS: [&'static str; 3] = ["yaml", "yml", "json"];

    /// Format of `path` by extension, if supported.
    pub fn of(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()?.to_ascii_lowercase().as_str() {
            "yaml" | "yml" => Some(Self::Yaml),
            "json" => Some(Self::Json),
            _ => None,
        }
    }

    /// Every document in `text`. JSON holds exactly one; YAML may hold several.
    pub fn parse(self, text: &str) -> Result<Vec<Value>, ParseError> {
        match self {
            Self::Json => Ok(vec![serde_json::from_str(text)?]),
            Self::Yaml => serde_yaml::Deserializer::from_str(text)
                .map(|doc| Value::deserialize(doc).map_err(ParseError::from))
                .collect(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ParseError {
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Read every document in the metadata file at `path`, each paired with its
/// URI. Documents of a multi-document file are addressed as `uri#part=N`.
pub fn read_documents(path: &Path) -> Result<Vec<(String, Document)>, IngestError> {
    let format = DocumentFormat::of(path).ok_or_else(|| IngestError::UnsupportedFormat {
        path: path.to_path_buf(),
    })?;
    let text = std::fs::read_to_string(path).map_err(|source| IngestError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let values = format.parse(&text).map_err(|err| match err {
        ParseError::Yaml(source) => IngestError::Yaml {
            path: path.to_path_buf(),
            source,
        },
        ParseError::Json(source) => IngestError::Json {
            path: path.to_path_buf(),
            source,
        },
    })?;

    let uri = file_uri(path)?;
    let several = values.len() > 1;
    values
        .into_iter()
        .enumerate()
        .map(|(part, value)| {
            let doc = Document::from_value(value).map_err(|source| IngestError::Document {
                path: path.to_path_buf(),
                source,
            })?;
            let uri = if several {
                format!("{uri}#part={part}")
            } else {
                uri.clone()
            };
            Ok((uri, doc))
        })
        .collect()
}
