//! Metadata document sources for Geocat
//!
//! Turns user-supplied paths into a lazy stream of `(uri, Document)` pairs:
//!
//! ```text
//! path ──► metadata_path ──► read_documents ──► (uri, Document), ...
//!   │            │                  │
//!   │     dir/agdc-metadata.yaml    └─ one pair per YAML document; multi-document
//!   │     <name>.agdc-md.yaml          files get a `#part=N` fragment
//!   │
//!   └─ failures go to the error sink; the stream carries on with the next path
//! ```

mod read;
mod resolve;
mod stream;

use std::path::PathBuf;
use thiserror::Error;

pub use read::{read_documents, DocumentFormat, ParseError};
pub use resolve::{file_uri, metadata_path};
pub use stream::{document_stream, logged_document_stream, DocumentStream};

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("No supported metadata docs found for dataset {}", .path.display())]
    NoMetadata { path: PathBuf },
    #[error("Unsupported document type: {}", .path.display())]
    UnsupportedFormat { path: PathBuf },
    #[error("Failed reading documents from {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid YAML in {}: {source}", .path.display())]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("Invalid JSON in {}: {source}", .path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Invalid document in {}: {source}", .path.display())]
    Document {
        path: PathBuf,
        #[source]
        source: geocat_doc::DocError,
    },
    #[error("Cannot express {} as a file URI", .path.display())]
    Uri { path: PathBuf },
}
