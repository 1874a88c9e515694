use std::path::{Path, PathBuf};
use url::Url;

use crate::read::DocumentFormat;
use crate::IngestError;

const DIRECTORY_STEM: &str = "agdc-metadata";
const SIBLING_SUFFIX: &str = ".agdc-md";

/// The metadata file describing the dataset at `path`.
///
/// - a readable metadata file is its own description
/// - a directory is described by `agdc-metadata.{yaml,yml,json}` inside it
/// - any other file by a sibling `<file name>.agdc-md.{yaml,yml,json}`
pub fn metadata_path(path: &Path) -> Result<PathBuf, IngestError> {
    if path.is_dir() {
        return find_with_extension(&path.join(DIRECTORY_STEM))
            .ok_or_else(|| IngestError::NoMetadata { path: path.to_path_buf() });
    }

    if path.is_file() && DocumentFormat::of(path).is_some() {
        return Ok(path.to_path_buf());
    }

    let Some(name) = path.file_name() else {
        return Err(IngestError::NoMetadata { path: path.to_path_buf() });
    };
    let mut sibling = name.to_os_string();
    sibling.push(SIBLING_SUFFIX);
    find_with_extension(&path.with_file_name(sibling))
        .ok_or_else(|| IngestError::NoMetadata { path: path.to_path_buf() })
}

fn find_with_extension(base: &Path) -> Option<PathBuf> {
    DocumentFormat::EXTENSIONS.iter().find_map(|ext| {
        let mut candidate = base.as_os_str().to_os_string();
        candidate.push(".");
        candidate.push(ext);
        let candidate = PathBuf::from(candidate);
        candidate.is_file().then_some(candidate)
    })
}

/// `file://` URI of `path`, made absolute first.
pub fn file_uri(path: &Path) -> Result<String, IngestError> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map_err(|source| IngestError::Io {
                path: path.to_path_buf(),
                source,
            })?
            .join(path)
    };
    Url::from_file_path(&absolute)
        .map(String::from)
        .map_err(|()| IngestError::Uri { path: absolute })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn directory_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let err = metadata_path(dir.path()).unwrap_err();
        assert!(matches!(err, IngestError::NoMetadata { .. }));

        fs::write(dir.path().join("agdc-metadata.yml"), "id: x\n").unwrap();
        assert_eq!(
            metadata_path(dir.path()).unwrap(),
            dir.path().join("agdc-metadata.yml")
        );
    }

    #[test]
    fn sibling_metadata_for_data_files() {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("scene.tif");
        fs::write(&data, b"raster").unwrap();
        assert!(metadata_path(&data).is_err());

        fs::write(dir.path().join("scene.tif.agdc-md.yaml"), "id: x\n").unwrap();
        assert_eq!(
            metadata_path(&data).unwrap(),
            dir.path().join("scene.tif.agdc-md.yaml")
        );
    }

    #[test]
    fn metadata_files_describe_themselves() {
        let dir = tempfile::tempdir().unwrap();
        let doc = dir.path().join("ds.json");
        fs::write(&doc, "{}").unwrap();
        assert_eq!(metadata_path(&doc).unwrap(), doc);
    }

    #[test]
    fn uris_are_absolute() {
        let uri = file_uri(Path::new("/data/ds/agdc-metadata.yaml")).unwrap();
        assert_eq!(uri, "file:///data/ds/agdc-metadata.yaml");
        assert!(file_uri(Path::new("relative.yaml")).unwrap().starts_with("file:///"));
    }
}
