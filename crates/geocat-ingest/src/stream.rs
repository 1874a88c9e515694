use geocat_doc::Document;
use std::collections::VecDeque;
use std::path::Path;

use crate::{metadata_path, read_documents, IngestError};

/// Lazy `(uri, Document)` stream over user-supplied paths.
///
/// Each path is resolved and read only when the documents before it have been
/// consumed. A path that fails is handed to the error sink and skipped.
pub struct DocumentStream<I, F> {
    paths: I,
    pending: VecDeque<(String, Document)>,
    on_error: F,
}

impl<I, P, F> Iterator for DocumentStream<I, F>
where
    I: Iterator<Item = P>,
    P: AsRef<Path>,
    F: FnMut(&Path, IngestError),
{
    type Item = (String, Document);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(doc) = self.pending.pop_front() {
                return Some(doc);
            }
            let path = self.paths.next()?;
            let path = path.as_ref();
            match metadata_path(path).and_then(|file| read_documents(&file)) {
                Ok(docs) => self.pending.extend(docs),
                Err(err) => (self.on_error)(path, err),
            }
        }
    }
}

pub fn document_stream<I, F>(paths: I, on_error: F) -> DocumentStream<I::IntoIter, F>
where
    I: IntoIterator,
    I::Item: AsRef<Path>,
    F: FnMut(&Path, IngestError),
{
    DocumentStream {
        paths: paths.into_iter(),
        pending: VecDeque::new(),
        on_error,
    }
}

/// [`document_stream`] whose error sink logs each failure.
pub fn logged_document_stream<I>(
    paths: I,
) -> DocumentStream<I::IntoIter, impl FnMut(&Path, IngestError)>
where
    I: IntoIterator,
    I::Item: AsRef<Path>,
{
    document_stream(paths, |path: &Path, err: IngestError| {
        tracing::error!(path = %path.display(), error = %err, "skipping dataset");
    })
}
