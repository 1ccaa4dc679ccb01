use std::sync::Arc;

use base64::{Engine as _, engine::general_purpose::STANDARD};

use crate::domain::filename::concat_filename;

use super::{
    attendance::RenderedDocument,
    render::{DocumentMerger, RenderError, merge_documents},
};

/// Merges caller-supplied documents in the order given.
#[derive(Clone)]
pub struct ConcatService {
    merger: Arc<dyn DocumentMerger>,
}

impl ConcatService {
    pub fn new(merger: Arc<dyn DocumentMerger>) -> Self {
        Self { merger }
    }

    pub fn concat(
        &self,
        documents: Vec<Vec<u8>>,
        filename: Option<&str>,
    ) -> Result<RenderedDocument, RenderError> {
        if documents.is_empty() {
            return Err(RenderError::validation("missing pdfs"));
        }
        if let Some(index) = documents.iter().position(Vec::is_empty) {
            return Err(RenderError::validation("empty pdf payload").at(index));
        }

        let bytes = merge_documents(self.merger.as_ref(), documents)?;
        Ok(RenderedDocument {
            filename: concat_filename(filename),
            bytes,
        })
    }

    /// Decode base64 (or `data:` URL) entries, then merge them.
    pub fn concat_encoded(
        &self,
        encoded: &[String],
        filename: Option<&str>,
    ) -> Result<RenderedDocument, RenderError> {
        if encoded.is_empty() {
            return Err(RenderError::validation("missing pdfs"));
        }
        let documents = encoded
            .iter()
            .enumerate()
            .map(|(index, entry)| decode_document(entry).map_err(|err| err.at(index)))
            .collect::<Result<Vec<_>, _>>()?;
        self.concat(documents, filename)
    }
}

/// Decode one base64 document, tolerating a `data:<mime>;base64,` prefix.
pub fn decode_document(input: &str) -> Result<Vec<u8>, RenderError> {
    let mut trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(RenderError::validation("empty pdf payload"));
    }
    if trimmed.starts_with("data:")
        && let Some(comma) = trimmed.find(',')
    {
        trimmed = &trimmed[comma + 1..];
    }

    let bytes = STANDARD
        .decode(trimmed)
        .map_err(|_| RenderError::validation("invalid base64 pdf payload"))?;
    if bytes.is_empty() {
        return Err(RenderError::validation("empty pdf payload"));
    }
    Ok(bytes)
}
