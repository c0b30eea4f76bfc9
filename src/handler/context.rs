//! Per-operation context handed to [`PluginHandler::format_text`].
//!
//! [`PluginHandler::format_text`]: super::PluginHandler::format_text

use std::ops::Range;
use std::path::PathBuf;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::error::{PluginError, Result};
use crate::protocol::FormatTextBody;

/// Everything a format operation needs.
#[derive(Debug, Clone)]
pub struct FormatRequest<C> {
    /// Path of the file being formatted.
    pub file_path: PathBuf,
    /// Full file contents.
    pub file_text: String,
    /// Resolved configuration, overrides applied.
    pub config: Arc<C>,
    /// Byte range of `file_text` to format, or `None` for the whole file.
    pub range: Option<Range<usize>>,
    /// Cancelled when the host sends `CancelFormat` for this request.
    pub token: CancellationToken,
}

impl<C> FormatRequest<C> {
    /// Decode a `FormatText` body into a request.
    pub fn from_body(body: &FormatTextBody, config: Arc<C>, token: CancellationToken) -> Result<Self> {
        let file_path = std::str::from_utf8(&body.file_path)
            .map_err(|e| PluginError::InvalidRequest(format!("File path is not UTF-8: {e}")))?;
        let file_text = String::from_utf8(body.file_text.to_vec())
            .map_err(|e| PluginError::InvalidRequest(format!("File text is not UTF-8: {e}")))?;
        let range = translate_range(body.start_byte_index, body.end_byte_index, &file_text)?;

        Ok(Self {
            file_path: PathBuf::from(file_path),
            file_text,
            config,
            range,
            token,
        })
    }

    /// Whether the host has asked to stop this operation.
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Turn the requested byte indexes into a range of `text`.
///
/// Returns `None` when the range spans the whole text. Otherwise both ends
/// must lie within the text, in order, and on `char` boundaries.
pub fn translate_range(start: u32, end: u32, text: &str) -> Result<Option<Range<usize>>> {
    let (start, end) = (start as usize, end as usize);
    if start == 0 && end == text.len() {
        return Ok(None);
    }
    if start > end || end > text.len() {
        return Err(PluginError::InvalidRequest(format!(
            "Range {start}..{end} is outside the file text of {} bytes",
            text.len()
        )));
    }
    if !text.is_char_boundary(start) || !text.is_char_boundary(end) {
        return Err(PluginError::InvalidRequest(format!(
            "Range {start}..{end} does not fall on character boundaries"
        )));
    }
    Ok(Some(start..end))
}
