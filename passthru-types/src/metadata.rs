//! Metadata forwarded from the upload to the download response.

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

/// Characters escaped in an RFC 5987 `filename*` value.
const FILENAME_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Per-relay metadata extracted ahead of the payload bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelayMetadata {
    /// Payload length announced by the uploader, if any. Advisory.
    pub declared_length: Option<u64>,
    /// Content type of the file part, if any.
    pub content_type: Option<String>,
    /// Filename of the file part, if any.
    pub filename: Option<String>,
}

impl RelayMetadata {
    /// Render a `Content-Disposition` value marking the payload as an attachment.
    pub fn content_disposition(&self) -> String {
        let Some(name) = self.filename.as_deref().filter(|n| !n.is_empty()) else {
            return "attachment".to_string();
        };

        if name.chars().all(is_plain_filename_char) {
            return format!("attachment; filename=\"{name}\"");
        }

        let fallback: String = name
            .chars()
            .map(|c| if is_plain_filename_char(c) { c } else { '_' })
            .collect();
        format!(
            "attachment; filename=\"{fallback}\"; filename*=UTF-8''{}",
            utf8_percent_encode(name, FILENAME_ENCODE_SET)
        )
    }
}

fn is_plain_filename_char(c: char) -> bool {
    matches!(c, ' '..='~') && c != '"' && c != '\\'
}

/// Parse the text of a `size` part.
///
/// Only a non-negative decimal integer is accepted; the browser form sends
/// `-1` when it cannot tell the size, which is treated like no value.
pub fn parse_declared_length(text: &str) -> Option<u64> {
    text.parse::<u64>().ok()
}
