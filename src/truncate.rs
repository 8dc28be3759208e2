//! Truncation descriptors for oversized string content.

use serde::{Deserialize, Serialize};

pub const PREVIEW_CHARS: usize = 1000;

/// Placeholder substituted for a string leaf that exceeded the content limit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TruncationDescriptor {
    pub truncated: bool,
    /// Length of the original in characters.
    pub original_length: usize,
    /// Length of the original in UTF-8 bytes.
    pub original_size: usize,
    pub preview: String,
    pub content_hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

/// Either the original text or its truncation descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Content {
    Text(String),
    Truncated(TruncationDescriptor),
}

impl Content {
    pub fn is_truncated(&self) -> bool {
        matches!(self, Content::Truncated(_))
    }

    /// Text usable for search and display: the full text, or the preview.
    pub fn as_text(&self) -> &str {
        match self {
            Content::Text(s) => s,
            Content::Truncated(d) => &d.preview,
        }
    }
}

/// Keep `text` when it fits in `limit` characters, otherwise describe it.
pub fn sanitize(text: String, limit: usize, context: Option<&str>) -> Content {
    match truncate_if_needed(&text, limit, context) {
        Some(descriptor) => Content::Truncated(descriptor),
        None => Content::Text(text),
    }
}

pub fn truncate_if_needed(
    text: &str,
    limit: usize,
    context: Option<&str>,
) -> Option<TruncationDescriptor> {
    // Byte length bounds char count from above, so short strings skip the scan.
    if text.len() <= limit {
        return None;
    }
    let original_length = text.chars().count();
    if original_length <= limit {
        return None;
    }
    let preview: String = text.chars().take(PREVIEW_CHARS).collect();
    Some(TruncationDescriptor {
        truncated: true,
        original_length,
        original_size: text.len(),
        content_hash: rolling_hash(&preview),
        preview,
        context: context.map(str::to_string),
    })
}

/// Cheap 32-bit rolling hash (`h = h * 31 + c`) over the first
/// [`PREVIEW_CHARS`] characters. Spot-verification only.
pub fn rolling_hash(text: &str) -> String {
    let mut hash: i32 = 0;
    for unit in text.chars().take(PREVIEW_CHARS).flat_map(|c| {
        let mut buf = [0u16; 2];
        c.encode_utf16(&mut buf).to_vec()
    }) {
        hash = hash
            .wrapping_shl(5)
            .wrapping_sub(hash)
            .wrapping_add(unit as i32);
    }
    format!("{:08x}", hash as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_kept() {
        let c = sanitize("hello".to_string(), 10, None);
        assert_eq!(c, Content::Text("hello".to_string()));
    }

    #[test]
    fn long_text_described() {
        let text = "x".repeat(50_000);
        let c = sanitize(text.clone(), 10 * 1024, Some("diff"));
        let Content::Truncated(d) = c else {
            panic!("expected truncation");
        };
        assert!(d.truncated);
        assert_eq!(d.original_length, 50_000);
        assert_eq!(d.original_size, 50_000);
        assert!(d.preview.chars().count() <= PREVIEW_CHARS);
        assert!(text.starts_with(&d.preview));
        assert_eq!(d.context.as_deref(), Some("diff"));
    }

    #[test]
    fn multibyte_length_is_in_chars() {
        let text = "é".repeat(20);
        // 40 bytes but only 20 chars
        assert!(truncate_if_needed(&text, 30, None).is_none());
        let d = truncate_if_needed(&text, 10, None).unwrap();
        assert_eq!(d.original_length, 20);
        assert_eq!(d.original_size, 40);
        assert!(text.starts_with(&d.preview));
    }

    #[test]
    fn hash_is_stable_and_prefix_bounded() {
        let a = "a".repeat(2000);
        let mut b = "a".repeat(1000);
        b.push_str(&"b".repeat(1000));
        assert_eq!(rolling_hash(&a), rolling_hash(&a));
        // only the first 1000 characters contribute
        assert_eq!(rolling_hash(&a), rolling_hash(&b));
        assert_ne!(rolling_hash("abc"), rolling_hash("abd"));
        assert_eq!(rolling_hash(""), "00000000");
    }
}
