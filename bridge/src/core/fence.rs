//! Normalization of generated content before submission.

use std::sync::LazyLock;

use regex::Regex;

const FENCE: &str = "```";

/// Fence marker with an optional language tag (```` ```csharp ````, ```` ```rust ````, ...).
static FENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"```[A-Za-z0-9_+#.\-]*").expect("fence regex should be valid"));

/// Remove decorative code-fence markers and surrounding whitespace.
///
/// Markers are removed wherever they appear. Removal repeats until no marker is
/// left, so `strip_fences(strip_fences(s)) == strip_fences(s)` for every input.
pub fn strip_fences(content: &str) -> String {
    let mut current = content.to_string();
    while current.contains(FENCE) {
        current = FENCE_RE.replace_all(&current, "").into_owned();
    }
    current.trim().to_string()
}
