//! JSON slice extraction from raw model output.
//!
//! Models wrap JSON in prose or markdown fences; these helpers cut out a
//! parseable slice without touching its contents.

/// Extract the JSON payload for a step list: a fenced block if present,
/// else the outermost `[...]` slice, else the trimmed response.
pub fn extract_json(raw: &str) -> String {
    if let Some(block) = fenced_block(raw) {
        return block;
    }
    if let Some(slice) = outermost(raw, '[', ']') {
        return slice;
    }
    raw.trim().to_string()
}

/// Extract a single JSON object: a fenced block if present, else the
/// outermost `{...}` slice.
pub fn extract_json_object(raw: &str) -> Option<String> {
    if let Some(block) = fenced_block(raw) {
        if block.starts_with('{') {
            return Some(block);
        }
    }
    outermost(raw, '{', '}')
}

fn fenced_block(raw: &str) -> Option<String> {
    let fence = "```";
    let start = raw.find(fence)?;
    let after_fence = &raw[start + fence.len()..];
    let after_lang = after_fence.trim_start_matches(|c: char| c.is_alphanumeric() || c == '_');
    let end = after_lang.find(fence)?;
    let block = after_lang[..end].trim();
    if block.starts_with('{') || block.starts_with('[') {
        Some(block.to_string())
    } else {
        None
    }
}

fn outermost(raw: &str, open: char, close: char) -> Option<String> {
    let start = raw.find(open)?;
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escaped = false;
    for (idx, ch) in raw[start..].char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            ch if ch == open && !in_string => depth += 1,
            ch if ch == close && !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(raw[start..start + idx + ch.len_utf8()].to_string());
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn prefers_fenced_block() {
        let raw = "Here is the plan:\n```json\n[{\"type\":\"goto\"}]\n```\nDone.";
        let extracted = extract_json(raw);
        assert_eq!(extracted, "[{\"type\":\"goto\"}]");
        serde_json::from_str::<Value>(&extracted).unwrap();
    }

    #[test]
    fn falls_back_to_outermost_array() {
        let raw = "Sure! [1, [2, 3], 4] trailing text";
        assert_eq!(extract_json(raw), "[1, [2, 3], 4]");
    }

    #[test]
    fn falls_back_to_trimmed_response() {
        assert_eq!(extract_json("  not json at all  "), "not json at all");
    }

    #[test]
    fn extracts_object_with_nested_braces() {
        let raw = "verdict: {\"result\": \"PASS\", \"meta\": {\"n\": 1}} thanks";
        let extracted = extract_json_object(raw).unwrap();
        serde_json::from_str::<Value>(&extracted).unwrap();
        assert!(extracted.contains("\"meta\""));
    }

    #[test]
    fn braces_inside_strings_do_not_close_the_slice() {
        let raw = "{\"reason\": \"shows { and } inline\"}";
        let extracted = extract_json_object(raw).unwrap();
        assert_eq!(extracted, raw);
    }

    #[test]
    fn object_extraction_returns_none_without_braces() {
        assert!(extract_json_object("no braces here").is_none());
    }
}
