use serde_json::Value;

/// Pull a JSON document out of an assistant reply, tolerating surrounding
/// prose and code fences. Returns `None` when nothing parseable remains.
pub fn extract_json(content: &str) -> Option<Value> {
    for block in fenced_blocks(content) {
        if let Ok(value) = serde_json::from_str::<Value>(block.trim()) {
            return Some(value);
        }
    }

    let trimmed = content.trim();
    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return Some(value);
    }

    if let Some(candidate) = bracketed_slice(trimmed, '{', '}') {
        if let Ok(value) = serde_json::from_str::<Value>(candidate) {
            return Some(value);
        }
    }
    if let Some(candidate) = bracketed_slice(trimmed, '[', ']') {
        if let Ok(value) = serde_json::from_str::<Value>(candidate) {
            return Some(value);
        }
    }
    None
}

fn fenced_blocks(content: &str) -> Vec<&str> {
    let mut blocks = Vec::new();
    let mut cursor = content;
    while let Some(open) = cursor.find("```") {
        let after_open = &cursor[open + 3..];
        // Skip the info string (e.g. `json`) up to the end of line.
        let body_start = match after_open.find('\n') {
            Some(pos) => pos + 1,
            None => break,
        };
        let body = &after_open[body_start..];
        let Some(close) = body.find("```") else {
            break;
        };
        blocks.push(&body[..close]);
        cursor = &body[close + 3..];
    }
    blocks
}

fn bracketed_slice(content: &str, open: char, close: char) -> Option<&str> {
    let start = content.find(open)?;
    let end = content.rfind(close)?;
    if end <= start {
        return None;
    }
    Some(&content[start..=end])
}
