use serde::de::DeserializeOwned;

/// Deserialize the first JSON value of type `T` found in model output.
///
/// Model output may be bare JSON, wrapped in a fenced code block, or
/// surrounded by prose.
pub fn parse_embedded<T: DeserializeOwned>(raw: &str) -> Option<T> {
    let json_str = extract_json(raw)?;
    match serde_json::from_str::<T>(&json_str) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::debug!("Failed to parse embedded JSON: {}", e);
            None
        }
    }
}

/// Extract a JSON object or array from a string that might contain markdown code blocks
pub fn extract_json(s: &str) -> Option<String> {
    let trimmed = s.trim();

    // First try: the whole string is valid JSON
    if (trimmed.starts_with('{') || trimmed.starts_with('['))
        && serde_json::from_str::<serde_json::Value>(trimmed).is_ok()
    {
        return Some(trimmed.to_string());
    }

    // Second try: extract from markdown code block
    let re = regex::Regex::new(r"```(?:json)?\s*\n?([\s\S]*?)\n?```").ok()?;
    for cap in re.captures_iter(s) {
        let potential_json = cap.get(1)?.as_str().trim();
        if serde_json::from_str::<serde_json::Value>(potential_json).is_ok() {
            return Some(potential_json.to_string());
        }
    }

    // Third try: first balanced object, then first balanced array
    balanced(s, '{', '}').or_else(|| balanced(s, '[', ']'))
}

fn balanced(s: &str, open: char, close: char) -> Option<String> {
    let start = s.find(open)?;
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in s[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            c if c == open => depth += 1,
            c if c == close => {
                depth -= 1;
                if depth == 0 {
                    let candidate = &s[start..start + i + c.len_utf8()];
                    return serde_json::from_str::<serde_json::Value>(candidate)
                        .ok()
                        .map(|_| candidate.to_string());
                }
            }
            _ => {}
        }
    }

    None
}
