use regex::Regex;

/// Pull items out of a numbered or bulleted markdown list.
///
/// Accepts `1. text`, `1) text`, `- text`, `* text` and `• text`; bold
/// markers around a leading title are stripped. Lines that are not list
/// items are ignored.
pub fn parse_list_items(raw: &str) -> Vec<String> {
    let Ok(item_re) = Regex::new(r"^\s*(?:\d{1,2}[.)]|[-*•])\s+(.+?)\s*$") else {
        return Vec::new();
    };

    raw.lines()
        .filter_map(|line| item_re.captures(line))
        .filter_map(|caps| caps.get(1).map(|m| m.as_str().replace("**", "")))
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
        .collect()
}
