use scraper::ElementRef;

/// Sentinel written in place of an empty or placeholder table cell.
pub const NOT_AVAILABLE: &str = "N/A";

const NBSP_ENTITY: &str = "&nbsp;";

pub fn extract_text(node: ElementRef) -> String {
    node.text().collect::<String>()
}

/// Element text with surrounding whitespace (including U+00A0) removed.
pub fn extract_trimmed_text(node: ElementRef) -> String {
    extract_text(node).trim().to_string()
}

/// True when a cell carries no information: empty, or only the
/// non-breaking-space placeholder the upstream grid pads cells with.
pub fn is_blank_cell(text: &str) -> bool {
    let trimmed = text.trim();
    trimmed.is_empty() || trimmed == NBSP_ENTITY || trimmed.chars().all(|c| c == '\u{a0}')
}

pub fn normalize_cell(text: &str) -> String {
    if is_blank_cell(text) {
        NOT_AVAILABLE.to_string()
    } else {
        text.trim().to_string()
    }
}

/// The element children of `node` with one of the given tag names, in order.
pub fn child_elements<'a>(node: ElementRef<'a>, tags: &[&str]) -> Vec<ElementRef<'a>> {
    node.children()
        .filter_map(ElementRef::wrap)
        .filter(|child| tags.contains(&child.value().name()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_cells() {
        assert!(is_blank_cell(""));
        assert!(is_blank_cell("   "));
        assert!(is_blank_cell("&nbsp;"));
        assert!(is_blank_cell("\u{a0}"));
        assert!(!is_blank_cell("12"));
    }

    #[test]
    fn normalize_replaces_placeholders() {
        assert_eq!(normalize_cell(" 14 "), "14");
        assert_eq!(normalize_cell("&nbsp;"), NOT_AVAILABLE);
        assert_eq!(normalize_cell(""), NOT_AVAILABLE);
    }
}
