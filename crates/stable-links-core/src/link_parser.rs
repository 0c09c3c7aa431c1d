use regex::Regex;
use std::sync::LazyLock;

// Compile regex once, reuse across calls.
// Brackets are excluded from the inner text so `[[[[Foo]]` still finds `[[Foo]]`.
// A wikilink never spans lines.
static WIKILINK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[\[([^\[\]\n\r]+)\]\]").unwrap()
});

static FENCED_CODE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```[^\n]*\n.*?```|~~~[^\n]*\n.*?~~~").unwrap()
});

static INLINE_CODE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"`[^`]*`").unwrap()
});

/// Knobs shared by matching and rewriting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanOptions {
    /// Ignore references inside fenced code blocks and inline code spans.
    pub skip_code: bool,
}

/// A single `[[...]]` group found in a document.
///
/// `target` is the raw text before the first `#` or `|`. It is not trimmed:
/// `[[ Foo ]]` has target `" Foo "`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WikilinkOccurrence {
    pub target: String,
    /// Heading or block fragment without the leading `#`, e.g. `Section` or `^abc123`.
    pub fragment: Option<String>,
    /// Display text after the first `|`.
    pub label: Option<String>,
    /// Byte offset of the opening `[[`.
    pub start: usize,
    /// Byte offset of the closing `]]`.
    pub close: usize,
}

impl WikilinkOccurrence {
    /// A bare reference has no pipe segment and may be rewritten.
    pub fn is_bare(&self) -> bool {
        self.label.is_none()
    }

    /// The text this reference displays: its label, or the target when bare.
    pub fn display_text(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.target)
    }
}

/// Split the inner text of a wikilink into (target, fragment, label).
fn split_inner(inner: &str) -> (&str, Option<&str>, Option<&str>) {
    let pipe = inner.find('|');
    let hash = inner.find('#');
    let target_end = match (hash, pipe) {
        (Some(h), Some(p)) => h.min(p),
        (Some(h), None) => h,
        (None, Some(p)) => p,
        (None, None) => inner.len(),
    };

    let fragment = match (hash, pipe) {
        (Some(h), Some(p)) if h < p => Some(&inner[h + 1..p]),
        (Some(h), None) => Some(&inner[h + 1..]),
        _ => None,
    };
    let label = pipe.map(|p| &inner[p + 1..]);

    (&inner[..target_end], fragment, label)
}

/// Build a set of byte ranges that are inside code blocks or inline code.
fn build_excluded_ranges(markdown: &str) -> Vec<(usize, usize)> {
    let mut ranges = Vec::new();
    for m in FENCED_CODE_RE.find_iter(markdown) {
        ranges.push((m.start(), m.end()));
    }
    for m in INLINE_CODE_RE.find_iter(markdown) {
        ranges.push((m.start(), m.end()));
    }
    ranges
}

/// Returns true if the byte offset falls within any excluded range.
fn is_excluded(offset: usize, excluded: &[(usize, usize)]) -> bool {
    excluded.iter().any(|&(start, end)| offset >= start && offset < end)
}

/// Extract every wikilink occurrence, in document order.
/// Blank groups like `[[ ]]` are skipped.
pub fn extract_wikilink_occurrences(markdown: &str, options: ScanOptions) -> Vec<WikilinkOccurrence> {
    let excluded = if options.skip_code {
        build_excluded_ranges(markdown)
    } else {
        Vec::new()
    };
    let mut occurrences = Vec::new();

    for cap in WIKILINK_RE.captures_iter(markdown) {
        let (Some(full_match), Some(inner_match)) = (cap.get(0), cap.get(1)) else {
            continue;
        };
        if is_excluded(full_match.start(), &excluded) {
            continue;
        }

        let inner = inner_match.as_str();
        if inner.trim().is_empty() {
            continue;
        }

        let (target, fragment, label) = split_inner(inner);
        occurrences.push(WikilinkOccurrence {
            target: target.to_string(),
            fragment: fragment.map(str::to_string),
            label: label.map(str::to_string),
            start: full_match.start(),
            close: inner_match.end(),
        });
    }

    occurrences
}

/// Cheap pre-check: can `markdown` possibly hold a reference to `target`?
pub fn may_reference(markdown: &str, target: &str) -> bool {
    markdown.contains(&format!("[[{}", target))
}

/// Occurrences whose target equals `target` exactly (case-sensitive).
pub fn references_to(markdown: &str, target: &str, options: ScanOptions) -> Vec<WikilinkOccurrence> {
    if target.is_empty() || !may_reference(markdown, target) {
        return Vec::new();
    }
    extract_wikilink_occurrences(markdown, options)
        .into_iter()
        .filter(|occ| occ.target == target)
        .collect()
}

/// A text edit: replace `remove_len` bytes at `offset` with `insert_text`.
#[derive(Debug, PartialEq, Eq)]
pub struct TextEdit {
    /// Byte offset in source
    pub offset: usize,
    /// Number of bytes to remove
    pub remove_len: usize,
    /// Replacement text
    pub insert_text: String,
}

/// For every bare reference to `target`, an edit inserting `|target` just
/// before the closing `]]`. Fragments are kept: `[[Foo#Sec]]` becomes
/// `[[Foo#Sec|Foo]]`. References that already carry a label get no edit.
/// Returns edits in reverse offset order for safe sequential application.
pub fn compute_label_edits(markdown: &str, target: &str, options: ScanOptions) -> Vec<TextEdit> {
    let mut edits: Vec<TextEdit> = references_to(markdown, target, options)
        .into_iter()
        .filter(WikilinkOccurrence::is_bare)
        .map(|occ| TextEdit {
            offset: occ.close,
            remove_len: 0,
            insert_text: format!("|{}", target),
        })
        .collect();

    edits.sort_by(|a, b| b.offset.cmp(&a.offset));
    edits
}

/// Apply edits produced by `compute_label_edits` (reverse offset order).
pub fn apply_edits(text: &mut String, edits: &[TextEdit]) {
    for edit in edits {
        text.replace_range(edit.offset..edit.offset + edit.remove_len, &edit.insert_text);
    }
}
