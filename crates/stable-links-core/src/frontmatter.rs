//! Text-level edits of the YAML metadata block at the top of a note.
//!
//! Only the `aliases` field is ever touched. Every other line of the block is
//! copied through byte for byte, so key order, comments and formatting of
//! unrelated fields survive. The block body is parsed with `serde_yaml` first
//! purely as a sanity check: if it is not a mapping, or `aliases` has a shape
//! we do not understand, the note is left alone.

use serde_yaml::{Mapping, Value};
use std::borrow::Cow;

const ALIASES_KEY: &str = "aliases";
const DEFAULT_ITEM_PREFIX: &str = "  - ";

/// Result of merging one label into a note's aliases.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    /// New content with the label added.
    Updated(String),
    /// The label was already listed.
    Unchanged,
    /// The metadata block could not be understood; content must not be touched.
    Malformed(String),
}

fn strip_eol(line: &str) -> &str {
    line.trim_end_matches(|c| c == '\n' || c == '\r')
}

fn line_ending(line: &str) -> &'static str {
    if line.ends_with("\r\n") {
        "\r\n"
    } else {
        "\n"
    }
}

/// Render a label as a YAML scalar, double-quoting only when a plain scalar
/// would be read back differently.
pub fn yaml_scalar(label: &str) -> Cow<'_, str> {
    if needs_quotes(label) {
        Cow::Owned(format!(
            "\"{}\"",
            label.replace('\\', "\\\\").replace('"', "\\\"")
        ))
    } else {
        Cow::Borrowed(label)
    }
}

fn needs_quotes(label: &str) -> bool {
    const INDICATORS: &[char] = &[
        '-', '?', ':', ',', '[', ']', '{', '}', '#', '&', '*', '!', '|', '>', '\'', '"', '%', '@',
        '`',
    ];
    const RESERVED: &[&str] = &["true", "false", "yes", "no", "on", "off", "null", "~"];

    if label.is_empty() || label.trim() != label {
        return true;
    }
    if label.starts_with(INDICATORS) {
        return true;
    }
    if label.contains(": ") || label.contains(" #") || label.ends_with(':') {
        return true;
    }
    if label.contains([',', '[', ']', '{', '}', '"', '\\', '\n', '\t']) {
        return true;
    }
    if RESERVED.iter().any(|r| label.eq_ignore_ascii_case(r)) {
        return true;
    }
    // Number-like text (`0x1F`, `.inf`, `1_000`) reads back as a number in
    // some YAML dialects.
    if !label.contains(' ') && label.starts_with(|c: char| c.is_ascii_digit() || c == '.' || c == '+') {
        return true;
    }
    !matches!(serde_yaml::from_str::<Value>(label), Ok(Value::String(s)) if s == label)
}

/// Split the inside of a flow sequence on commas that are not inside quotes.
fn split_flow_entries(inner: &str) -> Result<Vec<&str>, String> {
    let mut entries = Vec::new();
    let mut quote: Option<char> = None;
    let mut start = 0;

    for (idx, ch) in inner.char_indices() {
        match (quote, ch) {
            (None, '"') | (None, '\'') => quote = Some(ch),
            (Some(q), c) if c == q => quote = None,
            (None, '[') | (None, ']') | (None, '{') | (None, '}') => {
                return Err("nested collection inside inline aliases".to_string());
            }
            (None, ',') => {
                entries.push(inner[start..idx].trim());
                start = idx + 1;
            }
            _ => {}
        }
    }
    if quote.is_some() {
        return Err("unterminated quote inside inline aliases".to_string());
    }
    entries.push(inner[start..].trim());

    Ok(entries.into_iter().filter(|e| !e.is_empty()).collect())
}

fn parse_body(body: &[&str]) -> Result<Mapping, String> {
    let joined: String = body.concat();
    if joined.trim().is_empty() {
        return Ok(Mapping::new());
    }
    match serde_yaml::from_str::<Value>(&joined) {
        Ok(Value::Mapping(map)) => Ok(map),
        Ok(Value::Null) => Ok(Mapping::new()),
        Ok(_) => Err("metadata is not a key-value mapping".to_string()),
        Err(e) => Err(format!("metadata is not valid YAML: {e}")),
    }
}

/// Index of the top-level `aliases:` line and the text after the colon.
fn find_aliases_key<'a>(body: &[&'a str]) -> Option<(usize, &'a str)> {
    body.iter().copied().enumerate().find_map(|(idx, line)| {
        let rest = strip_eol(line).strip_prefix(ALIASES_KEY)?.strip_prefix(':')?;
        if rest.is_empty() || rest.starts_with([' ', '\t']) {
            Some((idx, rest))
        } else {
            None
        }
    })
}

fn is_list_item(line: &str) -> bool {
    let trimmed = strip_eol(line).trim_start();
    trimmed == "-" || trimmed.starts_with("- ")
}

/// Whether the parsed `aliases` sequence already holds `label`, comparing
/// scalar values as YAML reads them (quotes and comments already resolved).
fn already_listed(parsed: &Mapping, label: &str) -> bool {
    let Some(Value::Sequence(items)) = parsed.get(ALIASES_KEY) else {
        return false;
    };
    items.iter().any(|item| match item {
        Value::String(s) => s == label,
        Value::Number(n) => n.to_string() == label,
        Value::Bool(b) => b.to_string() == label,
        _ => false,
    })
}

fn list_item_prefix(line: &str) -> String {
    let indent_len = line.len() - line.trim_start().len();
    format!("{}- ", &line[..indent_len])
}

/// Rebuild the text with `replace` lines starting at `at` swapped for `insert`.
fn splice(bom: &str, lines: &[&str], at: usize, replace: usize, insert: &[String]) -> String {
    let mut out = String::with_capacity(lines.iter().map(|l| l.len()).sum::<usize>() + 64);
    out.push_str(bom);
    for line in &lines[..at] {
        out.push_str(line);
    }
    for line in insert {
        out.push_str(line);
    }
    for line in &lines[at + replace..] {
        out.push_str(line);
    }
    out
}

/// Ensure `label` appears in the note's `aliases`.
///
/// - No metadata block: a new block holding only `aliases` is prepended.
/// - Block without `aliases`: a block-style list is appended to the block.
/// - Inline `aliases: [a, b]`: the label is appended inside the brackets.
/// - Block-style list: a new item follows the last existing item.
pub fn merge_alias(content: &str, label: &str) -> MergeOutcome {
    if label.contains(['\n', '\r']) {
        return MergeOutcome::Malformed("alias label spans more than one line".to_string());
    }
    let (bom, text) = match content.strip_prefix('\u{feff}') {
        Some(rest) => ("\u{feff}", rest),
        None => ("", content),
    };
    let lines: Vec<&str> = text.split_inclusive('\n').collect();
    let scalar = yaml_scalar(label);

    let has_block = lines.first().is_some_and(|l| strip_eol(l) == "---");
    if !has_block {
        let eol = if text.contains("\r\n") { "\r\n" } else { "\n" };
        return MergeOutcome::Updated(format!(
            "{bom}---{eol}{ALIASES_KEY}:{eol}{DEFAULT_ITEM_PREFIX}{scalar}{eol}---{eol}{text}"
        ));
    }

    let eol = line_ending(lines[0]);
    let Some(close) = lines
        .iter()
        .skip(1)
        .position(|l| matches!(strip_eol(l), "---" | "..."))
        .map(|idx| idx + 1)
    else {
        return MergeOutcome::Malformed("metadata block is not terminated".to_string());
    };

    let body = &lines[1..close];
    let parsed = match parse_body(body) {
        Ok(map) => map,
        Err(reason) => return MergeOutcome::Malformed(reason),
    };

    let Some((key_idx, rest)) = find_aliases_key(body) else {
        if parsed.contains_key(ALIASES_KEY) {
            return MergeOutcome::Malformed("aliases key is not written as a plain top-level key".to_string());
        }
        let insert = [
            format!("{ALIASES_KEY}:{eol}"),
            format!("{DEFAULT_ITEM_PREFIX}{scalar}{eol}"),
        ];
        return MergeOutcome::Updated(splice(bom, &lines, close, 0, &insert));
    };

    match parsed.get(ALIASES_KEY) {
        None | Some(Value::Null) | Some(Value::Sequence(_)) => {}
        Some(_) => return MergeOutcome::Malformed("aliases is not a list".to_string()),
    }

    let value = rest.trim();
    let value = if value.starts_with('#') { "" } else { value };
    // Index of the key line within `lines` (which still holds the opening `---`).
    let key_line = key_idx + 1;

    if value.is_empty() {
        let items: Vec<&str> = body[key_idx + 1..]
            .iter()
            .copied()
            .take_while(|line| is_list_item(line))
            .collect();

        let expected = match parsed.get(ALIASES_KEY) {
            Some(Value::Sequence(seq)) => seq.len(),
            _ => 0,
        };
        if items.len() != expected {
            return MergeOutcome::Malformed("aliases list has an unrecognised layout".to_string());
        }

        if already_listed(&parsed, label) {
            return MergeOutcome::Unchanged;
        }

        let prefix = items
            .last()
            .map(|last| list_item_prefix(last))
            .unwrap_or_else(|| DEFAULT_ITEM_PREFIX.to_string());
        let item_eol = items.last().map(|l| line_ending(l)).unwrap_or(eol);
        let insert = [format!("{prefix}{scalar}{item_eol}")];
        return MergeOutcome::Updated(splice(bom, &lines, key_line + 1 + items.len(), 0, &insert));
    }

    let Some(inner) = value.strip_prefix('[').and_then(|v| v.strip_suffix(']')) else {
        return MergeOutcome::Malformed("aliases is neither an inline nor a block list".to_string());
    };
    let entries = match split_flow_entries(inner) {
        Ok(entries) => entries,
        Err(reason) => return MergeOutcome::Malformed(reason),
    };
    if already_listed(&parsed, label) {
        return MergeOutcome::Unchanged;
    }

    let line = lines[key_line];
    let Some(bracket) = line.find('[') else {
        return MergeOutcome::Malformed("aliases is neither an inline nor a block list".to_string());
    };
    let mut rendered: Vec<&str> = entries;
    rendered.push(&scalar);
    let insert = [format!(
        "{}[{}]{}",
        &line[..bracket],
        rendered.join(", "),
        if line.ends_with('\n') { line_ending(line) } else { "" }
    )];
    MergeOutcome::Updated(splice(bom, &lines, key_line, 1, &insert))
}
