//! Google-style docstring parsing.
//!
//! Only what schema generation needs is modelled: the short and long
//! descriptions, plus one [`DocstringParam`] per entry of the argument and
//! attribute sections. The other sections are parsed just far enough to be
//! validated and to bound their neighbours.

use crate::error::{Result, SchemaError};
use crate::python::cleandoc;

// ---------------------------------------------------------------------------
// Parsed model
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Docstring {
    pub short_description: Option<String>,
    pub long_description: Option<String>,
    pub params: Vec<DocstringParam>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DocstringParam {
    pub arg_name: String,
    /// Raw hint text from `name (type)`, with any optional marker removed.
    pub type_name: Option<String>,
    pub description: String,
    /// `Some(true)` for `(type, optional)` / `(type?)`, `Some(false)` for a
    /// plain `(type)`, `None` when the entry carries no type at all.
    pub is_optional: Option<bool>,
    /// Value of a trailing `Defaults to <value>.` on the first description line.
    pub default: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SectionKind {
    /// One entry per indented `name (type): description` line.
    Params,
    /// Indented `thing: description` entries that are validated but not kept.
    Multiple,
    /// Free text (examples, returns).
    Singular,
}

fn section_kind(title: &str) -> Option<SectionKind> {
    match title {
        "Arguments" | "Args" | "Parameters" | "Params" | "Attributes" => Some(SectionKind::Params),
        "Raises" | "Exceptions" | "Except" => Some(SectionKind::Multiple),
        "Example" | "Examples" | "Returns" | "Yields" => Some(SectionKind::Singular),
        _ => None,
    }
}

/// Lowercased header lines the "Args: None" repair treats as "no content follows".
const SECTION_HEADERS: &[&str] = &[
    "args:",
    "arguments:",
    "parameters:",
    "attributes:",
    "examples:",
    "example:",
    "methods:",
    "note:",
    "notes:",
    "raises:",
    "exceptions:",
    "return:",
    "returns:",
    "yields:",
    "yield:",
    "warns:",
    "warnings:",
    "see also:",
];

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

/// A section title line: byte range of the line and the title text.
struct Title<'a> {
    start: usize,
    end: usize,
    name: &'a str,
}

fn find_titles(text: &str) -> Vec<Title<'_>> {
    let mut titles = Vec::new();
    let mut offset = 0;
    for line in text.split('\n') {
        let start = offset;
        offset += line.len() + 1;

        let trimmed = line.trim_end_matches([' ', '\t', '\r', '\x0c', '\x0b']);
        let Some(name) = trimmed.strip_suffix(':') else {
            continue;
        };
        if section_kind(name).is_some() {
            titles.push(Title {
                start,
                end: start + line.len(),
                name,
            });
        }
    }
    titles
}

/// Parse a Google-style docstring. Fails on malformed sections, e.g. an
/// `Args:` section with no indented entries or an entry without a colon.
pub fn parse(text: &str) -> Result<Docstring> {
    let mut doc = Docstring::default();
    if text.is_empty() {
        return Ok(doc);
    }
    let text = cleandoc(text);
    let titles = find_titles(&text);

    let desc_chunk = titles.first().map_or(text.as_str(), |t| &text[..t.start]);
    let (short, long) = desc_chunk.split_once('\n').unwrap_or((desc_chunk, ""));
    doc.short_description = Some(short.to_string()).filter(|s| !s.is_empty());
    doc.long_description = Some(long.trim().to_string()).filter(|s| !s.is_empty());

    // A repeated title keeps its first position but takes the later body.
    let mut chunks: Vec<(&str, &str)> = Vec::new();
    for (i, title) in titles.iter().enumerate() {
        let end = titles.get(i + 1).map_or(text.len(), |next| next.start);
        let mut body = text.get(title.end..end).unwrap_or("");
        // Anything from the first unindented line on is not part of the section.
        if let Some(cut) = unindented_line(body) {
            body = &body[..cut];
        }
        let body = body.trim_matches('\n');
        match chunks.iter_mut().find(|(name, _)| *name == title.name) {
            Some(existing) => existing.1 = body,
            None => chunks.push((title.name, body)),
        }
    }

    for (title, chunk) in chunks {
        let Some(kind) = section_kind(title) else {
            continue;
        };
        if kind == SectionKind::Singular {
            continue;
        }

        let indent_len = chunk.len() - chunk.trim_start().len();
        let indent = &chunk[..indent_len];
        let starts = entry_starts(chunk, indent);
        if starts.is_empty() {
            return Err(SchemaError::DocstringError(format!(
                "no specification for \"{title}\": \"{chunk}\""
            )));
        }

        for (i, &start) in starts.iter().enumerate() {
            let end = starts
                .get(i + 1)
                .map_or(chunk.len(), |&next| next - indent.len());
            let part = chunk[start..end].trim_matches('\n');
            let entry = build_entry(part)?;
            if kind == SectionKind::Params {
                doc.params.push(entry);
            }
        }
    }

    Ok(doc)
}

/// Byte offset of the first `\n` followed by a non-whitespace character.
fn unindented_line(body: &str) -> Option<usize> {
    body.match_indices('\n')
        .map(|(i, _)| i)
        .find(|&i| body[i + 1..].chars().next().is_some_and(|c| !c.is_whitespace()))
}

/// Offsets just past `indent` on every line that has exactly that indent
/// followed by non-whitespace.
fn entry_starts(chunk: &str, indent: &str) -> Vec<usize> {
    let mut starts = Vec::new();
    let mut offset = 0;
    for line in chunk.split('\n') {
        if let Some(rest) = line.strip_prefix(indent)
            && rest.chars().next().is_some_and(|c| !c.is_whitespace())
        {
            starts.push(offset + indent.len());
        }
        offset += line.len() + 1;
    }
    starts
}

fn build_entry(part: &str) -> Result<DocstringParam> {
    let Some((before, desc)) = part.split_once(':') else {
        return Err(SchemaError::DocstringError(format!(
            "expected a colon in {part:?}"
        )));
    };

    let desc = desc.strip_prefix(' ').unwrap_or(desc);
    let description = match desc.split_once('\n') {
        Some((first, rest)) => format!("{first}\n{}", cleandoc(rest)),
        None => desc.to_string(),
    };
    let description = description.trim_matches('\n').to_string();

    let (arg_name, type_name, is_optional) = match split_typed_name(before) {
        Some((name, ty)) => {
            if let Some(ty) = ty.strip_suffix(", optional") {
                (name, Some(ty.to_string()), Some(true))
            } else if let Some(ty) = ty.strip_suffix('?') {
                (name, Some(ty.to_string()), Some(true))
            } else {
                (name, Some(ty.to_string()), Some(false))
            }
        }
        None => (before.to_string(), None, None),
    };

    let default = default_value(&description);
    Ok(DocstringParam {
        arg_name,
        type_name,
        description,
        is_optional,
        default,
    })
}

/// `name (type)` → (`name`, `type`). The name ends at the first `(`, the type
/// at the last `)`.
fn split_typed_name(before: &str) -> Option<(String, &str)> {
    let text = before.split('\n').next().unwrap_or("").trim_start();
    for (open, _) in text.match_indices('(').filter(|(i, _)| *i > 0) {
        let rest = &text[open + 1..];
        let Some(close) = rest.rfind(')') else {
            return None;
        };
        let ty = rest[..close].trim();
        if !ty.is_empty() {
            return Some((text[..open].trim_end().to_string(), ty));
        }
    }
    None
}

/// `... Defaults to <value>.` on the first line of a description.
fn default_value(description: &str) -> Option<String> {
    const MARKER: &str = ". Defaults to ";
    let line = description.split('\n').next()?;
    line.rmatch_indices(MARKER).find_map(|(at, _)| {
        let rest = &line[at + MARKER.len()..];
        match rest.rfind('.') {
            Some(dot) if dot > 0 => Some(rest[..dot].to_string()),
            _ => None,
        }
    })
}

// ---------------------------------------------------------------------------
// Tolerant entry point
// ---------------------------------------------------------------------------

/// Parse a docstring without ever failing.
///
/// An `Args:` header followed by nothing, by another section header, or by a
/// bare `None` line is removed first (together with the `None` line).
/// If the repaired text still fails to parse the original is tried, and if
/// that fails too the result is an empty docstring.
pub fn safe_parse_docstring(text: &str) -> Docstring {
    if text.is_empty() {
        return Docstring::default();
    }

    let repaired = drop_empty_args_sections(text);
    parse(&repaired)
        .or_else(|err| {
            tracing::debug!(error = %err, "Repaired docstring failed to parse, retrying original");
            parse(text)
        })
        .unwrap_or_else(|err| {
            tracing::debug!(error = %err, "Docstring could not be parsed");
            Docstring::default()
        })
}

fn drop_empty_args_sections(text: &str) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let mut kept: Vec<&str> = Vec::with_capacity(lines.len());

    let mut i = 0;
    while i < lines.len() {
        let line = lines[i];
        if !line.trim().eq_ignore_ascii_case("args:") {
            kept.push(line);
            i += 1;
            continue;
        }

        let next = (i + 1..lines.len()).find(|&j| !lines[j].trim().is_empty());
        let has_content = next.is_some_and(|j| {
            let next_line = lines[j];
            let next_lower = next_line.trim().to_lowercase();
            (next_line.len() > line.len() || !SECTION_HEADERS.contains(&next_lower.as_str()))
                && next_lower != "none"
        });

        if has_content {
            kept.push(line);
        } else if let Some(j) = next
            && lines[j].trim().eq_ignore_ascii_case("none")
        {
            i = j;
        }
        i += 1;
    }

    kept.join("\n")
}
