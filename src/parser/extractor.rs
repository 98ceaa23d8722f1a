//! Tree walk turning parsed source into chunks.

use tree_sitter::{Node, Parser};

use super::registry::{ChunkStrategy, Grammar, strategy_for};
use super::{Chunk, ChunkKind};

/// Node kinds consulted when a definition has no `name` field
const NAME_CHILD_KINDS: &[&str] = &[
    "identifier",
    "name",
    "property_identifier",
    "type_identifier",
    "field_identifier",
    "constant",
];

/// Chunk one file. Never fails and never returns an empty list for
/// non-empty input: a missing grammar or a parse failure downgrades to a
/// single whole-file fallback chunk.
pub fn chunk_file(path: &str, language: &str, text: &str, max_chars: usize) -> Vec<Chunk> {
    match strategy_for(language) {
        ChunkStrategy::Fallback => vec![fallback_chunk(path, language, text)],
        ChunkStrategy::Structural(grammar) => {
            match structural_chunks(path, language, text, &grammar, max_chars) {
                Some(chunks) if !chunks.is_empty() => chunks,
                _ => {
                    tracing::debug!(
                        "Structural parse of {} ({}) failed, using fallback chunk",
                        path,
                        language
                    );
                    vec![fallback_chunk(path, language, text)]
                }
            }
        }
    }
}

fn structural_chunks(
    path: &str,
    language: &str,
    text: &str,
    grammar: &Grammar,
    max_chars: usize,
) -> Option<Vec<Chunk>> {
    let mut parser = Parser::new();
    parser.set_language(&grammar.language).ok()?;

    let tree = parser.parse(text, None)?;
    let root = tree.root_node();
    // An error anywhere in the tree means line attribution is unreliable;
    // downgrade the whole file rather than emit half-wrong chunks.
    if root.has_error() {
        return None;
    }

    let mut chunks = Vec::new();
    extract(root, path, language, text, grammar, false, &mut chunks);

    let mut result = Vec::with_capacity(chunks.len());
    for chunk in chunks {
        if chunk.text.len() > max_chars && chunk.kind != ChunkKind::FallbackFile {
            result.extend(split_chunk(chunk, max_chars));
        } else {
            result.push(chunk);
        }
    }
    Some(result)
}

fn extract(
    node: Node,
    path: &str,
    language: &str,
    source: &str,
    grammar: &Grammar,
    inside_class: bool,
    out: &mut Vec<Chunk>,
) {
    let mut next_inside_class = inside_class;

    if let Some(rule) = grammar.rule_for(node.kind()) {
        let mut kind = rule.chunk_kind;
        if kind == ChunkKind::Function && inside_class {
            kind = ChunkKind::Method;
        }

        let start_line = node.start_position().row as u32 + 1;
        out.push(Chunk {
            path: path.to_string(),
            language: language.to_string(),
            kind,
            name: node_name(node, source),
            start_line,
            end_line: node.end_position().row as u32 + 1,
            start_byte: node.start_byte(),
            end_byte: node.end_byte(),
            text: source[node.start_byte()..node.end_byte()].to_string(),
            doc: leading_doc(source, start_line),
        });

        if rule.container && rule.chunk_kind == ChunkKind::Class {
            next_inside_class = true;
        }
    }

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        extract(
            child,
            path,
            language,
            source,
            grammar,
            next_inside_class,
            out,
        );
    }
}

/// Extract the defined name of a node: named field first, then a direct
/// identifier-like child, then the first identifier anywhere below.
fn node_name(node: Node, source: &str) -> Option<String> {
    for field in ["name", "type", "declarator"] {
        if let Some(child) = node.child_by_field_name(field) {
            if let Some(name) = identifier_text(child, source) {
                return Some(name);
            }
        }
    }

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if NAME_CHILD_KINDS.contains(&child.kind()) {
            return slice(child, source);
        }
    }

    first_identifier(node, source)
}

fn identifier_text(node: Node, source: &str) -> Option<String> {
    if NAME_CHILD_KINDS.contains(&node.kind()) {
        return slice(node, source);
    }
    first_identifier(node, source)
}

fn first_identifier(node: Node, source: &str) -> Option<String> {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if NAME_CHILD_KINDS.contains(&child.kind()) {
            return slice(child, source);
        }
        if let Some(found) = first_identifier(child, source) {
            return Some(found);
        }
    }
    None
}

fn slice(node: Node, source: &str) -> Option<String> {
    source
        .get(node.start_byte()..node.end_byte())
        .map(|s| s.to_string())
}

/// Collect the contiguous comment block directly above a definition
fn leading_doc(source: &str, start_line: u32) -> Option<String> {
    if start_line < 2 {
        return None;
    }
    let lines: Vec<&str> = source.lines().collect();
    let mut doc_lines: Vec<String> = Vec::new();

    // Walk upward from the line above the definition
    let mut idx = start_line as usize - 2;
    loop {
        let line = lines.get(idx)?.trim();
        if let Some(stripped) = strip_comment_marker(line) {
            doc_lines.push(stripped.to_string());
        } else {
            break;
        }
        if idx == 0 {
            break;
        }
        idx -= 1;
    }

    if doc_lines.is_empty() {
        return None;
    }
    doc_lines.reverse();
    let doc = doc_lines.join("\n").trim().to_string();
    if doc.is_empty() { None } else { Some(doc) }
}

fn strip_comment_marker(line: &str) -> Option<&str> {
    for marker in ["///", "//!", "//", "#", "*", "--"] {
        if let Some(rest) = line.strip_prefix(marker) {
            return Some(rest.trim_start());
        }
    }
    if let Some(rest) = line.strip_prefix("/*") {
        return Some(rest.trim_start_matches('*').trim());
    }
    None
}

/// Split an oversized chunk at line boundaries. Parts keep the kind and
/// name with part-local line and byte ranges; the doc text stays on the
/// first part only.
fn split_chunk(chunk: Chunk, max_chars: usize) -> Vec<Chunk> {
    let mut parts = Vec::new();
    let mut part_start_byte = chunk.start_byte;
    let mut part_start_line = chunk.start_line;
    let mut part_text = String::new();
    let mut line_no = chunk.start_line;

    let flush = |parts: &mut Vec<Chunk>,
                 text: &mut String,
                 start_byte: usize,
                 start_line: u32,
                 end_line: u32| {
        let trimmed_len = text.trim_end_matches('\n').len();
        if trimmed_len == 0 {
            text.clear();
            return;
        }
        parts.push(Chunk {
            path: chunk.path.clone(),
            language: chunk.language.clone(),
            kind: chunk.kind,
            name: chunk.name.clone(),
            start_line,
            end_line,
            start_byte,
            end_byte: start_byte + text.len(),
            text: std::mem::take(text),
            doc: if parts.is_empty() {
                chunk.doc.clone()
            } else {
                None
            },
        });
    };

    for line in chunk.text.split_inclusive('\n') {
        if !part_text.is_empty() && part_text.len() + line.len() > max_chars {
            let consumed = part_text.len();
            flush(
                &mut parts,
                &mut part_text,
                part_start_byte,
                part_start_line,
                line_no.saturating_sub(1),
            );
            part_start_byte += consumed;
            part_start_line = line_no;
        }
        part_text.push_str(line);
        if line.ends_with('\n') {
            line_no += 1;
        }
    }
    flush(
        &mut parts,
        &mut part_text,
        part_start_byte,
        part_start_line,
        chunk.end_line,
    );

    if parts.is_empty() { vec![chunk] } else { parts }
}

fn fallback_chunk(path: &str, language: &str, text: &str) -> Chunk {
    let line_count = text.lines().count().max(1) as u32;
    Chunk {
        path: path.to_string(),
        language: language.to_string(),
        kind: ChunkKind::FallbackFile,
        name: None,
        start_line: 1,
        end_line: line_count,
        start_byte: 0,
        end_byte: text.len(),
        text: text.to_string(),
        doc: None,
    }
}
