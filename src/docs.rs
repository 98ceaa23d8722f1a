//! Markdown documentation chunker.
//!
//! Splits documentation files into heading-delimited sections that share the
//! chunk storage contract with code: each section becomes a doc-section
//! chunk with the heading as its name and exact line numbers for citation.

use crate::parser::{Chunk, ChunkKind};

struct Section {
    title: Option<String>,
    start_line: u32,
    end_line: u32,
    start_byte: usize,
    end_byte: usize,
}

/// Chunk one markdown file into sections.
///
/// Sections are delimited by headings (`#` through `######`), with any text
/// before the first heading forming a preamble section. Sections larger than
/// `max_chars` are split at line boundaries; sections smaller than
/// `min_chars` are merged into the previous section. A non-empty file always
/// yields at least one chunk.
pub fn chunk_markdown(path: &str, text: &str, max_chars: usize, min_chars: usize) -> Vec<Chunk> {
    if text.trim().is_empty() {
        return Vec::new();
    }

    let sections = merge_small(split_sections(text), text, min_chars);

    let mut chunks = Vec::new();
    for section in sections {
        let section_text = &text[section.start_byte..section.end_byte];
        if section_text.len() > max_chars {
            chunks.extend(split_section(path, &section, text, max_chars));
        } else {
            chunks.push(section_chunk(path, &section, section_text));
        }
    }
    chunks
}

fn split_sections(text: &str) -> Vec<Section> {
    let mut sections: Vec<Section> = Vec::new();
    let mut in_fence = false;
    let mut byte_offset = 0usize;
    let mut line_no = 0u32;

    for line in text.split_inclusive('\n') {
        line_no += 1;
        let trimmed = line.trim_start();

        if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
            in_fence = !in_fence;
        }

        let heading = !in_fence && heading_title(trimmed).is_some();
        if heading || sections.is_empty() {
            if let Some(last) = sections.last_mut() {
                last.end_line = line_no - 1;
                last.end_byte = byte_offset;
            }
            sections.push(Section {
                title: if heading { heading_title(trimmed) } else { None },
                start_line: line_no,
                end_line: line_no,
                start_byte: byte_offset,
                end_byte: byte_offset + line.len(),
            });
        }
        byte_offset += line.len();
    }

    if let Some(last) = sections.last_mut() {
        last.end_line = line_no;
        last.end_byte = text.len();
    }
    sections
}

fn heading_title(line: &str) -> Option<String> {
    let hashes = line.chars().take_while(|&c| c == '#').count();
    if hashes == 0 || hashes > 6 {
        return None;
    }
    let rest = &line[hashes..];
    if !rest.starts_with(' ') && !rest.starts_with('\t') {
        return None;
    }
    let title = rest.trim().trim_end_matches('#').trim();
    if title.is_empty() {
        None
    } else {
        Some(title.to_string())
    }
}

fn merge_small(sections: Vec<Section>, text: &str, min_chars: usize) -> Vec<Section> {
    let mut merged: Vec<Section> = Vec::new();
    for section in sections {
        let len = section.end_byte - section.start_byte;
        let is_small = text[section.start_byte..section.end_byte].trim().len() < min_chars;
        if is_small && len > 0
            && let Some(last) = merged.last_mut()
        {
            last.end_line = section.end_line;
            last.end_byte = section.end_byte;
            continue;
        }
        merged.push(section);
    }
    merged
}

fn split_section(path: &str, section: &Section, text: &str, max_chars: usize) -> Vec<Chunk> {
    let section_text = &text[section.start_byte..section.end_byte];
    let mut parts = Vec::new();
    let mut part_start_byte = section.start_byte;
    let mut part_start_line = section.start_line;
    let mut part_len = 0usize;
    let mut line_no = section.start_line;

    for line in section_text.split_inclusive('\n') {
        if part_len > 0 && part_len + line.len() > max_chars {
            parts.push(section_chunk(
                path,
                &Section {
                    title: section.title.clone(),
                    start_line: part_start_line,
                    end_line: line_no - 1,
                    start_byte: part_start_byte,
                    end_byte: part_start_byte + part_len,
                },
                &text[part_start_byte..part_start_byte + part_len],
            ));
            part_start_byte += part_len;
            part_start_line = line_no;
            part_len = 0;
        }
        part_len += line.len();
        if line.ends_with('\n') {
            line_no += 1;
        }
    }
    if part_len > 0 {
        parts.push(section_chunk(
            path,
            &Section {
                title: section.title.clone(),
                start_line: part_start_line,
                end_line: section.end_line,
                start_byte: part_start_byte,
                end_byte: part_start_byte + part_len,
            },
            &text[part_start_byte..part_start_byte + part_len],
        ));
    }
    parts
}

fn section_chunk(path: &str, section: &Section, section_text: &str) -> Chunk {
    Chunk {
        path: path.to_string(),
        language: "markdown".to_string(),
        kind: ChunkKind::DocSection,
        name: section.title.clone(),
        start_line: section.start_line,
        end_line: section.end_line,
        start_byte: section.start_byte,
        end_byte: section.start_byte + section_text.len(),
        text: section_text.to_string(),
        doc: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = "Intro paragraph that explains the project in enough words to stand alone.\n\n\
# Install\n\nRun the installer and follow the prompts until setup completes fully.\n\n\
## Linux\n\nUse the package manager of your distribution to install the tool.\n\n\
# Usage\n\nInvoke the binary with a directory argument to index that tree.\n";

    #[test]
    fn test_sections_split_on_headings() {
        let chunks = chunk_markdown("README.md", DOC, 1000, 10);
        let titles: Vec<_> = chunks.iter().map(|c| c.name.as_deref()).collect();
        assert!(titles.contains(&None)); // preamble
        assert!(titles.contains(&Some("Install")));
        assert!(titles.contains(&Some("Linux")));
        assert!(titles.contains(&Some("Usage")));
    }

    #[test]
    fn test_chunks_are_doc_sections_with_verbatim_text() {
        let chunks = chunk_markdown("README.md", DOC, 1000, 10);
        for chunk in &chunks {
            assert_eq!(chunk.kind, ChunkKind::DocSection);
            assert_eq!(chunk.text, &DOC[chunk.start_byte..chunk.end_byte]);
        }
    }

    #[test]
    fn test_line_numbers_one_based_and_ordered() {
        let chunks = chunk_markdown("README.md", DOC, 1000, 10);
        assert_eq!(chunks[0].start_line, 1);
        for pair in chunks.windows(2) {
            assert!(pair[1].start_line > pair[0].start_line);
        }
    }

    #[test]
    fn test_small_sections_merged() {
        let doc = "# Big\n\nA section body that is comfortably longer than the merge threshold.\n\n# Tiny\n\nx\n";
        let chunks = chunk_markdown("doc.md", doc, 1000, 30);
        // Tiny section merges into Big
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].name.as_deref(), Some("Big"));
        assert!(chunks[0].text.contains("# Tiny"));
    }

    #[test]
    fn test_oversized_section_split() {
        let mut doc = String::from("# Long\n\n");
        for i in 0..100 {
            doc.push_str(&format!("Paragraph line number {i} with some padding text.\n"));
        }
        let chunks = chunk_markdown("doc.md", &doc, 500, 10);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert_eq!(chunk.name.as_deref(), Some("Long"));
            assert!(chunk.text.len() <= 600);
        }
    }

    #[test]
    fn test_heading_inside_code_fence_ignored() {
        let doc = "# Real\n\nSome body text long enough to not be merged away here.\n\n```\n# not a heading\n```\nTrailing text for the section body.\n";
        let chunks = chunk_markdown("doc.md", doc, 1000, 10);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].name.as_deref(), Some("Real"));
    }

    #[test]
    fn test_empty_file_yields_nothing() {
        assert!(chunk_markdown("doc.md", "", 1000, 10).is_empty());
        assert!(chunk_markdown("doc.md", "   \n  \n", 1000, 10).is_empty());
    }

    #[test]
    fn test_heading_title_parsing() {
        assert_eq!(heading_title("# Title"), Some("Title".to_string()));
        assert_eq!(heading_title("### Deep ##"), Some("Deep".to_string()));
        assert_eq!(heading_title("####### Too deep"), None);
        assert_eq!(heading_title("#NoSpace"), None);
        assert_eq!(heading_title("plain"), None);
    }
}
