//! Chunker (§4.7): boundary-aware splitting for code files, paragraph
//! packing for text files.
//!
//! Boundary detection uses `tree-sitter` grammars for the languages already
//! pulled in elsewhere in this crate, falling back to fixed-line windowing
//! when a file's language has no grammar, fails to parse, or yields no
//! top-level boundaries — matching the two-tier structure the design calls
//! for. This generalizes the teacher's regex-only `create_semantic_chunks`
//! (`crates/mira-server/src/indexer/chunking.rs`), which only ever had one
//! tier (symbol table lookups, not a parser).

use tree_sitter::{Language, Node, Parser};

use crate::rag::types::Chunk;

const DEFAULT_OVERLAP_LINES: usize = 3;

/// Split a code file into chunks. `max_chunk_tokens` bounds chunk size the
/// same way it bounds text-file chunks (`max_chunk_tokens * 4` characters).
pub fn chunk_code(source_path: &str, content: &str, max_chunk_tokens: usize) -> Vec<Chunk> {
    let max_chars = max_chunk_tokens.saturating_mul(4).max(1);

    let boundaries = boundary_grammar(source_path).and_then(|(language, kinds)| {
        parse_boundaries(source_path, content, language, kinds)
    });

    let raw_chunks = match boundaries {
        Some(chunks) if !chunks.is_empty() => chunks,
        _ => fixed_line_windows(source_path, content, max_chars, DEFAULT_OVERLAP_LINES),
    };

    raw_chunks
        .into_iter()
        .flat_map(|chunk| {
            if chunk.content.len() > max_chars {
                split_oversize(chunk, max_chars)
            } else {
                vec![chunk]
            }
        })
        .collect()
}

/// Split a text file into paragraph-packed chunks, each up to
/// `max_chunk_tokens * 4` characters.
pub fn chunk_text(source_path: &str, content: &str, max_chunk_tokens: usize) -> Vec<Chunk> {
    let max_chars = max_chunk_tokens.saturating_mul(4).max(1);
    let mut chunks = Vec::new();

    let mut current = String::new();
    let mut current_start_line: u32 = 1;
    let mut line_no: u32 = 1;
    let mut paragraph = String::new();
    let mut paragraph_start_line = 1u32;

    let flush_paragraph = |current: &mut String, paragraph: &str| {
        if !current.is_empty() {
            current.push_str("\n\n");
        }
        current.push_str(paragraph);
    };

    for line in content.lines() {
        if line.trim().is_empty() {
            if !paragraph.is_empty() {
                if current.len() + paragraph.len() > max_chars && !current.is_empty() {
                    chunks.push(Chunk {
                        source: source_path.to_string(),
                        start_line: current_start_line,
                        end_line: line_no.saturating_sub(1),
                        content: std::mem::take(&mut current),
                    });
                    current_start_line = paragraph_start_line;
                }
                flush_paragraph(&mut current, &paragraph);
                paragraph.clear();
            }
        } else {
            if paragraph.is_empty() {
                paragraph_start_line = line_no;
            }
            if !paragraph.is_empty() {
                paragraph.push('\n');
            }
            paragraph.push_str(line);
        }
        line_no += 1;
    }

    if !paragraph.is_empty() {
        if current.len() + paragraph.len() > max_chars && !current.is_empty() {
            chunks.push(Chunk {
                source: source_path.to_string(),
                start_line: current_start_line,
                end_line: line_no.saturating_sub(1),
                content: std::mem::take(&mut current),
            });
            current_start_line = paragraph_start_line;
        }
        flush_paragraph(&mut current, &paragraph);
    }

    if !current.is_empty() {
        chunks.push(Chunk {
            source: source_path.to_string(),
            start_line: current_start_line,
            end_line: line_no.saturating_sub(1),
            content: current,
        });
    }

    chunks
}

fn boundary_grammar(source_path: &str) -> Option<(Language, &'static [&'static str])> {
    let ext = source_path.rsplit('.').next()?;
    match ext {
        "rs" => Some((
            tree_sitter_rust::LANGUAGE.into(),
            &["function_item", "impl_item", "struct_item", "enum_item", "trait_item", "mod_item"],
        )),
        "py" => Some((tree_sitter_python::LANGUAGE.into(), &["function_definition", "class_definition"])),
        "ts" => Some((
            tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
            &["function_declaration", "class_declaration", "method_definition", "export_statement"],
        )),
        "tsx" => Some((
            tree_sitter_typescript::LANGUAGE_TSX.into(),
            &["function_declaration", "class_declaration", "method_definition", "export_statement"],
        )),
        "js" | "jsx" | "mjs" => Some((
            tree_sitter_javascript::LANGUAGE.into(),
            &["function_declaration", "class_declaration", "method_definition", "export_statement"],
        )),
        "go" => Some((
            tree_sitter_go::LANGUAGE.into(),
            &["function_declaration", "method_declaration", "type_declaration"],
        )),
        _ => None,
    }
}

fn parse_boundaries(
    source_path: &str,
    content: &str,
    language: Language,
    kinds: &'static [&'static str],
) -> Option<Vec<Chunk>> {
    let mut parser = Parser::new();
    parser.set_language(&language).ok()?;
    let tree = parser.parse(content, None)?;
    let bytes = content.as_bytes();

    let mut chunks = Vec::new();
    collect_boundaries(tree.root_node(), kinds, bytes, source_path, &mut chunks);
    Some(chunks)
}

/// Walk the syntax tree collecting nodes matching `kinds`. Stops descending
/// once a boundary is found, so a top-level function's inner closures don't
/// produce their own overlapping chunks.
fn collect_boundaries(node: Node, kinds: &[&str], source: &[u8], source_path: &str, out: &mut Vec<Chunk>) {
    if kinds.contains(&node.kind()) {
        if let Ok(text) = std::str::from_utf8(&source[node.start_byte()..node.end_byte()]) {
            out.push(Chunk {
                source: source_path.to_string(),
                start_line: node.start_position().row as u32 + 1,
                end_line: node.end_position().row as u32 + 1,
                content: text.to_string(),
            });
        }
        return;
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        collect_boundaries(child, kinds, source, source_path, out);
    }
}

/// Fallback for files with no grammar or no detected boundaries: fixed-size
/// line windows with a small overlap so context isn't lost at a cut.
fn fixed_line_windows(source_path: &str, content: &str, max_chars: usize, overlap_lines: usize) -> Vec<Chunk> {
    let lines: Vec<&str> = content.lines().collect();
    if lines.is_empty() {
        return Vec::new();
    }

    let mut chunks = Vec::new();
    let mut start = 0usize;
    while start < lines.len() {
        let mut end = start;
        let mut size = 0usize;
        while end < lines.len() && (size == 0 || size + lines[end].len() + 1 <= max_chars) {
            size += lines[end].len() + 1;
            end += 1;
        }
        if end == start {
            end = start + 1;
        }
        chunks.push(Chunk {
            source: source_path.to_string(),
            start_line: start as u32 + 1,
            end_line: end as u32,
            content: lines[start..end].join("\n"),
        });
        if end >= lines.len() {
            break;
        }
        start = end.saturating_sub(overlap_lines).max(start + 1);
    }
    chunks
}

/// Recursively line-split a single oversize chunk (e.g. a very large
/// function) down to `max_chars`-sized pieces.
fn split_oversize(chunk: Chunk, max_chars: usize) -> Vec<Chunk> {
    fixed_line_windows(&chunk.source, &chunk.content, max_chars, 0)
        .into_iter()
        .map(|mut piece| {
            piece.start_line += chunk.start_line.saturating_sub(1);
            piece.end_line += chunk.start_line.saturating_sub(1);
            piece
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunks_rust_function_boundaries() {
        let content = "fn a() {\n    1\n}\n\nfn b() {\n    2\n}\n";
        let chunks = chunk_code("src/lib.rs", content, 1000);
        assert_eq!(chunks.len(), 2);
        assert!(chunks[0].content.contains("fn a"));
        assert!(chunks[1].content.contains("fn b"));
    }

    #[test]
    fn falls_back_to_line_windows_for_unknown_extension() {
        let content = (0..50).map(|i| format!("line {i}")).collect::<Vec<_>>().join("\n");
        let chunks = chunk_code("notes.xyz", &content, 10);
        assert!(chunks.len() > 1);
    }

    #[test]
    fn oversize_boundary_chunk_is_recursively_split() {
        let big_body: String = (0..500).map(|i| format!("    let x{i} = {i};\n")).collect();
        let content = format!("fn huge() {{\n{big_body}}}\n");
        let chunks = chunk_code("src/big.rs", &content, 50);
        assert!(chunks.len() > 1);
    }

    #[test]
    fn text_chunking_packs_paragraphs() {
        let content = "para one line a\npara one line b\n\npara two line a\n\npara three";
        let chunks = chunk_text("README.md", content, 1000);
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].content.contains("para one"));
        assert!(chunks[0].content.contains("para three"));
    }

    #[test]
    fn text_chunking_splits_when_over_budget() {
        let para = |n: usize| format!("paragraph {n} ").repeat(20);
        let content = format!("{}\n\n{}\n\n{}", para(1), para(2), para(3));
        let chunks = chunk_text("notes.txt", &content, 20);
        assert!(chunks.len() > 1);
    }
}
