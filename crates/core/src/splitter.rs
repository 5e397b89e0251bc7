//! Fallback splitter — groups a file into blank-line-delimited, size-capped
//! chunks. Always available; used directly when no AST grammar covers the
//! file's language, and as the base splitter when the `treesitter` feature is
//! off entirely.

use crate::collaborators::{SplitChunk, Splitter};

const DEFAULT_CHUNK_SIZE: usize = 1500;
const MIN_CHUNK_LEN: usize = 40;

pub struct FallbackSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl Default for FallbackSplitter {
    fn default() -> Self {
        Self { chunk_size: DEFAULT_CHUNK_SIZE, chunk_overlap: 0 }
    }
}

impl FallbackSplitter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Splitter for FallbackSplitter {
    fn split(&self, code: &str, language: &str, file_path: Option<&str>) -> Vec<SplitChunk> {
        let mut chunks = Vec::new();
        let mut current = String::new();
        let mut chunk_start_line = 1usize;
        let mut line_num = 1usize;

        let flush = |chunks: &mut Vec<SplitChunk>, current: &mut String, start: usize, end: usize| {
            if current.len() >= MIN_CHUNK_LEN {
                chunks.push(SplitChunk {
                    content: current.clone(),
                    start_line: start,
                    end_line: end,
                    language: language.to_string(),
                    file_path: file_path.map(str::to_string),
                });
            }
            current.clear();
        };

        for line in code.lines() {
            let trimmed = line.trim();

            if trimmed.is_empty() && !current.trim().is_empty() {
                flush(&mut chunks, &mut current, chunk_start_line, line_num.saturating_sub(1).max(chunk_start_line));
                chunk_start_line = line_num + 1;
            } else {
                if current.len() + line.len() + 1 > self.chunk_size && !current.is_empty() {
                    flush(&mut chunks, &mut current, chunk_start_line, line_num.saturating_sub(1).max(chunk_start_line));
                    chunk_start_line = line_num;
                }
                if !current.is_empty() {
                    current.push('\n');
                }
                current.push_str(line);
            }
            line_num += 1;
        }

        flush(&mut chunks, &mut current, chunk_start_line, line_num.saturating_sub(1).max(chunk_start_line));
        chunks
    }

    fn set_chunk_size(&mut self, size: usize) {
        self.chunk_size = size;
    }

    fn set_chunk_overlap(&mut self, overlap: usize) {
        self.chunk_overlap = overlap;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_blank_lines_and_skips_tiny_fragments() {
        let splitter = FallbackSplitter::new();
        let code = "fn a() {\n    body_that_is_long_enough_to_survive_the_min_length_check();\n}\n\nfn b() {\n    another_body_that_is_long_enough_to_survive_the_check();\n}\n";
        let chunks = splitter.split(code, "rust", Some("lib.rs"));
        assert_eq!(chunks.len(), 2);
        assert!(chunks[0].content.contains("fn a"));
        assert!(chunks[1].content.contains("fn b"));
    }

    #[test]
    fn caps_chunk_size() {
        let mut splitter = FallbackSplitter::new();
        splitter.set_chunk_size(50);
        let line = "x".repeat(60);
        let code = format!("{line}\n{line}\n");
        let chunks = splitter.split(&code, "text", None);
        assert!(chunks.len() >= 2, "oversized content should split into multiple chunks");
    }

    #[test]
    fn tiny_files_produce_no_chunks() {
        let splitter = FallbackSplitter::new();
        let chunks = splitter.split("x", "text", None);
        assert!(chunks.is_empty());
    }
}
