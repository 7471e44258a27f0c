use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::Chunk;

/// A paragraph is a chapter heading when this many leading characters
/// contain the token "chapter" (case-insensitive).
const HEADING_SCAN_CHARS: usize = 20;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoryStats {
    pub total_chapters: u32,
    pub total_paragraphs: u32,
    pub total_words: u64,
    pub total_chars: u64,
}

pub fn normalize_text(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n")
}

pub fn is_chapter_heading(paragraph: &str) -> bool {
    let head: String = paragraph.chars().take(HEADING_SCAN_CHARS).collect();
    head.to_lowercase().contains("chapter")
}

#[derive(Debug, Clone, Copy)]
struct Paragraph<'a> {
    text: &'a str,
    char_offset: u64,
    words: u32,
}

fn make_paragraph(normalized: &str, start: usize, start_char: u64, end: usize) -> Option<Paragraph<'_>> {
    let raw = &normalized[start..end];
    let text = raw.trim();
    if text.is_empty() {
        return None;
    }
    let leading = raw.len() - raw.trim_start().len();
    Some(Paragraph {
        text,
        char_offset: start_char + raw[..leading].chars().count() as u64,
        words: text.split_whitespace().count().min(u32::MAX as usize) as u32,
    })
}

/// Split on blank (whitespace-only) lines, keeping each paragraph verbatim
/// apart from surrounding whitespace.
fn split_paragraphs(normalized: &str) -> Vec<Paragraph<'_>> {
    let mut out = Vec::new();
    let mut open: Option<(usize, u64)> = None;
    let mut end_byte = 0usize;
    let mut byte_pos = 0usize;
    let mut char_pos = 0u64;

    for line in normalized.split_inclusive('\n') {
        if line.trim().is_empty() {
            if let Some((start, start_char)) = open.take() {
                out.extend(make_paragraph(normalized, start, start_char, end_byte));
            }
        } else {
            if open.is_none() {
                open = Some((byte_pos, char_pos));
            }
            end_byte = byte_pos + line.len();
        }
        byte_pos += line.len();
        char_pos += line.chars().count() as u64;
    }
    if let Some((start, start_char)) = open.take() {
        out.extend(make_paragraph(normalized, start, start_char, end_byte));
    }
    out
}

struct ChunkBuilder<'a> {
    story_id: &'a str,
    chapter: u32,
    chapter_has_content: bool,
    paragraph_index: u32,
    parts: Vec<&'a str>,
    words: u32,
    char_offset: u64,
    out: Vec<Chunk>,
}

impl<'a> ChunkBuilder<'a> {
    fn new(story_id: &'a str) -> Self {
        Self {
            story_id,
            chapter: 1,
            chapter_has_content: false,
            paragraph_index: 0,
            parts: Vec::new(),
            words: 0,
            char_offset: 0,
            out: Vec::new(),
        }
    }

    fn flush(&mut self) {
        if self.parts.is_empty() {
            return;
        }
        self.out.push(Chunk {
            chunk_id: Chunk::make_id(self.story_id, self.chapter, self.paragraph_index),
            story_id: self.story_id.to_string(),
            chapter_label: Chunk::make_chapter_label(self.chapter),
            paragraph_index: self.paragraph_index,
            text: self.parts.join("\n\n"),
            word_count: self.words,
            char_offset: self.char_offset,
        });
        self.paragraph_index += 1;
        self.parts.clear();
        self.words = 0;
    }

    fn start_chapter(&mut self) {
        self.flush();
        self.chapter += 1;
        self.paragraph_index = 0;
        self.chapter_has_content = false;
    }

    fn push(&mut self, p: Paragraph<'a>) {
        if self.parts.is_empty() {
            self.char_offset = p.char_offset;
        }
        self.parts.push(p.text);
        self.words = self.words.saturating_add(p.words);
        self.chapter_has_content = true;
    }
}

/// Split a story into chapter-aware chunks of whole paragraphs.
///
/// A pending chunk is emitted once it has reached `target_size` words, or
/// when the next paragraph would push it past `max_size`. Chunks never span
/// a chapter heading and paragraphs are never split, so a single paragraph
/// longer than `max_size` becomes one oversized chunk.
pub fn chunk_story(text: &str, story_id: &str, target_size: u32, max_size: u32) -> Vec<Chunk> {
    let normalized = normalize_text(text);
    let paragraphs = split_paragraphs(&normalized);

    let mut b = ChunkBuilder::new(story_id);
    for p in paragraphs {
        if p.words == 0 {
            continue;
        }
        if is_chapter_heading(p.text) && b.chapter_has_content {
            b.start_chapter();
        }
        if !b.parts.is_empty()
            && (b.words >= target_size || b.words.saturating_add(p.words) > max_size)
        {
            b.flush();
        }
        b.push(p);
    }
    b.flush();

    debug!(
        story_id,
        chunks = b.out.len(),
        chapters = if b.out.is_empty() { 0 } else { b.chapter },
        "chunked story"
    );
    b.out
}

pub fn story_stats(text: &str) -> StoryStats {
    let normalized = normalize_text(text);
    let paragraphs = split_paragraphs(&normalized);

    let mut chapters = 0u32;
    let mut chapter_has_content = false;
    for p in paragraphs.iter() {
        if chapters == 0 {
            chapters = 1;
        } else if is_chapter_heading(p.text) && chapter_has_content {
            chapters += 1;
            chapter_has_content = false;
        }
        chapter_has_content = true;
    }

    StoryStats {
        total_chapters: chapters,
        total_paragraphs: paragraphs.len().min(u32::MAX as usize) as u32,
        total_words: paragraphs.iter().map(|p| p.words as u64).sum(),
        total_chars: normalized.chars().count() as u64,
    }
}
