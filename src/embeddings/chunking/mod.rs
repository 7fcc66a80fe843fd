
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::loaders::Document;

/// A chunk of a document, the unit that gets embedded and retrieved
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub id: String,
    pub document_id: String,
    pub text: String,
    /// Path of the source file, copied from the document metadata
    pub file_path: String,
    pub extension: String,
    /// Position of this node within its document
    pub chunk_index: usize,
    /// Estimated token count
    pub token_count: usize,
}

/// Configuration for node splitting
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Target chunk size in tokens
    pub target_chunk_size: usize,
    /// Maximum chunk size in tokens before forced splitting
    pub max_chunk_size: usize,
    /// Minimum chunk size in tokens (smaller chunks will be merged)
    pub min_chunk_size: usize,
    /// Overlap size in tokens between adjacent chunks
    pub overlap_size: usize,
    /// Whether an oversized line is broken at sentence boundaries before falling back to words
    pub sentence_boundary_splitting: bool,
}

impl Default for ChunkingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            target_chunk_size: 650,
            max_chunk_size: 1000,
            min_chunk_size: 100,
            overlap_size: 50,
            sentence_boundary_splitting: true,
        }
    }
}

/// Split every document into nodes, preserving document order
#[inline]
pub fn chunk_documents(documents: &[Document], config: &ChunkingConfig) -> Vec<Node> {
    let nodes: Vec<Node> = documents
        .iter()
        .flat_map(|doc| chunk_document(doc, config))
        .collect();

    debug!(
        "Split {} documents into {} nodes (avg {} tokens)",
        documents.len(),
        nodes.len(),
        nodes.iter().map(|n| n.token_count).sum::<usize>() / nodes.len().max(1)
    );

    nodes
}

/// Split a single document into nodes
#[inline]
pub fn chunk_document(document: &Document, config: &ChunkingConfig) -> Vec<Node> {
    let text = &document.text;
    if text.trim().is_empty() {
        return Vec::new();
    }

    let splits = if estimate_token_count(text) <= config.target_chunk_size {
        vec![text.trim().to_string()]
    } else {
        split_by_blocks(text, config)
    };

    let nodes = splits
        .into_iter()
        .filter(|split| !split.trim().is_empty())
        .map(|split| Node {
            id: Uuid::new_v4().to_string(),
            document_id: document.id.clone(),
            token_count: estimate_token_count(&split),
            text: split,
            file_path: document.metadata.file_path.clone(),
            extension: document.metadata.extension.clone(),
            chunk_index: 0,
        })
        .collect();

    post_process_nodes(nodes, config)
}

/// Split on blank-line separated blocks, falling back to lines for oversized blocks
fn split_by_blocks(content: &str, config: &ChunkingConfig) -> Vec<String> {
    let mut splits = Vec::new();
    let mut current = Accumulator::default();

    for block in content.split("\n\n") {
        if block.trim().is_empty() {
            continue;
        }

        let block_tokens = estimate_token_count(block);

        if block_tokens > config.max_chunk_size {
            for piece in split_by_lines(block, config) {
                current.push(&piece, "\n\n", config.target_chunk_size, &mut splits);
            }
        } else {
            current.push(block, "\n\n", config.target_chunk_size, &mut splits);
        }
    }

    current.finish(&mut splits);
    splits
}

/// Split on line boundaries so that code and log lines are never cut
fn split_by_lines(content: &str, config: &ChunkingConfig) -> Vec<String> {
    let mut splits = Vec::new();
    let mut current = Accumulator::default();

    for line in content.lines() {
        if estimate_token_count(line) > config.max_chunk_size {
            current.finish(&mut splits);
            if config.sentence_boundary_splitting {
                splits.extend(split_by_sentences(line, config));
            } else {
                splits.extend(split_by_words(line, config));
            }
            continue;
        }

        current.push(line, "\n", config.target_chunk_size, &mut splits);
    }

    current.finish(&mut splits);
    splits
}

/// Split text by sentences
fn split_by_sentences(text: &str, config: &ChunkingConfig) -> Vec<String> {
    let mut splits = Vec::new();
    let mut current = Accumulator::default();

    let sentences = text
        .split_inclusive(['.', '!', '?'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>();

    for sentence in sentences {
        if estimate_token_count(sentence) > config.max_chunk_size {
            current.finish(&mut splits);
            splits.extend(split_by_words(sentence, config));
            continue;
        }
        current.push(sentence, " ", config.target_chunk_size, &mut splits);
    }

    current.finish(&mut splits);
    splits
}

/// Split text by words as a last resort
fn split_by_words(text: &str, config: &ChunkingConfig) -> Vec<String> {
    let mut splits = Vec::new();
    let mut current = Accumulator::default();

    for word in text.split_whitespace() {
        current.push(word, " ", config.target_chunk_size, &mut splits);
    }

    current.finish(&mut splits);
    splits
}

/// Greedy accumulator that flushes once the next piece would overflow the target size
#[derive(Default)]
struct Accumulator {
    text: String,
    tokens: usize,
}

impl Accumulator {
    fn push(&mut self, piece: &str, separator: &str, target: usize, splits: &mut Vec<String>) {
        let piece_tokens = estimate_token_count(piece);
        if self.tokens + piece_tokens > target && !self.text.trim().is_empty() {
            self.finish(splits);
        }

        if !self.text.is_empty() {
            self.text.push_str(separator);
        }
        self.text.push_str(piece);
        self.tokens += piece_tokens;
    }

    fn finish(&mut self, splits: &mut Vec<String>) {
        if !self.text.trim().is_empty() {
            splits.push(self.text.trim().to_string());
        }
        self.text.clear();
        self.tokens = 0;
    }
}

/// Merge undersized nodes, add overlap and renumber
fn post_process_nodes(nodes: Vec<Node>, config: &ChunkingConfig) -> Vec<Node> {
    if nodes.is_empty() {
        return nodes;
    }

    let mut processed: Vec<Node> = Vec::with_capacity(nodes.len());
    let mut pending_merge: Option<Node> = None;

    for node in nodes {
        if let Some(mut pending) = pending_merge.take() {
            if pending.token_count + node.token_count <= config.max_chunk_size {
                pending.text.push_str("\n\n");
                pending.text.push_str(&node.text);
                pending.token_count += node.token_count;
                if pending.token_count < config.min_chunk_size {
                    pending_merge = Some(pending);
                } else {
                    processed.push(pending);
                }
                continue;
            }
            processed.push(pending);
        }

        if node.token_count < config.min_chunk_size {
            pending_merge = Some(node);
        } else {
            processed.push(node);
        }
    }

    if let Some(pending) = pending_merge {
        // A trailing runt folds into its predecessor when there is room
        match processed.last_mut() {
            Some(last) if last.token_count + pending.token_count <= config.max_chunk_size => {
                last.text.push_str("\n\n");
                last.text.push_str(&pending.text);
                last.token_count += pending.token_count;
            }
            _ => processed.push(pending),
        }
    }

    if config.overlap_size > 0 {
        add_overlap(&mut processed, config.overlap_size);
    }

    for (i, node) in processed.iter_mut().enumerate() {
        node.chunk_index = i;
    }

    processed
}

/// Prefix each node with the tail of its predecessor
fn add_overlap(nodes: &mut [Node], overlap_size: usize) {
    for i in (1..nodes.len()).rev() {
        let (left, right) = nodes.split_at_mut(i);
        let prev = &left[i - 1];
        let curr = &mut right[0];

        let overlap_text = extract_overlap_text(&prev.text, overlap_size);
        if !overlap_text.is_empty() {
            curr.text = format!("{}\n\n{}", overlap_text, curr.text);
            curr.token_count += estimate_token_count(&overlap_text);
        }
    }
}

/// Extract overlap text from the end of a chunk
fn extract_overlap_text(content: &str, overlap_tokens: usize) -> String {
    let words: Vec<&str> = content.split_whitespace().collect();
    let word_count = (overlap_tokens as f64 * 0.75) as usize; // Rough word-to-token ratio

    if word_count == 0 || words.len() <= word_count {
        return String::new();
    }

    words[words.len() - word_count..].join(" ")
}

/// Estimate token count using a simple heuristic
/// This is a rough approximation - actual tokenization would be more accurate
#[inline]
pub fn estimate_token_count(text: &str) -> usize {
    // Rough heuristic: 1 token ≈ 0.75 words for English text
    // Add extra tokens for punctuation and special characters
    let word_count = text.split_whitespace().count();
    let punct_count = text.chars().filter(|c| c.is_ascii_punctuation()).count();

    (punct_count as f64).mul_add(0.1, word_count as f64 / 0.75) as usize
}
