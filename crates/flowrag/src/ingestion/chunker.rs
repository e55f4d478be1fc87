//! Splitting documents into overlapping chunks

use async_trait::async_trait;
use unicode_segmentation::UnicodeSegmentation;

use crate::config::{ChunkingConfig, SplitUnit};
use crate::error::{Error, Result};
use crate::pipeline::{Component, Inputs, Outputs, PortSpec, PortType, RunContext, Value};
use crate::types::document::{META_SOURCE_ID, META_SPLIT_ID, META_SPLIT_OVERLAP, META_SPLIT_START};
use crate::types::Document;

/// A chunk of a parent's content
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Span<'a> {
    /// Byte offset in the parent content
    pub start: usize,
    pub text: &'a str,
    /// Units shared with the previous span
    pub overlap: usize,
}

/// Splits documents into windows of `split_length` units
///
/// Consecutive windows share `split_overlap` units. Every window is a
/// contiguous slice of the parent, so the parent can be rebuilt from the
/// children's start offsets with `merge_chunks`.
#[derive(Debug, Clone)]
pub struct DocumentSplitter {
    unit: SplitUnit,
    length: usize,
    overlap: usize,
}

impl DocumentSplitter {
    pub fn new(config: &ChunkingConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            unit: config.split_by,
            length: config.split_length,
            overlap: config.split_overlap,
        })
    }

    /// Break text into units that concatenate back to the input
    fn units<'a>(&self, text: &'a str) -> Vec<(usize, &'a str)> {
        match self.unit {
            SplitUnit::Word => word_units(text),
            SplitUnit::Sentence => text.split_sentence_bound_indices().collect(),
            SplitUnit::Passage => {
                let mut offset = 0;
                text.split_inclusive("\n\n")
                    .map(|p| {
                        let unit = (offset, p);
                        offset += p.len();
                        unit
                    })
                    .collect()
            }
        }
    }

    /// Windows over `text`; always at least one
    pub fn split_text<'a>(&self, text: &'a str) -> Vec<Span<'a>> {
        let units = self.units(text);
        if units.len() <= self.length {
            return vec![Span {
                start: 0,
                text,
                overlap: 0,
            }];
        }

        let step = self.length - self.overlap;
        let mut spans = Vec::new();
        let mut first = 0;
        loop {
            let last = (first + self.length).min(units.len());
            let start = units[first].0;
            let (end_offset, end_text) = units[last - 1];
            spans.push(Span {
                start,
                text: &text[start..end_offset + end_text.len()],
                overlap: if spans.is_empty() { 0 } else { self.overlap },
            });
            if last == units.len() {
                break;
            }
            first += step;
        }
        spans
    }

    /// Replace a document with its ordered children
    pub fn split_document(&self, parent: &Document) -> Vec<Document> {
        self.split_text(&parent.content)
            .into_iter()
            .enumerate()
            .map(|(i, span)| {
                let mut metadata = parent.metadata.clone();
                metadata.insert(META_SOURCE_ID.to_string(), parent.id.clone().into());
                metadata.insert(META_SPLIT_ID.to_string(), i.into());
                metadata.insert(META_SPLIT_START.to_string(), span.start.into());
                metadata.insert(META_SPLIT_OVERLAP.to_string(), span.overlap.into());
                Document::new(span.text, metadata)
            })
            .collect()
    }
}

/// Word plus trailing whitespace; leading whitespace stays with the first word
fn word_units(text: &str) -> Vec<(usize, &str)> {
    let mut bounds = vec![0];
    let mut prev_ws = false;
    let mut seen_word = false;
    for (i, c) in text.char_indices() {
        let ws = c.is_whitespace();
        if !ws && prev_ws && seen_word {
            bounds.push(i);
        }
        seen_word |= !ws;
        prev_ws = ws;
    }
    if text.is_empty() {
        return Vec::new();
    }
    bounds.push(text.len());
    bounds
        .windows(2)
        .map(|w| (w[0], &text[w[0]..w[1]]))
        .collect()
}

/// Rebuild a parent's content from its children, dropping overlapped text
pub fn merge_chunks(children: &[Document]) -> Result<String> {
    let mut ordered: Vec<(i64, usize, &Document)> = Vec::with_capacity(children.len());
    for child in children {
        let split_id = child
            .meta(META_SPLIT_ID)
            .and_then(|v| v.as_int())
            .ok_or_else(|| Error::internal(format!("chunk {} has no {}", child.id, META_SPLIT_ID)))?;
        let start = child
            .meta(META_SPLIT_START)
            .and_then(|v| v.as_int())
            .and_then(|v| usize::try_from(v).ok())
            .ok_or_else(|| Error::internal(format!("chunk {} has no {}", child.id, META_SPLIT_START)))?;
        ordered.push((split_id, start, child));
    }
    ordered.sort_by_key(|(split_id, _, _)| *split_id);

    let mut merged = String::new();
    for (_, start, child) in ordered {
        if start > merged.len() {
            return Err(Error::internal(format!(
                "gap before chunk {} at offset {}",
                child.id, start
            )));
        }
        let skip = merged.len() - start;
        let tail = child.content.get(skip..).ok_or_else(|| {
            Error::internal(format!("chunk {} does not align with its predecessor", child.id))
        })?;
        merged.push_str(tail);
    }
    Ok(merged)
}

#[async_trait]
impl Component for DocumentSplitter {
    fn kind(&self) -> &str {
        "document_splitter"
    }

    fn input_ports(&self) -> Vec<PortSpec> {
        vec![PortSpec::new("documents", PortType::Documents)]
    }

    fn output_ports(&self) -> Vec<PortSpec> {
        vec![PortSpec::new("documents", PortType::Documents)]
    }

    async fn run(&self, mut inputs: Inputs, ctx: &RunContext) -> Result<Outputs> {
        let documents = inputs.documents("documents")?;
        let parents = documents.len();
        let chunks: Vec<Document> = documents
            .iter()
            .flat_map(|doc| self.split_document(doc))
            .collect();

        ctx.stats().add_split(chunks.len());
        tracing::debug!("Split {} documents into {} chunks", parents, chunks.len());
        Ok(Outputs::from([("documents".to_string(), Value::Documents(chunks))]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Metadata;
    use proptest::prelude::*;

    fn splitter(unit: SplitUnit, length: usize, overlap: usize) -> DocumentSplitter {
        DocumentSplitter::new(&ChunkingConfig {
            split_by: unit,
            split_length: length,
            split_overlap: overlap,
        })
        .unwrap()
    }

    #[test]
    fn test_word_windows_overlap() {
        let spans = splitter(SplitUnit::Word, 3, 1).split_text("one two three four five six");
        let texts: Vec<_> = spans.iter().map(|s| s.text).collect();
        assert_eq!(texts, vec!["one two three ", "three four five ", "five six"]);
        assert_eq!(spans[1].start, 8);
        assert_eq!(spans[1].overlap, 1);
    }

    #[test]
    fn test_short_document_yields_one_identical_child() {
        let mut meta = Metadata::new();
        meta.insert("file_path".to_string(), "a.txt".into());
        let parent = Document::new("The sky is blue.", meta);

        let children = splitter(SplitUnit::Word, 250, 25).split_document(&parent);
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].content, parent.content);
        assert_eq!(
            children[0].meta(META_SOURCE_ID).and_then(|v| v.as_str()),
            Some(parent.id.as_str())
        );
        assert_eq!(children[0].meta(META_SPLIT_ID).and_then(|v| v.as_int()), Some(0));
        assert_eq!(
            children[0].meta("file_path").and_then(|v| v.as_str()),
            Some("a.txt")
        );
    }

    #[test]
    fn test_sentence_and_passage_units() {
        let spans = splitter(SplitUnit::Sentence, 1, 0).split_text("Sky is blue. Grass is green.");
        assert_eq!(spans.len(), 2);
        assert_eq!(spans[1].text, "Grass is green.");

        let spans = splitter(SplitUnit::Passage, 1, 0).split_text("first\n\nsecond\n\nthird");
        let texts: Vec<_> = spans.iter().map(|s| s.text).collect();
        assert_eq!(texts, vec!["first\n\n", "second\n\n", "third"]);
    }

    #[test]
    fn test_invalid_overlap_is_config_error() {
        let err = DocumentSplitter::new(&ChunkingConfig {
            split_by: SplitUnit::Word,
            split_length: 5,
            split_overlap: 5,
        })
        .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_merge_out_of_order_children() {
        let parent = Document::new("a b c d e f g", Metadata::new());
        let mut children = splitter(SplitUnit::Word, 3, 2).split_document(&parent);
        children.reverse();
        assert_eq!(merge_chunks(&children).unwrap(), parent.content);
    }

    proptest! {
        #[test]
        fn prop_round_trip(
            text in "[a-zA-Z .!?\n]{0,300}",
            length in 1usize..12,
            overlap_seed in 0usize..12,
            unit in prop::sample::select(vec![SplitUnit::Word, SplitUnit::Sentence, SplitUnit::Passage]),
        ) {
            let overlap = overlap_seed % length;
            let parent = Document::new(text.clone(), Metadata::new());
            let children = splitter(unit, length, overlap).split_document(&parent);
            prop_assert!(!children.is_empty());
            prop_assert_eq!(merge_chunks(&children).unwrap(), text);
        }

        #[test]
        fn prop_word_chunks_respect_length(
            text in "[a-z ]{0,300}",
            length in 1usize..10,
            overlap_seed in 0usize..10,
        ) {
            let overlap = overlap_seed % length;
            let splitter = splitter(SplitUnit::Word, length, overlap);
            for span in splitter.split_text(&text) {
                prop_assert!(word_units(span.text).len() <= length);
            }
        }
    }
}
