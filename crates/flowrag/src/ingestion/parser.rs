//! Format converters: raw bytes to documents

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use pulldown_cmark::{Event, Parser, TagEnd};
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::pipeline::{Component, Inputs, Outputs, PortSpec, PortType, RunContext, Value};
use crate::types::document::{META_CONTENT_TYPE, META_FILE_PATH};
use crate::types::{Document, Metadata, SkippedFile, SourceRef};

/// Files converted at the same time within one branch
const PARALLEL_FILES: usize = 4;

/// Text and format-specific metadata extracted from one source
#[derive(Debug, Clone, Default)]
pub struct Converted {
    pub content: String,
    pub metadata: Metadata,
}

/// Decodes one file format
///
/// Conversion is synchronous and runs on the blocking pool.
pub trait Converter: Send + Sync {
    fn name(&self) -> &str;

    fn convert(&self, path: &str, data: &[u8]) -> Result<Converted>;
}

/// Converter registered for a content type, if any
pub fn converter_for(mime: &str) -> Option<Arc<dyn Converter>> {
    match mime {
        "text/markdown" | "text/x-markdown" => Some(Arc::new(MarkdownConverter)),
        "application/pdf" => Some(Arc::new(PdfConverter)),
        m if m.starts_with("text/") => Some(Arc::new(TextConverter)),
        _ => None,
    }
}

fn decode_utf8(path: &str, data: &[u8]) -> Result<String> {
    let data = data.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(data);
    String::from_utf8(data.to_vec())
        .map_err(|e| Error::conversion(path, format!("not valid UTF-8: {}", e)))
}

/// Plain text, strict UTF-8
pub struct TextConverter;

impl Converter for TextConverter {
    fn name(&self) -> &str {
        "text"
    }

    fn convert(&self, path: &str, data: &[u8]) -> Result<Converted> {
        Ok(Converted {
            content: decode_utf8(path, data)?,
            metadata: Metadata::new(),
        })
    }
}

/// Markdown rendered to plain text
pub struct MarkdownConverter;

impl MarkdownConverter {
    fn to_plain_text(markdown: &str) -> String {
        let mut text = String::with_capacity(markdown.len());
        for event in Parser::new(markdown) {
            match event {
                Event::Text(t) | Event::Code(t) => text.push_str(&t),
                Event::SoftBreak | Event::HardBreak => text.push('\n'),
                Event::End(
                    TagEnd::Paragraph
                    | TagEnd::Heading(_)
                    | TagEnd::Item
                    | TagEnd::CodeBlock,
                ) => text.push('\n'),
                _ => {}
            }
        }
        text
    }
}

impl Converter for MarkdownConverter {
    fn name(&self) -> &str {
        "markdown"
    }

    fn convert(&self, path: &str, data: &[u8]) -> Result<Converted> {
        let markdown = decode_utf8(path, data)?;
        Ok(Converted {
            content: Self::to_plain_text(&markdown),
            metadata: Metadata::new(),
        })
    }
}

/// PDF text extraction with page count
pub struct PdfConverter;

impl Converter for PdfConverter {
    fn name(&self) -> &str {
        "pdf"
    }

    fn convert(&self, path: &str, data: &[u8]) -> Result<Converted> {
        let document = lopdf::Document::load_mem(data)
            .map_err(|e| Error::conversion(path, format!("unreadable PDF: {}", e)))?;
        let page_count = document.get_pages().len();

        let text = pdf_extract::extract_text_from_mem(data)
            .map_err(|e| Error::conversion(path, format!("text extraction failed: {}", e)))?;
        let content = text
            .replace('\0', "")
            .lines()
            .map(str::trim_end)
            .collect::<Vec<_>>()
            .join("\n");

        if content.trim().is_empty() {
            return Err(Error::conversion(path, "no text content could be extracted"));
        }

        let mut metadata = Metadata::new();
        metadata.insert("page_count".to_string(), page_count.into());
        Ok(Converted { content, metadata })
    }
}

/// Pipeline stage wrapping a converter
///
/// Per-file failures go to the `failures` output instead of aborting the run.
pub struct ConverterComponent {
    content_type: String,
    converter: Arc<dyn Converter>,
}

impl ConverterComponent {
    pub fn new(content_type: impl Into<String>, converter: Arc<dyn Converter>) -> Self {
        Self {
            content_type: content_type.into(),
            converter,
        }
    }

    /// Look up the converter registered for a content type
    pub fn for_mime(content_type: &str) -> Result<Self> {
        let converter = converter_for(content_type).ok_or_else(|| {
            Error::config(format!("no converter registered for '{}'", content_type))
        })?;
        Ok(Self::new(content_type, converter))
    }

    async fn convert_one(&self, source: SourceRef) -> Result<Document> {
        let path = source.display_path();
        let data = tokio::fs::read(&source.path)
            .await
            .map_err(|e| Error::conversion(&path, format!("read failed: {}", e)))?;

        let converter = Arc::clone(&self.converter);
        let task_path = path.clone();
        let converted = tokio::task::spawn_blocking(move || converter.convert(&task_path, &data))
            .await
            .map_err(|e| Error::conversion(&path, format!("converter crashed: {}", e)))??;

        let mut metadata = converted.metadata;
        metadata.insert(META_FILE_PATH.to_string(), path.into());
        metadata.insert(
            META_CONTENT_TYPE.to_string(),
            source
                .content_type
                .unwrap_or_else(|| self.content_type.clone())
                .into(),
        );
        Ok(Document::new(converted.content, metadata))
    }
}

#[async_trait]
impl Component for ConverterComponent {
    fn kind(&self) -> &str {
        self.converter.name()
    }

    fn input_ports(&self) -> Vec<PortSpec> {
        vec![PortSpec::new("sources", PortType::Sources)]
    }

    fn output_ports(&self) -> Vec<PortSpec> {
        vec![
            PortSpec::new("documents", PortType::Documents),
            PortSpec::new("failures", PortType::Skipped),
        ]
    }

    async fn run(&self, mut inputs: Inputs, ctx: &RunContext) -> Result<Outputs> {
        let sources = inputs.sources("sources")?;

        let results: Vec<(String, Result<Document>)> = stream::iter(sources)
            .map(|source| async move {
                let path = source.display_path();
                (path, self.convert_one(source).await)
            })
            .buffered(PARALLEL_FILES)
            .collect()
            .await;

        let mut documents = Vec::new();
        let mut failures = Vec::new();
        for (path, result) in results {
            match result {
                Ok(doc) => documents.push(doc),
                Err(e) if e.is_recoverable() => {
                    tracing::warn!("Skipping {}: {}", path, e);
                    failures.push(SkippedFile::from_error(path, &e));
                }
                Err(e) => return Err(e),
            }
        }

        ctx.check_cancelled()?;
        ctx.stats().add_skipped(failures.len());
        tracing::debug!(
            "{} converter produced {} documents, {} failures",
            self.converter.name(),
            documents.len(),
            failures.len()
        );

        Ok(Outputs::from([
            ("documents".to_string(), Value::Documents(documents)),
            ("failures".to_string(), Value::Skipped(failures)),
        ]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_markdown_renders_plain_text() {
        let converted = MarkdownConverter
            .convert("b.md", b"# Sky\nThe sky is *blue* at noon.")
            .unwrap();
        assert_eq!(converted.content, "Sky\nThe sky is blue at noon.\n");
    }

    #[test]
    fn test_text_rejects_invalid_utf8() {
        let err = TextConverter.convert("bad.txt", &[0xff, 0xfe, 0x00]).unwrap_err();
        assert_eq!(err.kind(), "ConversionError");
    }

    #[test]
    fn test_corrupt_pdf_is_conversion_error() {
        let err = PdfConverter.convert("c.pdf", b"this is not a pdf").unwrap_err();
        assert!(matches!(err, Error::Conversion { ref path, .. } if path == "c.pdf"));
    }

    #[test]
    fn test_converter_registry() {
        assert_eq!(converter_for("text/markdown").unwrap().name(), "markdown");
        assert_eq!(converter_for("application/pdf").unwrap().name(), "pdf");
        assert_eq!(converter_for("text/csv").unwrap().name(), "text");
        assert!(converter_for("image/png").is_none());
    }

    #[tokio::test]
    async fn test_component_records_failures_and_keeps_order() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.txt");
        let b = dir.path().join("b.txt");
        let missing = dir.path().join("missing.txt");
        std::fs::write(&a, "first").unwrap();
        std::fs::write(&b, "second").unwrap();

        let component = ConverterComponent::for_mime("text/plain").unwrap();
        let inputs = Inputs::new().with(
            "sources",
            Value::Sources(vec![
                SourceRef::from_path(&a),
                SourceRef::from_path(&missing),
                SourceRef::from_path(&b),
            ]),
        );
        let ctx = RunContext::default();
        let mut outputs = component.run(inputs, &ctx).await.unwrap();

        let docs = outputs.remove("documents").unwrap().into_documents().unwrap();
        let contents: Vec<_> = docs.iter().map(|d| d.content.as_str()).collect();
        assert_eq!(contents, vec!["first", "second"]);
        assert_eq!(docs[0].meta(META_CONTENT_TYPE).and_then(|v| v.as_str()), Some("text/plain"));

        let failures = outputs.remove("failures").unwrap().into_skipped().unwrap();
        assert_eq!(failures.len(), 1);
        assert!(failures[0].path.ends_with("missing.txt"));
        assert_eq!(ctx.stats().snapshot().files_skipped, 1);
    }
}
