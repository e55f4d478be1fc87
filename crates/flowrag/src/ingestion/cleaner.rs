//! Content normalization before splitting

use async_trait::async_trait;
use regex::Regex;

use crate::config::CleaningConfig;
use crate::error::{Error, Result};
use crate::pipeline::{Component, Inputs, Outputs, PortSpec, PortType, RunContext, Value};
use crate::types::Document;

/// Normalizes whitespace and drops documents left empty
///
/// Surviving documents keep their id and metadata; only `content` changes.
#[derive(Debug, Clone)]
pub struct DocumentCleaner {
    remove_empty_lines: bool,
    remove_extra_whitespaces: bool,
    remove_regex: Option<Regex>,
    spaces: Regex,
}

impl DocumentCleaner {
    pub fn new(config: &CleaningConfig) -> Result<Self> {
        let remove_regex = config
            .remove_regex
            .as_deref()
            .map(Regex::new)
            .transpose()
            .map_err(|e| Error::config(format!("invalid cleaning.remove_regex: {}", e)))?;
        let spaces = Regex::new(r"[^\S\n]+")
            .map_err(|e| Error::internal(format!("whitespace pattern: {}", e)))?;

        Ok(Self {
            remove_empty_lines: config.remove_empty_lines,
            remove_extra_whitespaces: config.remove_extra_whitespaces,
            remove_regex,
            spaces,
        })
    }

    /// Apply every enabled rule to a piece of text
    pub fn clean(&self, text: &str) -> String {
        let mut lines: Vec<String> = text
            .replace("\r\n", "\n")
            .split('\n')
            .map(|line| {
                if self.remove_extra_whitespaces {
                    self.spaces.replace_all(line, " ").trim().to_string()
                } else {
                    line.to_string()
                }
            })
            .collect();

        if self.remove_empty_lines {
            lines.retain(|line| !line.trim().is_empty());
        }

        let mut cleaned = lines.join("\n");
        if let Some(re) = &self.remove_regex {
            cleaned = re.replace_all(&cleaned, "").into_owned();
        }
        if self.remove_extra_whitespaces {
            cleaned = cleaned.trim().to_string();
        }
        cleaned
    }

    /// Clean a batch, returning survivors and the number dropped
    pub fn clean_documents(&self, documents: Vec<Document>) -> (Vec<Document>, usize) {
        let before = documents.len();
        let kept: Vec<Document> = documents
            .into_iter()
            .filter_map(|mut doc| {
                doc.content = self.clean(&doc.content);
                if doc.content.trim().is_empty() {
                    tracing::debug!("Dropping empty document {}", doc.id);
                    None
                } else {
                    Some(doc)
                }
            })
            .collect();
        let filtered = before - kept.len();
        (kept, filtered)
    }
}

#[async_trait]
impl Component for DocumentCleaner {
    fn kind(&self) -> &str {
        "document_cleaner"
    }

    fn input_ports(&self) -> Vec<PortSpec> {
        vec![PortSpec::new("documents", PortType::Documents)]
    }

    fn output_ports(&self) -> Vec<PortSpec> {
        vec![PortSpec::new("documents", PortType::Documents)]
    }

    async fn run(&self, mut inputs: Inputs, ctx: &RunContext) -> Result<Outputs> {
        let documents = inputs.documents("documents")?;
        let (kept, filtered) = self.clean_documents(documents);
        ctx.stats().add_filtered(filtered);
        if filtered > 0 {
            tracing::info!("Cleaner filtered {} empty documents", filtered);
        }
        Ok(Outputs::from([("documents".to_string(), Value::Documents(kept))]))
    }
}
