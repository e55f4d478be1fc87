//! Stage contract: typed ports, values and the `Component` trait

use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::types::{Document, SkippedFile, SourceRef};

/// Type carried by a port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum PortType {
    /// Source references awaiting conversion
    Sources,
    /// Ordered documents
    Documents,
    /// A single string (query or prompt)
    Text,
    /// A single embedding vector
    Embedding,
    /// Generator candidates, first is authoritative
    Replies,
    /// Per-file skip records
    Skipped,
    /// A number of items, such as documents written
    Count,
}

impl fmt::Display for PortType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Sources => "sources",
            Self::Documents => "documents",
            Self::Text => "text",
            Self::Embedding => "embedding",
            Self::Replies => "replies",
            Self::Skipped => "skipped",
            Self::Count => "count",
        };
        f.write_str(name)
    }
}

/// Data travelling along an edge
#[derive(Debug, Clone)]
pub enum Value {
    Sources(Vec<SourceRef>),
    Documents(Vec<Document>),
    Text(String),
    Embedding(Vec<f32>),
    Replies(Vec<String>),
    Skipped(Vec<SkippedFile>),
    Count(usize),
}

impl Value {
    /// Port type this value can travel on
    pub fn port_type(&self) -> PortType {
        match self {
            Self::Sources(_) => PortType::Sources,
            Self::Documents(_) => PortType::Documents,
            Self::Text(_) => PortType::Text,
            Self::Embedding(_) => PortType::Embedding,
            Self::Replies(_) => PortType::Replies,
            Self::Skipped(_) => PortType::Skipped,
            Self::Count(_) => PortType::Count,
        }
    }

    pub fn into_sources(self) -> Result<Vec<SourceRef>> {
        match self {
            Self::Sources(v) => Ok(v),
            other => Err(mismatch(PortType::Sources, &other)),
        }
    }

    pub fn into_documents(self) -> Result<Vec<Document>> {
        match self {
            Self::Documents(v) => Ok(v),
            other => Err(mismatch(PortType::Documents, &other)),
        }
    }

    pub fn into_text(self) -> Result<String> {
        match self {
            Self::Text(v) => Ok(v),
            other => Err(mismatch(PortType::Text, &other)),
        }
    }

    pub fn into_embedding(self) -> Result<Vec<f32>> {
        match self {
            Self::Embedding(v) => Ok(v),
            other => Err(mismatch(PortType::Embedding, &other)),
        }
    }

    pub fn into_replies(self) -> Result<Vec<String>> {
        match self {
            Self::Replies(v) => Ok(v),
            other => Err(mismatch(PortType::Replies, &other)),
        }
    }

    pub fn into_skipped(self) -> Result<Vec<SkippedFile>> {
        match self {
            Self::Skipped(v) => Ok(v),
            other => Err(mismatch(PortType::Skipped, &other)),
        }
    }

    pub fn into_count(self) -> Result<usize> {
        match self {
            Self::Count(v) => Ok(v),
            other => Err(mismatch(PortType::Count, &other)),
        }
    }
}

fn mismatch(expected: PortType, got: &Value) -> Error {
    Error::internal(format!(
        "expected a {} value, got {}",
        expected,
        got.port_type()
    ))
}

/// Declared input or output port
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortSpec {
    pub name: String,
    pub ty: PortType,
    /// Accepts several incoming edges, delivered in edge declaration order
    pub variadic: bool,
}

impl PortSpec {
    pub fn new(name: impl Into<String>, ty: PortType) -> Self {
        Self {
            name: name.into(),
            ty,
            variadic: false,
        }
    }

    /// Allow more than one incoming edge
    pub fn variadic(mut self) -> Self {
        self.variadic = true;
        self
    }
}

/// Values delivered to a stage, keyed by input port
///
/// A variadic port holds one value per incoming edge, in the order the edges
/// were declared, never in completion order.
#[derive(Debug, Default)]
pub struct Inputs {
    ports: BTreeMap<String, Vec<Value>>,
}

impl Inputs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a value to a port
    pub fn push(&mut self, port: impl Into<String>, value: Value) {
        self.ports.entry(port.into()).or_default().push(value);
    }

    /// Builder-style `push`
    pub fn with(mut self, port: impl Into<String>, value: Value) -> Self {
        self.push(port, value);
        self
    }

    /// Remove every value delivered to a port
    pub fn take(&mut self, port: &str) -> Vec<Value> {
        self.ports.remove(port).unwrap_or_default()
    }

    /// Take exactly one value from a port
    pub fn take_one(&mut self, port: &str) -> Result<Value> {
        let mut values = self.take(port);
        match values.len() {
            1 => Ok(values.remove(0)),
            0 => Err(Error::internal(format!("no value on input port '{}'", port))),
            n => Err(Error::internal(format!(
                "expected one value on input port '{}', got {}",
                port, n
            ))),
        }
    }

    /// Concatenate every document list delivered to a port
    pub fn documents(&mut self, port: &str) -> Result<Vec<Document>> {
        let mut out = Vec::new();
        for value in self.take(port) {
            out.extend(value.into_documents()?);
        }
        Ok(out)
    }

    /// Concatenate every source list delivered to a port
    pub fn sources(&mut self, port: &str) -> Result<Vec<SourceRef>> {
        let mut out = Vec::new();
        for value in self.take(port) {
            out.extend(value.into_sources()?);
        }
        Ok(out)
    }

    pub fn text(&mut self, port: &str) -> Result<String> {
        self.take_one(port)?.into_text()
    }

    pub fn embedding(&mut self, port: &str) -> Result<Vec<f32>> {
        self.take_one(port)?.into_embedding()
    }

    /// Whether any value was delivered to a port
    pub fn contains(&self, port: &str) -> bool {
        self.ports.contains_key(port)
    }
}

/// Values produced by a stage, keyed by output port
pub type Outputs = BTreeMap<String, Value>;

/// Counters shared by every stage of one run
#[derive(Debug, Default)]
pub struct RunStats {
    documents_filtered: AtomicUsize,
    documents_split: AtomicUsize,
    documents_written: AtomicUsize,
    files_skipped: AtomicUsize,
}

impl RunStats {
    pub fn add_filtered(&self, n: usize) {
        self.documents_filtered.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_split(&self, n: usize) {
        self.documents_split.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_written(&self, n: usize) {
        self.documents_written.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_skipped(&self, n: usize) {
        self.files_skipped.fetch_add(n, Ordering::Relaxed);
    }

    /// Copy the current counter values
    pub fn snapshot(&self) -> RunCounters {
        RunCounters {
            documents_filtered: self.documents_filtered.load(Ordering::Relaxed),
            documents_split: self.documents_split.load(Ordering::Relaxed),
            documents_written: self.documents_written.load(Ordering::Relaxed),
            files_skipped: self.files_skipped.load(Ordering::Relaxed),
        }
    }
}

/// Counter values at the end of a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunCounters {
    pub documents_filtered: usize,
    pub documents_split: usize,
    pub documents_written: usize,
    pub files_skipped: usize,
}

/// Per-run context handed to every stage
#[derive(Debug, Clone)]
pub struct RunContext {
    run_id: Uuid,
    cancel: CancellationToken,
    stats: Arc<RunStats>,
}

impl RunContext {
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            cancel,
            stats: Arc::new(RunStats::default()),
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn stats(&self) -> &RunStats {
        &self.stats
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Fail with `Error::Cancelled` once the run has been cancelled
    pub fn check_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        Ok(())
    }
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new(CancellationToken::new())
    }
}

/// A processing stage with declared input and output ports
///
/// Implementations:
/// - `TypeRouter`, `ConverterComponent`, `DocumentJoiner`, `DocumentCleaner`,
///   `DocumentSplitter` for ingestion
/// - `DocumentEmbedder`, `TextEmbedder`, `DocumentWriter`, `Retriever` over providers
/// - `PromptBuilder`, `Generator` for answering
#[async_trait]
pub trait Component: Send + Sync {
    /// Short type label used in logs
    fn kind(&self) -> &str;

    fn input_ports(&self) -> Vec<PortSpec>;

    fn output_ports(&self) -> Vec<PortSpec>;

    /// Process one set of inputs. Must produce every declared output port.
    async fn run(&self, inputs: Inputs, ctx: &RunContext) -> Result<Outputs>;
}
