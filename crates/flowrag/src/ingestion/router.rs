//! Content-type routing of sources to converter branches

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::pipeline::{Component, Inputs, Outputs, PortSpec, PortType, RunContext, Value};
use crate::types::{SkippedFile, SourceRef};

/// Output port carrying sources no branch accepts
pub const UNCLASSIFIED_PORT: &str = "unclassified";

/// Sources split by branch, in branch declaration order
#[derive(Debug, Default)]
pub struct Routed {
    pub branches: Vec<(String, Vec<SourceRef>)>,
    pub skipped: Vec<SkippedFile>,
}

/// Routes each source to the first configured content type it matches
///
/// Patterns are exact MIME types or `type/*` wildcards. Classification only
/// looks at the source's declared or sniffed type, so it is deterministic.
#[derive(Debug, Clone)]
pub struct TypeRouter {
    mime_types: Vec<String>,
}

impl TypeRouter {
    pub fn new<I, S>(mime_types: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut patterns: Vec<String> = Vec::new();
        for mime in mime_types {
            let mime = mime.into().trim().to_lowercase();
            if !is_valid_pattern(&mime) {
                return Err(Error::config(format!("invalid content type '{}'", mime)));
            }
            if patterns.contains(&mime) {
                return Err(Error::config(format!("content type '{}' listed twice", mime)));
            }
            patterns.push(mime);
        }
        if patterns.is_empty() {
            return Err(Error::config("router needs at least one content type"));
        }
        Ok(Self { mime_types: patterns })
    }

    pub fn mime_types(&self) -> &[String] {
        &self.mime_types
    }

    /// Branch label for a source, if any
    pub fn classify(&self, source: &SourceRef) -> Option<&str> {
        let content_type = source.content_type.as_deref()?;
        let essence = essence(content_type);
        self.mime_types
            .iter()
            .find(|pattern| matches_pattern(pattern, &essence))
            .map(String::as_str)
    }

    /// Assign every source to one branch or to the skipped list
    pub fn route(&self, sources: Vec<SourceRef>) -> Routed {
        let mut branches: Vec<(String, Vec<SourceRef>)> = self
            .mime_types
            .iter()
            .map(|m| (m.clone(), Vec::new()))
            .collect();
        let mut skipped = Vec::new();

        for source in sources {
            let slot = self
                .classify(&source)
                .and_then(|label| self.mime_types.iter().position(|m| m == label));
            match slot {
                Some(i) => branches[i].1.push(source),
                None => {
                    let err = Error::UnsupportedSource {
                        path: source.display_path(),
                        content_type: source
                            .content_type
                            .clone()
                            .unwrap_or_else(|| "unknown".to_string()),
                    };
                    tracing::warn!("Skipping {}", err);
                    skipped.push(SkippedFile::from_error(source.display_path(), &err));
                }
            }
        }

        Routed { branches, skipped }
    }
}

fn essence(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_lowercase()
}

fn is_valid_pattern(pattern: &str) -> bool {
    match pattern.split_once('/') {
        Some((top, sub)) => !top.is_empty() && top != "*" && !sub.is_empty() && !sub.contains('/'),
        None => false,
    }
}

fn matches_pattern(pattern: &str, essence: &str) -> bool {
    match pattern.strip_suffix("/*") {
        Some(top) => essence
            .split_once('/')
            .map(|(t, _)| t == top)
            .unwrap_or(false),
        None => pattern == essence,
    }
}

#[async_trait]
impl Component for TypeRouter {
    fn kind(&self) -> &str {
        "type_router"
    }

    fn input_ports(&self) -> Vec<PortSpec> {
        vec![PortSpec::new("sources", PortType::Sources)]
    }

    fn output_ports(&self) -> Vec<PortSpec> {
        let mut ports: Vec<PortSpec> = self
            .mime_types
            .iter()
            .map(|m| PortSpec::new(m.clone(), PortType::Sources))
            .collect();
        ports.push(PortSpec::new(UNCLASSIFIED_PORT, PortType::Skipped));
        ports
    }

    async fn run(&self, mut inputs: Inputs, ctx: &RunContext) -> Result<Outputs> {
        let sources = inputs.sources("sources")?;
        let total = sources.len();
        let routed = self.route(sources);

        for (label, branch) in &routed.branches {
            tracing::debug!("Routed {} of {} sources to {}", branch.len(), total, label);
        }
        ctx.stats().add_skipped(routed.skipped.len());

        let mut outputs = Outputs::new();
        for (label, branch) in routed.branches {
            outputs.insert(label, Value::Sources(branch));
        }
        outputs.insert(UNCLASSIFIED_PORT.to_string(), Value::Skipped(routed.skipped));
        Ok(outputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn router() -> TypeRouter {
        TypeRouter::new(["text/plain", "application/pdf", "text/markdown"]).unwrap()
    }

    #[test]
    fn test_routes_by_sniffed_type() {
        let routed = router().route(vec![
            SourceRef::from_path("a.txt"),
            SourceRef::from_path("b.md"),
            SourceRef::from_path("c.pdf"),
            SourceRef::from_path("d.png"),
            SourceRef::from_path("README"),
        ]);

        let sizes: Vec<_> = routed.branches.iter().map(|(l, s)| (l.as_str(), s.len())).collect();
        assert_eq!(
            sizes,
            vec![("text/plain", 1), ("application/pdf", 1), ("text/markdown", 1)]
        );
        assert_eq!(routed.skipped.len(), 2);
        assert_eq!(routed.skipped[0].path, "d.png");
        assert_eq!(routed.skipped[0].kind, "UnsupportedSourceError");
    }

    #[test]
    fn test_declared_type_wins_and_parameters_are_ignored() {
        let source = SourceRef::with_content_type("notes.bin", "Text/Plain; charset=utf-8");
        assert_eq!(router().classify(&source), Some("text/plain"));
    }

    #[test]
    fn test_wildcard_takes_first_match_in_order() {
        let router = TypeRouter::new(["text/markdown", "text/*"]).unwrap();
        assert_eq!(router.classify(&SourceRef::from_path("b.md")), Some("text/markdown"));
        assert_eq!(router.classify(&SourceRef::from_path("a.csv")), Some("text/*"));
        assert_eq!(router.classify(&SourceRef::from_path("c.pdf")), None);
    }

    #[test]
    fn test_classification_is_deterministic() {
        let router = router();
        let source = SourceRef::from_path("x/y/z.md");
        assert_eq!(router.classify(&source), router.classify(&source));
    }

    #[test]
    fn test_rejects_bad_patterns() {
        assert!(TypeRouter::new(Vec::<String>::new()).is_err());
        assert!(TypeRouter::new(["plain"]).is_err());
        assert!(TypeRouter::new(["*/*"]).is_err());
        assert!(TypeRouter::new(["text/plain", "TEXT/PLAIN"]).is_err());
    }
}
