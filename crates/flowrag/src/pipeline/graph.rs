//! Pipeline graph: build-time validation and dependency-ordered execution

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use crate::error::{Error, Result};

use super::component::{
    Component, Inputs, Outputs, PortSpec, RunContext, RunCounters, Value,
};

/// Lifecycle of a graph and its runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Built,
    Validated,
    Running,
    Completed,
    Failed,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Built => "built",
            Self::Validated => "validated",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

struct Node {
    name: String,
    component: Arc<dyn Component>,
    inputs: Vec<PortSpec>,
    outputs: Vec<PortSpec>,
}

/// A validated connection between two ports
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge {
    pub from: String,
    pub from_port: String,
    pub to: String,
    pub to_port: String,
}

#[derive(Debug, Clone, Copy)]
struct EdgeIdx {
    from: usize,
    to: usize,
}

/// Collects stages and connections; `build` validates them
pub struct PipelineBuilder {
    components: Vec<(String, Arc<dyn Component>)>,
    connections: Vec<(String, String)>,
    exposed: Vec<(String, String)>,
    max_concurrency: usize,
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self {
            components: Vec::new(),
            connections: Vec::new(),
            exposed: Vec::new(),
            max_concurrency: num_cpus::get().max(1),
        }
    }

    /// Add a named stage
    pub fn add_component<C: Component + 'static>(self, name: impl Into<String>, component: C) -> Self {
        self.add_shared(name, Arc::new(component))
    }

    /// Add a named stage that is shared with other graphs
    pub fn add_shared(mut self, name: impl Into<String>, component: Arc<dyn Component>) -> Self {
        self.components.push((name.into(), component));
        self
    }

    /// Connect `stage.port` to `stage.port`. The port may be omitted when the
    /// stage has exactly one port on that side.
    pub fn connect(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.connections.push((from.into(), to.into()));
        self
    }

    /// Mark an input port as supplied by the caller at run time
    pub fn expose_input(mut self, stage: impl Into<String>, port: impl Into<String>) -> Self {
        self.exposed.push((stage.into(), port.into()));
        self
    }

    /// Maximum number of stages running at once
    pub fn max_concurrency(mut self, limit: usize) -> Self {
        self.max_concurrency = limit.max(1);
        self
    }

    /// Validate names, port types, connectivity and acyclicity
    pub fn build(self) -> Result<Pipeline> {
        tracing::debug!(
            "Pipeline {} with {} stages and {} connections",
            RunState::Built,
            self.components.len(),
            self.connections.len()
        );

        let mut index: HashMap<String, usize> = HashMap::new();
        let mut nodes = Vec::with_capacity(self.components.len());
        for (name, component) in self.components {
            if name.is_empty() || name.contains('.') {
                return Err(Error::graph(name, None, "stage names must be non-empty and contain no '.'"));
            }
            if index.contains_key(&name) {
                return Err(Error::graph(name, None, "duplicate stage name"));
            }
            index.insert(name.clone(), nodes.len());
            nodes.push(Node {
                name,
                inputs: component.input_ports(),
                outputs: component.output_ports(),
                component,
            });
        }

        let mut edges = Vec::with_capacity(self.connections.len());
        let mut edge_idx = Vec::with_capacity(self.connections.len());
        for (from, to) in &self.connections {
            let (from_name, from_port) = split_endpoint(from);
            let (to_name, to_port) = split_endpoint(to);
            let from_i = lookup(&index, from_name, from_port)?;
            let to_i = lookup(&index, to_name, to_port)?;
            let out_spec = resolve_port(&nodes[from_i], from_port, Side::Output)?;
            let in_spec = resolve_port(&nodes[to_i], to_port, Side::Input)?;

            if out_spec.ty != in_spec.ty {
                return Err(Error::graph(
                    to_name,
                    Some(&in_spec.name),
                    format!(
                        "type mismatch: '{}.{}' produces {} but the port accepts {}",
                        from_name, out_spec.name, out_spec.ty, in_spec.ty
                    ),
                ));
            }

            edges.push(Edge {
                from: from_name.to_string(),
                from_port: out_spec.name.clone(),
                to: to_name.to_string(),
                to_port: in_spec.name.clone(),
            });
            edge_idx.push(EdgeIdx { from: from_i, to: to_i });
        }

        let mut exposed = BTreeSet::new();
        for (stage, port) in &self.exposed {
            let i = lookup(&index, stage, Some(port))?;
            let spec = resolve_port(&nodes[i], Some(port), Side::Input)?;
            exposed.insert((i, spec.name.clone()));
        }

        for (i, node) in nodes.iter().enumerate() {
            for spec in &node.inputs {
                let incoming = edges
                    .iter()
                    .zip(&edge_idx)
                    .filter(|(e, ix)| ix.to == i && e.to_port == spec.name)
                    .count();
                let is_exposed = exposed.contains(&(i, spec.name.clone()));

                if incoming > 1 && !spec.variadic {
                    return Err(Error::graph(
                        &node.name,
                        Some(&spec.name),
                        format!("port accepts a single connection, got {}", incoming),
                    ));
                }
                if incoming > 0 && is_exposed {
                    return Err(Error::graph(
                        &node.name,
                        Some(&spec.name),
                        "port is both connected and exposed",
                    ));
                }
                if incoming == 0 && !is_exposed {
                    return Err(Error::graph(
                        &node.name,
                        Some(&spec.name),
                        "input port is not connected",
                    ));
                }
            }
        }

        detect_cycles(&nodes, &edge_idx)?;
        let order = topological_order(nodes.len(), &edge_idx);

        tracing::debug!(
            "Pipeline {}: {}",
            RunState::Validated,
            order
                .iter()
                .map(|&i| nodes[i].name.as_str())
                .collect::<Vec<_>>()
                .join(" -> ")
        );

        Ok(Pipeline {
            nodes,
            edges,
            edge_idx,
            exposed,
            order,
            max_concurrency: self.max_concurrency,
        })
    }
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Copy)]
enum Side {
    Input,
    Output,
}

fn split_endpoint(endpoint: &str) -> (&str, Option<&str>) {
    match endpoint.split_once('.') {
        Some((stage, port)) => (stage, Some(port)),
        None => (endpoint, None),
    }
}

fn lookup(index: &HashMap<String, usize>, stage: &str, port: Option<&str>) -> Result<usize> {
    index
        .get(stage)
        .copied()
        .ok_or_else(|| Error::graph(stage, port, "unknown stage"))
}

fn resolve_port<'a>(node: &'a Node, port: Option<&str>, side: Side) -> Result<&'a PortSpec> {
    let (ports, label) = match side {
        Side::Input => (&node.inputs, "input"),
        Side::Output => (&node.outputs, "output"),
    };
    match port {
        Some(name) => ports
            .iter()
            .find(|p| p.name == name)
            .ok_or_else(|| Error::graph(&node.name, Some(name), format!("no such {} port", label))),
        None if ports.len() == 1 => Ok(&ports[0]),
        None => Err(Error::graph(
            &node.name,
            None,
            format!("stage has {} {} ports, name one explicitly", ports.len(), label),
        )),
    }
}

fn detect_cycles(nodes: &[Node], edges: &[EdgeIdx]) -> Result<()> {
    fn visit(
        node: usize,
        nodes: &[Node],
        edges: &[EdgeIdx],
        visited: &mut [bool],
        on_stack: &mut [bool],
    ) -> Result<()> {
        visited[node] = true;
        on_stack[node] = true;
        for edge in edges.iter().filter(|e| e.from == node) {
            if on_stack[edge.to] {
                return Err(Error::graph(
                    &nodes[node].name,
                    None,
                    format!("cycle detected: {} -> {}", nodes[node].name, nodes[edge.to].name),
                ));
            }
            if !visited[edge.to] {
                visit(edge.to, nodes, edges, visited, on_stack)?;
            }
        }
        on_stack[node] = false;
        Ok(())
    }

    let mut visited = vec![false; nodes.len()];
    let mut on_stack = vec![false; nodes.len()];
    for node in 0..nodes.len() {
        if !visited[node] {
            visit(node, nodes, edges, &mut visited, &mut on_stack)?;
        }
    }
    Ok(())
}

/// Kahn's algorithm, ties broken by declaration order
fn topological_order(len: usize, edges: &[EdgeIdx]) -> Vec<usize> {
    let mut indegree = vec![0usize; len];
    for edge in edges {
        indegree[edge.to] += 1;
    }
    let mut queue: VecDeque<usize> = (0..len).filter(|&i| indegree[i] == 0).collect();
    let mut order = Vec::with_capacity(len);
    while let Some(node) = queue.pop_front() {
        order.push(node);
        for edge in edges.iter().filter(|e| e.from == node) {
            indegree[edge.to] -= 1;
            if indegree[edge.to] == 0 {
                queue.push_back(edge.to);
            }
        }
    }
    order
}

/// Caller-supplied values for exposed input ports
#[derive(Debug, Default)]
pub struct PipelineInputs {
    values: Vec<(String, String, Value)>,
}

impl PipelineInputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, stage: impl Into<String>, port: impl Into<String>, value: Value) -> Self {
        self.values.push((stage.into(), port.into(), value));
        self
    }
}

/// Per-run options
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Stages whose every output is returned, not just unconnected ones
    pub include_outputs_from: BTreeSet<String>,
    /// Cancels every in-flight stage when triggered
    pub cancel: CancellationToken,
}

impl RunOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn include_outputs_from<I, S>(mut self, stages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.include_outputs_from
            .extend(stages.into_iter().map(Into::into));
        self
    }

    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }
}

/// Result of a completed run
#[derive(Debug)]
pub struct PipelineOutput {
    pub run_id: Uuid,
    /// Outputs per stage: unconnected ports, plus every port of included stages
    pub outputs: BTreeMap<String, Outputs>,
    pub counters: RunCounters,
}

impl PipelineOutput {
    pub fn get(&self, stage: &str, port: &str) -> Option<&Value> {
        self.outputs.get(stage).and_then(|o| o.get(port))
    }

    /// Move a value out of the result
    pub fn take(&mut self, stage: &str, port: &str) -> Option<Value> {
        self.outputs.get_mut(stage).and_then(|o| o.remove(port))
    }
}

/// A validated graph, reusable across runs
///
/// A run keeps no state on the graph, so one `Pipeline` can serve several
/// concurrent runs. Store writes committed before a failure are not rolled back.
pub struct Pipeline {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    edge_idx: Vec<EdgeIdx>,
    exposed: BTreeSet<(usize, String)>,
    order: Vec<usize>,
    max_concurrency: usize,
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("stages", &self.stage_names())
            .field("edges", &self.edges)
            .field("max_concurrency", &self.max_concurrency)
            .finish()
    }
}

impl Pipeline {
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::new()
    }

    /// Stage names in topological order
    pub fn stage_names(&self) -> Vec<&str> {
        self.order.iter().map(|&i| self.nodes[i].name.as_str()).collect()
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Execute every stage once, in dependency order
    pub async fn run(&self, inputs: PipelineInputs, options: RunOptions) -> Result<PipelineOutput> {
        let ctx = RunContext::new(options.cancel.clone());
        let span = tracing::info_span!("pipeline_run", run_id = %ctx.run_id());
        self.execute(inputs, options, ctx).instrument(span).await
    }

    fn seed_inputs(&self, inputs: PipelineInputs) -> Result<Vec<Inputs>> {
        let mut seeded: Vec<Inputs> = self.nodes.iter().map(|_| Inputs::new()).collect();
        let mut index: HashMap<&str, usize> = HashMap::new();
        for (i, node) in self.nodes.iter().enumerate() {
            index.insert(node.name.as_str(), i);
        }

        for (stage, port, value) in inputs.values {
            let i = *index
                .get(stage.as_str())
                .ok_or_else(|| Error::graph(&stage, Some(&port), "unknown stage"))?;
            if !self.exposed.contains(&(i, port.clone())) {
                return Err(Error::graph(&stage, Some(&port), "input port is not exposed"));
            }
            let spec = resolve_port(&self.nodes[i], Some(&port), Side::Input)?;
            if spec.ty != value.port_type() {
                return Err(Error::graph(
                    &stage,
                    Some(&port),
                    format!("expected {}, got {}", spec.ty, value.port_type()),
                ));
            }
            seeded[i].push(port, value);
        }

        for (i, port) in &self.exposed {
            if !seeded[*i].contains(port) {
                return Err(Error::graph(
                    &self.nodes[*i].name,
                    Some(port),
                    "no value supplied for exposed input",
                ));
            }
        }
        Ok(seeded)
    }

    async fn execute(
        &self,
        inputs: PipelineInputs,
        options: RunOptions,
        ctx: RunContext,
    ) -> Result<PipelineOutput> {
        let mut pending = self.seed_inputs(inputs)?;
        let mut remaining: Vec<usize> = vec![0; self.nodes.len()];
        for edge in &self.edge_idx {
            remaining[edge.to] += 1;
        }
        let mut edge_values: Vec<Option<Value>> = vec![None; self.edges.len()];
        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let mut tasks: JoinSet<(usize, Result<Outputs>)> = JoinSet::new();

        tracing::info!("Pipeline {} ({} stages)", RunState::Running, self.nodes.len());
        let started = Instant::now();

        for &i in &self.order {
            if remaining[i] == 0 {
                let stage_inputs = std::mem::take(&mut pending[i]);
                self.spawn_stage(&mut tasks, i, stage_inputs, ctx.clone(), Arc::clone(&semaphore));
            }
        }

        let mut results: BTreeMap<String, Outputs> = BTreeMap::new();
        let mut completed = 0usize;

        while let Some(joined) = tasks.join_next().await {
            let (i, result) = match joined {
                Ok(pair) => pair,
                Err(e) => {
                    tasks.abort_all();
                    tracing::error!("Pipeline {}: task join error: {}", RunState::Failed, e);
                    return Err(Error::internal(format!("Task join error: {}", e)));
                }
            };
            let node = &self.nodes[i];
            let mut outputs = match result {
                Ok(outputs) => outputs,
                Err(e) => {
                    tasks.abort_all();
                    tracing::error!("Pipeline {} at stage '{}': {}", RunState::Failed, node.name, e);
                    return Err(e);
                }
            };
            completed += 1;

            for spec in &node.outputs {
                match outputs.get(&spec.name) {
                    Some(value) if value.port_type() == spec.ty => {}
                    Some(value) => {
                        tasks.abort_all();
                        return Err(Error::graph(
                            &node.name,
                            Some(&spec.name),
                            format!("stage produced {}, declared {}", value.port_type(), spec.ty),
                        ));
                    }
                    None => {
                        tasks.abort_all();
                        return Err(Error::graph(
                            &node.name,
                            Some(&spec.name),
                            "stage did not produce a declared output",
                        ));
                    }
                }
            }

            let mut connected = BTreeSet::new();
            for (e, (edge, ix)) in self.edges.iter().zip(&self.edge_idx).enumerate() {
                if ix.from != i {
                    continue;
                }
                connected.insert(edge.from_port.clone());
                edge_values[e] = outputs.get(&edge.from_port).cloned();
                remaining[ix.to] -= 1;
                if remaining[ix.to] == 0 {
                    let stage_inputs = self.collect_inputs(ix.to, &mut pending, &mut edge_values);
                    self.spawn_stage(&mut tasks, ix.to, stage_inputs, ctx.clone(), Arc::clone(&semaphore));
                }
            }

            if !options.include_outputs_from.contains(&node.name) {
                outputs.retain(|port, _| !connected.contains(port));
            }
            if !outputs.is_empty() {
                results.insert(node.name.clone(), outputs);
            }
        }

        if completed != self.nodes.len() {
            tracing::error!("Pipeline {}: {} of {} stages ran", RunState::Failed, completed, self.nodes.len());
            return Err(Error::internal(format!(
                "only {} of {} stages ran",
                completed,
                self.nodes.len()
            )));
        }

        let counters = ctx.stats().snapshot();
        tracing::info!(
            "Pipeline {} in {:.2}s",
            RunState::Completed,
            started.elapsed().as_secs_f64()
        );

        Ok(PipelineOutput {
            run_id: ctx.run_id(),
            outputs: results,
            counters,
        })
    }

    /// Caller values first, then one value per incoming edge in declaration order
    fn collect_inputs(
        &self,
        node: usize,
        pending: &mut [Inputs],
        edge_values: &mut [Option<Value>],
    ) -> Inputs {
        let mut inputs = std::mem::take(&mut pending[node]);
        for (e, (edge, ix)) in self.edges.iter().zip(&self.edge_idx).enumerate() {
            if ix.to != node {
                continue;
            }
            if let Some(value) = edge_values[e].take() {
                inputs.push(edge.to_port.clone(), value);
            }
        }
        inputs
    }

    fn spawn_stage(
        &self,
        tasks: &mut JoinSet<(usize, Result<Outputs>)>,
        index: usize,
        inputs: Inputs,
        ctx: RunContext,
        semaphore: Arc<Semaphore>,
    ) {
        let node = &self.nodes[index];
        let component = Arc::clone(&node.component);
        let name = node.name.clone();

        let task = async move {
            let result = async {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|e| Error::internal(format!("worker pool closed: {}", e)))?;
                ctx.check_cancelled()?;

                tracing::debug!("Running stage '{}' ({})", name, component.kind());
                let started = Instant::now();
                let outputs = tokio::select! {
                    _ = ctx.cancel_token().cancelled() => Err(Error::Cancelled),
                    result = component.run(inputs, &ctx) => result,
                }?;
                tracing::debug!(
                    "Stage '{}' finished in {:.1}ms",
                    name,
                    started.elapsed().as_secs_f64() * 1000.0
                );
                Ok(outputs)
            }
            .await;
            (index, result.map_err(|e: Error| e.in_stage(name)))
        };
        tasks.spawn(task.in_current_span());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::component::PortType;
    use crate::types::{Document, Metadata};
    use async_trait::async_trait;
    use std::time::Duration;

    struct Tag {
        label: &'static str,
        delay_ms: u64,
    }

    #[async_trait]
    impl Component for Tag {
        fn kind(&self) -> &str {
            "tag"
        }

        fn input_ports(&self) -> Vec<PortSpec> {
            vec![PortSpec::new("documents", PortType::Documents)]
        }

        fn output_ports(&self) -> Vec<PortSpec> {
            vec![PortSpec::new("documents", PortType::Documents)]
        }

        async fn run(&self, mut inputs: Inputs, _ctx: &RunContext) -> Result<Outputs> {
            tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
            let docs = inputs
                .documents("documents")?
                .into_iter()
                .map(|d| Document::new(format!("{}:{}", self.label, d.content), Metadata::new()))
                .collect();
            Ok(Outputs::from([("documents".to_string(), Value::Documents(docs))]))
        }
    }

    struct Merge;

    #[async_trait]
    impl Component for Merge {
        fn kind(&self) -> &str {
            "merge"
        }

        fn input_ports(&self) -> Vec<PortSpec> {
            vec![PortSpec::new("documents", PortType::Documents).variadic()]
        }

        fn output_ports(&self) -> Vec<PortSpec> {
            vec![PortSpec::new("documents", PortType::Documents)]
        }

        async fn run(&self, mut inputs: Inputs, _ctx: &RunContext) -> Result<Outputs> {
            let docs = inputs.documents("documents")?;
            Ok(Outputs::from([("documents".to_string(), Value::Documents(docs))]))
        }
    }

    struct Echo;

    #[async_trait]
    impl Component for Echo {
        fn kind(&self) -> &str {
            "echo"
        }

        fn input_ports(&self) -> Vec<PortSpec> {
            vec![PortSpec::new("text", PortType::Text)]
        }

        fn output_ports(&self) -> Vec<PortSpec> {
            vec![PortSpec::new("text", PortType::Text)]
        }

        async fn run(&self, mut inputs: Inputs, _ctx: &RunContext) -> Result<Outputs> {
            let text = inputs.text("text")?;
            Ok(Outputs::from([("text".to_string(), Value::Text(text))]))
        }
    }

    struct Stall;

    #[async_trait]
    impl Component for Stall {
        fn kind(&self) -> &str {
            "stall"
        }

        fn input_ports(&self) -> Vec<PortSpec> {
            vec![PortSpec::new("documents", PortType::Documents)]
        }

        fn output_ports(&self) -> Vec<PortSpec> {
            vec![PortSpec::new("documents", PortType::Documents)]
        }

        async fn run(&self, _inputs: Inputs, _ctx: &RunContext) -> Result<Outputs> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(Outputs::new())
        }
    }

    fn docs(contents: &[&str]) -> Value {
        Value::Documents(
            contents
                .iter()
                .map(|c| Document::new(*c, Metadata::new()))
                .collect(),
        )
    }

    fn fan_in(first_delay: u64, second_delay: u64) -> Pipeline {
        Pipeline::builder()
            .add_component("first", Tag { label: "first", delay_ms: first_delay })
            .add_component("second", Tag { label: "second", delay_ms: second_delay })
            .add_component("joiner", Merge)
            .connect("first.documents", "joiner.documents")
            .connect("second.documents", "joiner.documents")
            .expose_input("first", "documents")
            .expose_input("second", "documents")
            .build()
            .unwrap()
    }

    fn contents(output: &PipelineOutput, stage: &str) -> Vec<String> {
        match output.get(stage, "documents") {
            Some(Value::Documents(docs)) => docs.iter().map(|d| d.content.clone()).collect(),
            other => panic!("unexpected output: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_fan_in_order_ignores_completion_timing() {
        let inputs = || {
            PipelineInputs::new()
                .with("first", "documents", docs(&["a", "b"]))
                .with("second", "documents", docs(&["c"]))
        };

        let slow_first = fan_in(60, 0).run(inputs(), RunOptions::new()).await.unwrap();
        let slow_second = fan_in(0, 60).run(inputs(), RunOptions::new()).await.unwrap();

        let expected = vec!["first:a", "first:b", "second:c"];
        assert_eq!(contents(&slow_first, "joiner"), expected);
        assert_eq!(contents(&slow_second, "joiner"), expected);
    }

    #[tokio::test]
    async fn test_graph_is_reusable_across_runs() {
        let pipeline = fan_in(0, 0);

        let one = pipeline
            .run(
                PipelineInputs::new()
                    .with("first", "documents", docs(&["x"]))
                    .with("second", "documents", docs(&[])),
                RunOptions::new(),
            )
            .await
            .unwrap();
        let two = pipeline
            .run(
                PipelineInputs::new()
                    .with("first", "documents", docs(&[]))
                    .with("second", "documents", docs(&["y"])),
                RunOptions::new(),
            )
            .await
            .unwrap();

        assert_eq!(contents(&one, "joiner"), vec!["first:x"]);
        assert_eq!(contents(&two, "joiner"), vec!["second:y"]);
        assert_ne!(one.run_id, two.run_id);
    }

    #[tokio::test]
    async fn test_include_outputs_from_returns_intermediate_stage() {
        let output = fan_in(0, 0)
            .run(
                PipelineInputs::new()
                    .with("first", "documents", docs(&["a"]))
                    .with("second", "documents", docs(&["b"])),
                RunOptions::new().include_outputs_from(["first"]),
            )
            .await
            .unwrap();

        assert_eq!(contents(&output, "first"), vec!["first:a"]);
        assert!(output.get("second", "documents").is_none());
    }

    #[test]
    fn test_unconnected_input_is_rejected() {
        let err = Pipeline::builder()
            .add_component("embedder", Echo)
            .build()
            .unwrap_err();
        match err {
            Error::Graph { stage, port, .. } => {
                assert_eq!(stage, "embedder");
                assert_eq!(port.as_deref(), Some("text"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_type_mismatch_is_rejected() {
        let err = Pipeline::builder()
            .add_component("echo", Echo)
            .add_component("joiner", Merge)
            .connect("echo.text", "joiner.documents")
            .expose_input("echo", "text")
            .build()
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("joiner"));
        assert!(msg.contains("type mismatch"));
    }

    #[test]
    fn test_unknown_stage_is_rejected() {
        let err = Pipeline::builder()
            .add_component("splitter", Merge)
            .connect("splitter", "text_embedder")
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::Graph { ref stage, .. } if stage == "text_embedder"));
    }

    #[test]
    fn test_single_input_rejects_second_edge() {
        let err = Pipeline::builder()
            .add_component("a", Tag { label: "a", delay_ms: 0 })
            .add_component("b", Tag { label: "b", delay_ms: 0 })
            .add_component("c", Tag { label: "c", delay_ms: 0 })
            .connect("a", "c")
            .connect("b", "c")
            .expose_input("a", "documents")
            .expose_input("b", "documents")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("single connection"));
    }

    #[test]
    fn test_cycle_is_rejected() {
        let err = Pipeline::builder()
            .add_component("a", Tag { label: "a", delay_ms: 0 })
            .add_component("b", Tag { label: "b", delay_ms: 0 })
            .connect("a", "b")
            .connect("b", "a")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("cycle"));
    }

    #[test]
    fn test_topological_order() {
        let pipeline = Pipeline::builder()
            .add_component("joiner", Merge)
            .add_component("first", Tag { label: "first", delay_ms: 0 })
            .connect("first", "joiner")
            .expose_input("first", "documents")
            .build()
            .unwrap();
        assert_eq!(pipeline.stage_names(), vec!["first", "joiner"]);
    }

    #[tokio::test]
    async fn test_missing_exposed_input_fails_before_running() {
        let err = fan_in(0, 0)
            .run(
                PipelineInputs::new().with("first", "documents", docs(&["a"])),
                RunOptions::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Graph { ref stage, .. } if stage == "second"));
    }

    #[tokio::test]
    async fn test_cancellation_aborts_in_flight_stages() {
        let pipeline = Pipeline::builder()
            .add_component("stall", Stall)
            .add_component("after", Tag { label: "after", delay_ms: 0 })
            .connect("stall", "after")
            .expose_input("stall", "documents")
            .build()
            .unwrap();

        let token = CancellationToken::new();
        let trigger = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let err = pipeline
            .run(
                PipelineInputs::new().with("stall", "documents", docs(&["a"])),
                RunOptions::new().with_cancel(token),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }
}
