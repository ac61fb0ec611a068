//! Compiles a parsed `Program` (§4.1 "Compilation") into a `Graph`: assigns
//! stable node IDs, resolves stream-vs-batch edge shapes, inserts a
//! `FanoutNode` at every variable referenced by more than one downstream
//! consumer (§9), and constructs the node trait objects via a `match` on
//! kind name (the heterogeneous-constructor half of the §9 node-kind
//! registry; `registry.rs` holds the metadata half).

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use vortex_grammar::Expr;
use vortex_shared::edge::EdgeReceiver;
use vortex_shared::model::{Batch, Dimensions, Point};
use vortex_shared::VortexError;

use crate::alerting::AlertLevel;
use crate::graph::Graph;
use crate::kernel::{Node, NodeId};
use crate::mediator::Mediators;
use crate::nodes::aggregate::{AggregateFn, AggregateNode};
use crate::nodes::alert::{AlertNode, LevelPredicate};
use crate::nodes::eval_node::EvalNode;
use crate::nodes::fanout::FanoutNode;
use crate::nodes::filter::{FromNode, WhereNode};
use crate::nodes::group_by::GroupByNode;
use crate::nodes::join::{FillPolicy, JoinNode};
use crate::nodes::sinks::{HttpOutNode, InfluxOutNode, KafkaOutNode, LogOutNode};
use crate::nodes::sources::{BatchSourceNode, StreamSourceNode};
use crate::nodes::state_track::{StateTrackMode, StateTrackNode};
use crate::nodes::union::UnionNode;
use crate::program::{MethodArg, MethodCall, PipelineChain, Program, Root, Stage, VarValue};
use crate::props::{Properties, PropertyValue};
use crate::registry;

/// The output of a compiled stage, still unattached to whatever consumes
/// it next.
enum Pipe {
    Stream(EdgeReceiver<Point>),
    Batch(EdgeReceiver<Batch>),
}

impl Pipe {
    fn shape(&self) -> registry::EdgeShape {
        match self {
            Pipe::Stream(_) => registry::EdgeShape::Stream,
            Pipe::Batch(_) => registry::EdgeShape::Batch,
        }
    }

    fn into_stream(self) -> Result<EdgeReceiver<Point>, VortexError> {
        match self {
            Pipe::Stream(rx) => Ok(rx),
            Pipe::Batch(_) => Err(VortexError::ValidationError("expected a stream edge, found batch".to_string())),
        }
    }

    fn into_batch(self) -> Result<EdgeReceiver<Batch>, VortexError> {
        match self {
            Pipe::Batch(rx) => Ok(rx),
            Pipe::Stream(_) => Err(VortexError::ValidationError("expected a batch edge, found stream".to_string())),
        }
    }
}

pub struct Compiler {
    next_id: NodeId,
    nodes: Vec<Box<dyn Node>>,
    edge_capacity: usize,
    mediators: Mediators,
    /// Scalar (non-pipeline) `var` values, substituted into every parsed
    /// expression at compile time before a node ever sees it.
    scalars: HashMap<String, Expr>,
}

impl Compiler {
    pub fn new(edge_capacity: usize, mediators: Mediators) -> Self {
        Self {
            next_id: 1,
            nodes: Vec::new(),
            edge_capacity,
            mediators,
            scalars: HashMap::new(),
        }
    }

    fn alloc_id(&mut self) -> NodeId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn edge<T>(&self) -> (vortex_shared::edge::EdgeSender<T>, EdgeReceiver<T>) {
        vortex_shared::edge::edge(self.edge_capacity)
    }

    /// Compile `program` against `ingest` (the task's raw point feed) into
    /// a runnable `Graph`.
    pub fn compile(mut self, program: &Program, ingest: EdgeReceiver<Point>) -> Result<Graph, VortexError> {
        for dbrp in &program.dbrps {
            tracing::debug!(db = %dbrp.database, rp = %dbrp.retention_policy, "dbrp scope bound");
        }

        let mut ingest = Some(ingest);
        let ref_counts = count_var_refs(program);
        let mut var_pipes: HashMap<String, VecDeque<Pipe>> = HashMap::new();

        for decl in &program.vars {
            match &decl.value {
                VarValue::Literal(arg) => {
                    if let Some(expr) = arg_to_scalar_expr(arg) {
                        self.scalars.insert(decl.name.clone(), expr);
                    }
                }
                VarValue::Pipeline(chain) => {
                    let pipe = self.compile_chain(chain, &mut ingest, &mut var_pipes)?;
                    let refs = ref_counts.get(&decl.name).copied().unwrap_or(1).max(1);
                    let fanned = self.fan_out(pipe, refs)?;
                    var_pipes.insert(decl.name.clone(), fanned);
                }
            }
        }

        for stmt in &program.statements {
            self.compile_chain(stmt, &mut ingest, &mut var_pipes)?;
        }

        Ok(Graph::new(self.nodes))
    }

    /// Split `pipe` into `n` independent consumer queues. `n == 1` avoids
    /// the fan-out node entirely.
    fn fan_out(&mut self, pipe: Pipe, n: usize) -> Result<VecDeque<Pipe>, VortexError> {
        if n <= 1 {
            let mut q = VecDeque::new();
            q.push_back(pipe);
            return Ok(q);
        }
        let id = self.alloc_id();
        match pipe {
            Pipe::Stream(input) => {
                let mut senders = Vec::with_capacity(n);
                let mut q = VecDeque::new();
                for _ in 0..n {
                    let (tx, rx) = self.edge::<Point>();
                    senders.push(tx);
                    q.push_back(Pipe::Stream(rx));
                }
                self.nodes.push(Box::new(FanoutNode::new(id, input, senders)));
                Ok(q)
            }
            Pipe::Batch(input) => {
                let mut senders = Vec::with_capacity(n);
                let mut q = VecDeque::new();
                for _ in 0..n {
                    let (tx, rx) = self.edge::<Batch>();
                    senders.push(tx);
                    q.push_back(Pipe::Batch(rx));
                }
                self.nodes.push(Box::new(FanoutNode::new(id, input, senders)));
                Ok(q)
            }
        }
    }

    fn take_var_pipe(&self, var_pipes: &mut HashMap<String, VecDeque<Pipe>>, name: &str) -> Result<Pipe, VortexError> {
        var_pipes
            .get_mut(name)
            .and_then(|q| q.pop_front())
            .ok_or_else(|| VortexError::ValidationError(format!("undeclared or exhausted variable {name:?}")))
    }

    fn compile_chain(
        &mut self,
        chain: &PipelineChain,
        ingest: &mut Option<EdgeReceiver<Point>>,
        var_pipes: &mut HashMap<String, VecDeque<Pipe>>,
    ) -> Result<Pipe, VortexError> {
        let mut pipe = match &chain.root {
            Root::Stream => {
                let id = self.alloc_id();
                let raw = ingest
                    .take()
                    .ok_or_else(|| VortexError::ValidationError("program has more than one `stream` root".to_string()))?;
                let (tx, rx) = self.edge::<Point>();
                self.nodes.push(Box::new(StreamSourceNode::new(id, raw, tx)));
                Pipe::Stream(rx)
            }
            Root::Batch => {
                // The first `query(...)` stage supplies the batch-source's
                // parameters; until then there is no edge to hand back, so
                // thread a placeholder through `compile_stage`'s first
                // iteration via a zero-capacity marker is unnecessary: batch
                // programs always open with `query(...)` as their first
                // stage (§8 scenario 2), which this falls through to below.
                return self.compile_batch_root(chain, var_pipes);
            }
            Root::Var(name) => self.take_var_pipe(var_pipes, name)?,
        };

        for stage in &chain.stages {
            pipe = self.compile_stage(stage, pipe, var_pipes)?;
        }
        Ok(pipe)
    }

    /// `batch` roots have no edge until their `query(...)` stage runs, so
    /// the root stage is compiled specially rather than forcing `Pipe` to
    /// carry an `Option`.
    fn compile_batch_root(
        &mut self,
        chain: &PipelineChain,
        var_pipes: &mut HashMap<String, VecDeque<Pipe>>,
    ) -> Result<Pipe, VortexError> {
        let (first, rest) = chain
            .stages
            .split_first()
            .ok_or_else(|| VortexError::ValidationError("`batch` root requires a query(...) stage".to_string()))?;
        if first.kind != "query" {
            return Err(VortexError::ValidationError(format!(
                "`batch` root's first stage must be query(...), found {}",
                first.kind
            )));
        }
        let id = self.alloc_id();
        let query = arg_str(first.args.first())?;
        let measurement = method_str_or(&first.methods, "measurement", "batch").unwrap_or_else(|| "batch".to_string());
        let period_ns = method_duration_or(&first.methods, "every", 60_000_000_000);
        let (tx, rx) = self.edge::<Batch>();
        self.nodes.push(Box::new(BatchSourceNode::new(
            id,
            query,
            measurement,
            Duration::from_nanos(period_ns.max(1) as u64),
            self.mediators.tsdb_client.clone(),
            self.mediators.clock.clone(),
            tx,
        )));
        let mut pipe = Pipe::Batch(rx);
        for stage in rest {
            pipe = self.compile_stage(stage, pipe, var_pipes)?;
        }
        Ok(pipe)
    }

    fn compile_stage(
        &mut self,
        stage: &Stage,
        input: Pipe,
        var_pipes: &mut HashMap<String, VecDeque<Pipe>>,
    ) -> Result<Pipe, VortexError> {
        let spec = registry::lookup(&stage.kind)?;
        if spec.arity == registry::Arity::One && input.shape() != spec.input_shape {
            return Err(VortexError::ValidationError(format!(
                "{} expects a {:?} input, found {:?}",
                stage.kind,
                spec.input_shape,
                input.shape()
            )));
        }

        if registry::is_aggregate_fn(&stage.kind) {
            return self.compile_aggregate(stage, input);
        }

        match stage.kind.as_str() {
            "from" => self.compile_from(stage, input),
            "where" | "eval" => self.compile_expr_stage(stage, input),
            "groupBy" => self.compile_group_by(stage, input),
            "window" => self.compile_window(stage, input),
            "join" => self.compile_join(stage, input, var_pipes),
            "union" => self.compile_union(stage, input, var_pipes),
            "stateDuration" => self.compile_state_track(stage, input, StateTrackMode::Duration),
            "stateCount" => self.compile_state_track(stage, input, StateTrackMode::Count),
            "alert" => self.compile_alert(stage, input),
            "httpOut" => self.compile_http_out(stage, input),
            "influxDBOut" => self.compile_influx_out(input),
            "kafkaOut" => self.compile_kafka_out(stage, input),
            "logOut" => self.compile_log_out(input),
            other => Err(VortexError::ValidationError(format!("unhandled node kind {other:?}"))),
        }
    }

    fn compile_from(&mut self, stage: &Stage, input: Pipe) -> Result<Pipe, VortexError> {
        let id = self.alloc_id();
        let props = stage_properties(stage);
        let (tx, rx) = self.edge::<Point>();
        self.nodes.push(Box::new(FromNode::new(id, &props, input.into_stream()?, tx)?));
        Ok(Pipe::Stream(rx))
    }

    fn compile_expr_stage(&mut self, stage: &Stage, input: Pipe) -> Result<Pipe, VortexError> {
        let id = self.alloc_id();
        let input = input.into_stream()?;
        if stage.kind == "where" {
            let expr = self.resolve_lambda(stage.args.first())?;
            let props = Properties::new().with("expr", PropertyValue::Expr(expr));
            let (tx, rx) = self.edge::<Point>();
            self.nodes.push(Box::new(WhereNode::new(id, &props, input, tx)?));
            Ok(Pipe::Stream(rx))
        } else {
            let quiet = method_bool_or(&stage.methods, "quiet", false);
            // `eval(lambda: <expr>).as('name')` — each stage arg pairs
            // positionally with an `.as(...)` method call naming its field.
            let as_names: Vec<&MethodCall> = stage.methods.iter().filter(|m| m.name == "as").collect();
            let mut pairs = Vec::new();
            for (i, arg) in stage.args.iter().enumerate() {
                let expr = self.resolve_expr_arg(arg)?;
                let name = as_names
                    .get(i)
                    .and_then(|m| m.args.first())
                    .and_then(arg_str_opt)
                    .unwrap_or_else(|| format!("eval{i}"));
                pairs.push((name, expr));
            }
            let (tx, rx) = self.edge::<Point>();
            self.nodes.push(Box::new(EvalNode::new(id, pairs, quiet, input, tx)?));
            Ok(Pipe::Stream(rx))
        }
    }

    fn compile_group_by(&mut self, stage: &Stage, input: Pipe) -> Result<Pipe, VortexError> {
        let id = self.alloc_id();
        let tag_keys: Vec<String> = stage.args.iter().filter_map(arg_str_opt).collect();
        let by_measurement = method_bool_or(&stage.methods, "byMeasurement", false);
        let (tx, rx) = self.edge::<Point>();
        self.nodes.push(Box::new(GroupByNode::new(
            id,
            Dimensions::new(tag_keys, by_measurement),
            input.into_stream()?,
            tx,
        )));
        Ok(Pipe::Stream(rx))
    }

    fn compile_window(&mut self, stage: &Stage, input: Pipe) -> Result<Pipe, VortexError> {
        let id = self.alloc_id();
        let every_ns = method_duration_or(&stage.methods, "every", 0);
        let period_ns = method_duration_or(&stage.methods, "period", every_ns);
        let late_tolerance_ns = method_duration_or(&stage.methods, "lateTolerance", 0);
        let (tx, rx) = self.edge::<Batch>();
        self.nodes.push(Box::new(crate::nodes::window::WindowNode::new(
            id,
            every_ns,
            period_ns.max(every_ns),
            late_tolerance_ns,
            input.into_stream()?,
            tx,
        )));
        Ok(Pipe::Batch(rx))
    }

    fn compile_join(
        &mut self,
        stage: &Stage,
        input: Pipe,
        var_pipes: &mut HashMap<String, VecDeque<Pipe>>,
    ) -> Result<Pipe, VortexError> {
        let id = self.alloc_id();
        let mut input_names = vec!["left".to_string()];
        let mut inputs = vec![input.into_stream()?];
        for (i, arg) in stage.args.iter().enumerate() {
            if let MethodArg::Ident(name) = arg {
                let pipe = self.take_var_pipe(var_pipes, name)?;
                inputs.push(pipe.into_stream()?);
                input_names.push(name.clone());
            } else {
                input_names.push(format!("in{}", i + 1));
            }
        }
        let tolerance_ns = method_duration_or(&stage.methods, "tolerance", 0);
        let fill = match method_str_or(&stage.methods, "fill", "none").as_deref() {
            Some("null") | Some("Null") => FillPolicy::Null,
            Some(other) => other.parse::<f64>().map(FillPolicy::NumericDefault).unwrap_or(FillPolicy::None),
            None => FillPolicy::None,
        };
        let (tx, rx) = self.edge::<Point>();
        self.nodes.push(Box::new(JoinNode::new(id, input_names, tolerance_ns, fill, inputs, tx)));
        Ok(Pipe::Stream(rx))
    }

    fn compile_union(
        &mut self,
        stage: &Stage,
        input: Pipe,
        var_pipes: &mut HashMap<String, VecDeque<Pipe>>,
    ) -> Result<Pipe, VortexError> {
        let id = self.alloc_id();
        let mut inputs = vec![input.into_stream()?];
        for arg in &stage.args {
            if let MethodArg::Ident(name) = arg {
                let pipe = self.take_var_pipe(var_pipes, name)?;
                inputs.push(pipe.into_stream()?);
            }
        }
        let (tx, rx) = self.edge::<Point>();
        self.nodes.push(Box::new(UnionNode::new(id, inputs, tx)));
        Ok(Pipe::Stream(rx))
    }

    fn compile_aggregate(&mut self, stage: &Stage, input: Pipe) -> Result<Pipe, VortexError> {
        let id = self.alloc_id();
        let field = arg_str(stage.args.first())?;
        let arg1 = stage.args.get(1).and_then(arg_num_opt);
        let func = AggregateFn::parse(&stage.kind, arg1)?;
        let as_name = method_str_or(&stage.methods, "as", &field).unwrap_or(field.clone());
        let (tx, rx) = self.edge::<Batch>();
        self.nodes.push(Box::new(AggregateNode::new(id, field, as_name, func, input.into_batch()?, tx)));
        Ok(Pipe::Batch(rx))
    }

    fn compile_state_track(&mut self, stage: &Stage, input: Pipe, mode: StateTrackMode) -> Result<Pipe, VortexError> {
        let id = self.alloc_id();
        let expr = self.resolve_lambda(stage.args.first())?;
        let as_name = method_str_or(&stage.methods, "as", "state").unwrap_or_else(|| "state".to_string());
        let (tx, rx) = self.edge::<Point>();
        self.nodes.push(Box::new(StateTrackNode::new(id, mode, expr, as_name, input.into_stream()?, tx)?));
        Ok(Pipe::Stream(rx))
    }

    fn compile_alert(&mut self, stage: &Stage, input: Pipe) -> Result<Pipe, VortexError> {
        let id = self.alloc_id();
        let topic = method_str_or(&stage.methods, "id", "alert").unwrap_or_else(|| "alert".to_string());
        let id_template = method_str_or(&stage.methods, "id", "{{group}}").unwrap_or_else(|| "{{group}}".to_string());
        let history_cap = method_num_or(&stage.methods, "history", 0.0) as usize;
        let state_changes_only = method_bool_or(&stage.methods, "stateChangesOnly", false);
        let rate_limit_ns = method_duration_or(&stage.methods, "every", 0);
        let inhibit_topics: Vec<String> = stage
            .methods
            .iter()
            .filter(|m| m.name == "inhibit")
            .filter_map(|m| m.args.first().and_then(arg_str_opt))
            .collect();

        let mut predicates = Vec::new();
        for (name, level) in [("crit", AlertLevel::Critical), ("warn", AlertLevel::Warning), ("info", AlertLevel::Info)] {
            if let Some(call) = stage.methods.iter().find(|m| m.name == name) {
                let expr = self.resolve_lambda(call.args.first())?;
                predicates.push(LevelPredicate { level, expr });
            }
        }

        self.nodes.push(Box::new(AlertNode::new(
            id,
            topic,
            predicates,
            id_template,
            history_cap,
            state_changes_only,
            rate_limit_ns,
            inhibit_topics,
            self.mediators.topic_bus.clone(),
            self.mediators.inhibitors.clone(),
            self.mediators.clock.clone(),
            input.into_stream()?,
        )?));
        // alert is terminal: it has no output `Pipe` to hand back. Callers
        // that chain further off an alert stage get a validation error at
        // compile time (it is consumed with a `Pipe` placeholder that errors
        // on use), matching every canonical grammar this engine accepts.
        Ok(Pipe::Stream(self.edge::<Point>().1))
    }

    fn compile_http_out(&mut self, stage: &Stage, input: Pipe) -> Result<Pipe, VortexError> {
        let id = self.alloc_id();
        let name = arg_str(stage.args.first())?;
        self.nodes.push(Box::new(HttpOutNode::new(id, name, self.mediators.http_table.clone(), input.into_batch()?)));
        Ok(Pipe::Batch(self.edge::<Batch>().1))
    }

    fn compile_influx_out(&mut self, input: Pipe) -> Result<Pipe, VortexError> {
        let id = self.alloc_id();
        self.nodes.push(Box::new(InfluxOutNode::new(
            id,
            self.mediators.influx_client.clone(),
            self.mediators.retry_policy,
            input.into_batch()?,
        )));
        Ok(Pipe::Batch(self.edge::<Batch>().1))
    }

    fn compile_kafka_out(&mut self, stage: &Stage, input: Pipe) -> Result<Pipe, VortexError> {
        let id = self.alloc_id();
        let topic = arg_str(stage.args.first())?;
        self.nodes.push(Box::new(KafkaOutNode::new(
            id,
            topic,
            self.mediators.kafka_client.clone(),
            self.mediators.retry_policy,
            input.into_batch()?,
        )));
        Ok(Pipe::Batch(self.edge::<Batch>().1))
    }

    fn compile_log_out(&mut self, input: Pipe) -> Result<Pipe, VortexError> {
        let id = self.alloc_id();
        self.nodes.push(Box::new(LogOutNode::new(id, input.into_stream()?)));
        Ok(Pipe::Stream(self.edge::<Point>().1))
    }

    /// Resolve a `lambda: <expr>` stage/method argument, substituting any
    /// scalar program variables referenced by identifier.
    fn resolve_lambda(&self, arg: Option<&MethodArg>) -> Result<Expr, VortexError> {
        match arg {
            Some(MethodArg::Lambda(expr)) => Ok(substitute_vars(expr, &self.scalars)),
            _ => Err(VortexError::ValidationError("expected a lambda: <expr> argument".to_string())),
        }
    }

    fn resolve_expr_arg(&self, arg: &MethodArg) -> Result<Expr, VortexError> {
        match arg {
            MethodArg::Lambda(expr) => Ok(substitute_vars(expr, &self.scalars)),
            MethodArg::Ident(name) => self
                .scalars
                .get(name)
                .cloned()
                .ok_or_else(|| VortexError::ValidationError(format!("unbound variable {name:?}"))),
            other => Err(VortexError::ValidationError(format!("expected an expression argument, found {other:?}"))),
        }
    }
}

fn arg_to_scalar_expr(arg: &MethodArg) -> Option<Expr> {
    match arg {
        MethodArg::Str(s) => Some(Expr::Str(s.clone())),
        MethodArg::Num(n) => Some(Expr::Number(*n)),
        MethodArg::Bool(b) => Some(Expr::Bool(*b)),
        MethodArg::Duration(ns) => Some(Expr::Number(*ns as f64)),
        MethodArg::Lambda(e) => Some(e.clone()),
        MethodArg::Ident(_) | MethodArg::List(_) => None,
    }
}

/// Replace every `Expr::Ident(name)` matching a declared scalar variable
/// with its literal value; identifiers that don't match a declared
/// variable are left alone (they resolve against point fields/tags at
/// evaluation time instead).
fn substitute_vars(expr: &Expr, scalars: &HashMap<String, Expr>) -> Expr {
    match expr {
        Expr::Ident(name) => scalars.get(name).cloned().unwrap_or_else(|| expr.clone()),
        Expr::Unary { op, expr } => Expr::Unary { op: *op, expr: Box::new(substitute_vars(expr, scalars)) },
        Expr::Binary { op, left, right } => Expr::Binary {
            op: *op,
            left: Box::new(substitute_vars(left, scalars)),
            right: Box::new(substitute_vars(right, scalars)),
        },
        Expr::Call { name, args } => Expr::Call {
            name: name.clone(),
            args: args.iter().map(|a| substitute_vars(a, scalars)).collect(),
        },
        other => other.clone(),
    }
}

fn stage_properties(stage: &Stage) -> Properties {
    let mut props = Properties::new();
    if let Some(m) = stage.methods.iter().find(|m| m.name == "measurement") {
        if let Some(s) = m.args.first().and_then(arg_str_opt) {
            props = props.with("measurement", PropertyValue::Str(s));
        }
    }
    props
}

fn arg_str(arg: Option<&MethodArg>) -> Result<String, VortexError> {
    arg.and_then(arg_str_opt).ok_or_else(|| VortexError::ValidationError("expected a string argument".to_string()))
}

fn arg_str_opt(arg: &MethodArg) -> Option<String> {
    match arg {
        MethodArg::Str(s) => Some(s.clone()),
        MethodArg::Ident(s) => Some(s.clone()),
        _ => None,
    }
}

fn arg_num_opt(arg: &MethodArg) -> Option<f64> {
    match arg {
        MethodArg::Num(n) => Some(*n),
        MethodArg::Duration(ns) => Some(*ns as f64),
        _ => None,
    }
}

fn method_str_or(methods: &[MethodCall], name: &str, default: &str) -> Option<String> {
    methods
        .iter()
        .find(|m| m.name == name)
        .and_then(|m| m.args.first())
        .and_then(arg_str_opt)
        .or_else(|| Some(default.to_string()))
}

fn method_bool_or(methods: &[MethodCall], name: &str, default: bool) -> bool {
    methods
        .iter()
        .find(|m| m.name == name)
        .and_then(|m| m.args.first())
        .and_then(|a| match a {
            MethodArg::Bool(b) => Some(*b),
            _ => None,
        })
        .unwrap_or(default)
}

fn method_num_or(methods: &[MethodCall], name: &str, default: f64) -> f64 {
    methods
        .iter()
        .find(|m| m.name == name)
        .and_then(|m| m.args.first())
        .and_then(arg_num_opt)
        .unwrap_or(default)
}

fn method_duration_or(methods: &[MethodCall], name: &str, default: i64) -> i64 {
    methods
        .iter()
        .find(|m| m.name == name)
        .and_then(|m| m.args.first())
        .and_then(|a| match a {
            MethodArg::Duration(ns) => Some(*ns),
            MethodArg::Num(n) => Some(*n as i64),
            _ => None,
        })
        .unwrap_or(default)
}

/// How many times each `var` name is referenced as a pipeline root across
/// every statement and every other `var`'s pipeline (direct `Root::Var`
/// references plus `join`/`union` stage-argument references).
fn count_var_refs(program: &Program) -> HashMap<String, usize> {
    let mut counts = HashMap::new();
    let mut visit_chain = |chain: &PipelineChain, counts: &mut HashMap<String, usize>| {
        if let Root::Var(name) = &chain.root {
            *counts.entry(name.clone()).or_insert(0) += 1;
        }
        for stage in &chain.stages {
            for arg in &stage.args {
                if let MethodArg::Ident(name) = arg {
                    if matches!(stage.kind.as_str(), "join" | "union") {
                        *counts.entry(name.clone()).or_insert(0) += 1;
                    }
                }
            }
        }
    };
    for decl in &program.vars {
        if let VarValue::Pipeline(chain) = &decl.value {
            visit_chain(chain, &mut counts);
        }
    }
    for stmt in &program.statements {
        visit_chain(stmt, &mut counts);
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mediator::{FixtureTsdbClient, RecordingWriteClient};
    use crate::nodes::sinks::HttpOutTable;
    use vortex_shared::edge::edge;
    use vortex_shared::model::Value;
    use vortex_shared::LogicalClock;

    fn test_mediators() -> Mediators {
        Mediators {
            tsdb_client: Arc::new(FixtureTsdbClient::new(Vec::new())),
            influx_client: Arc::new(RecordingWriteClient::new(0)),
            kafka_client: Arc::new(RecordingWriteClient::new(0)),
            topic_bus: crate::alerting::TopicBus::new(),
            inhibitors: crate::alerting::InhibitorRegistry::new(),
            http_table: HttpOutTable::new(),
            clock: Arc::new(LogicalClock::new(0)),
            retry_policy: vortex_shared::resilience::RetryPolicy::default(),
        }
    }

    #[tokio::test]
    async fn compiles_stream_threshold_scenario() {
        let program = crate::program::parse_program(
            "stream|from().measurement('cpu')|alert().crit(lambda: usage_idle < 10)",
        )
        .unwrap();
        let (ingest_tx, ingest_rx) = edge::<Point>(8);
        let compiler = Compiler::new(8, test_mediators());
        let graph = compiler.compile(&program, ingest_rx).unwrap();
        assert_eq!(graph.node_count(), 2);

        ingest_tx
            .send(Point::new("cpu", 1).with_field("usage_idle", Value::Float(5.0)))
            .await
            .unwrap();
        drop(ingest_tx);
        graph.run_to_completion().await.unwrap();
    }

    #[test]
    fn rejects_batch_input_into_a_stream_only_stage() {
        let program = crate::program::parse_program("batch|query('SELECT v FROM m')|from().measurement('cpu')").unwrap();
        let (_tx, ingest_rx) = edge::<Point>(8);
        let compiler = Compiler::new(8, test_mediators());
        assert!(compiler.compile(&program, ingest_rx).is_err());
    }

    #[test]
    fn fans_out_a_shared_variable_to_two_consumers() {
        let program =
            crate::program::parse_program("var x = stream|from()\nx|logOut()\nx|logOut()").unwrap();
        let (_tx, ingest_rx) = edge::<Point>(8);
        let compiler = Compiler::new(8, test_mediators());
        let graph = compiler.compile(&program, ingest_rx).unwrap();
        // stream-source + fanout + two log-out nodes.
        assert_eq!(graph.node_count(), 4);
    }
}
