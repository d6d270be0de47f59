//! Pipeline runner.
//!
//! Drives every task of a crew through `Pending -> Running -> Completed | Failed`.
//! A task starts only once all of its context tasks have completed; when a task
//! fails, everything downstream of it stays pending while independent tasks keep
//! going. Configuration problems (unknown agents, missing template inputs,
//! unusable models) surface before the first backend call.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde_json::json;

use crate::agent::RoleKey;
use crate::cli::ExecutionMode;
use crate::error::CrewError;
use crate::graph::TaskGraph;
use crate::llm::{ChatMessage, CompletionRequest, LlmBackend};
use crate::prompt::{AgentPersona, build_messages};
use crate::provider::{BackendFactory, ModelRef};
use crate::rate_limit::RequestRateLimiter;
use crate::registry::AgentRegistry;
use crate::result::{
    PipelineResult, StateTransition, TaskFailure, TaskOutcome, TaskResult, TaskState,
};
use crate::retry::{RetryPolicy, call_with_retry};
use crate::task::{OutputContract, TaskId, interpolate};
use crate::telemetry::TelemetrySink;

/// A task with every template rendered, ready to be turned into a backend request.
#[derive(Debug, Clone)]
pub struct PreparedTask {
    pub index: usize,
    pub id: TaskId,
    pub persona: AgentPersona,
    pub description: String,
    pub expected_output: String,
    pub output_path: Option<PathBuf>,
}

pub struct Pipeline {
    crew: String,
    registry: AgentRegistry,
    graph: TaskGraph,
    backends: HashMap<RoleKey, Arc<dyn LlmBackend>>,
    limiter: Arc<RequestRateLimiter>,
    retry: RetryPolicy,
    execution: ExecutionMode,
    output_dir: PathBuf,
    telemetry: TelemetrySink,
}

impl Pipeline {
    /// Checks that every task's agent exists and builds one backend per distinct model.
    pub fn new(
        crew: impl Into<String>,
        registry: AgentRegistry,
        graph: TaskGraph,
        factory: &dyn BackendFactory,
    ) -> Result<Self, CrewError> {
        graph.validate_agents(&registry)?;

        let mut by_model = HashMap::<ModelRef, Arc<dyn LlmBackend>>::new();
        let mut backends = HashMap::new();
        for agent in registry.iter() {
            let backend = match by_model.get(&agent.model) {
                Some(existing) => Arc::clone(existing),
                None => {
                    let built = factory.build(&agent.model)?;
                    by_model.insert(agent.model.clone(), Arc::clone(&built));
                    built
                }
            };
            backends.insert(agent.role.clone(), backend);
        }

        Ok(Self {
            crew: crew.into(),
            registry,
            graph,
            backends,
            limiter: Arc::new(RequestRateLimiter::per_minute(None)),
            retry: RetryPolicy::default(),
            execution: ExecutionMode::Sequential,
            output_dir: PathBuf::from("."),
            telemetry: TelemetrySink::disabled(),
        })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_max_rpm(self, max_rpm: Option<u32>) -> Self {
        self.with_rate_limiter(Arc::new(RequestRateLimiter::per_minute(max_rpm)))
    }

    pub fn with_rate_limiter(mut self, limiter: Arc<RequestRateLimiter>) -> Self {
        self.limiter = limiter;
        self
    }

    pub fn with_execution(mut self, execution: ExecutionMode) -> Self {
        self.execution = execution;
        self
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    pub fn with_telemetry(mut self, telemetry: TelemetrySink) -> Self {
        self.telemetry = telemetry;
        self
    }

    pub fn crew(&self) -> &str {
        &self.crew
    }

    pub fn registry(&self) -> &AgentRegistry {
        &self.registry
    }

    pub fn graph(&self) -> &TaskGraph {
        &self.graph
    }

    /// Renders every template against `inputs`. Fails on the first missing input.
    pub fn prepare(&self, inputs: &BTreeMap<String, String>) -> Result<Vec<PreparedTask>, CrewError> {
        self.graph
            .execution_order()
            .into_iter()
            .map(|index| {
                let task = self.graph.task(index);
                let agent = self.registry.get(&task.agent)?;
                let in_task = |err: CrewError| match err {
                    CrewError::InvalidConfiguration(message) => {
                        CrewError::config(format!("task '{}': {}", task.id, message))
                    }
                    other => other,
                };

                let persona = AgentPersona {
                    role: agent.role.to_string(),
                    goal: interpolate(&agent.goal, inputs).map_err(in_task)?,
                    backstory: interpolate(&agent.backstory, inputs).map_err(in_task)?,
                };
                Ok(PreparedTask {
                    index,
                    id: task.id.clone(),
                    persona,
                    description: interpolate(&task.description, inputs).map_err(in_task)?,
                    expected_output: interpolate(&task.expected_output, inputs)
                        .map_err(in_task)?,
                    output_path: task
                        .output_file
                        .as_deref()
                        .map(|path| resolve_output_path(&self.output_dir, path)),
                })
            })
            .collect()
    }

    pub async fn kickoff(
        &self,
        inputs: &BTreeMap<String, String>,
    ) -> Result<PipelineResult, CrewError> {
        let prepared = self.prepare(inputs)?;
        let started_at = Utc::now();
        let clock = Instant::now();

        tracing::info!(
            crew = %self.crew,
            tasks = self.graph.len(),
            execution = ?self.execution,
            max_rpm = ?self.limiter.max_requests(),
            "crew kickoff"
        );
        self.telemetry.emit(
            "pipeline.started",
            json!({
                "crew": self.crew,
                "tasks": self.graph.len(),
                "execution": format!("{:?}", self.execution).to_lowercase(),
            }),
        );

        let mut run = RunState::new(&self.graph);
        loop {
            let ready = run.ready(&self.graph);
            if ready.is_empty() {
                break;
            }
            let batch = match self.execution {
                ExecutionMode::Sequential => vec![ready[0]],
                ExecutionMode::Concurrent => ready,
            };

            let mut jobs = Vec::with_capacity(batch.len());
            for idx in batch {
                run.transition(idx, TaskState::Running);
                let job = self.job_for(&prepared[idx], &run)?;
                tracing::info!(task = %job.id, agent = %job.agent, "task started");
                self.telemetry.emit(
                    "task.started",
                    json!({
                        "crew": self.crew,
                        "task": job.id.as_str(),
                        "agent": job.agent,
                        "short_circuit": job.fixed_output.is_some(),
                    }),
                );
                jobs.push(job);
            }

            for (idx, outcome) in self.run_batch(jobs).await? {
                self.finish(&mut run, idx, outcome);
            }
        }

        let blocked = run.settle_blocked(&self.graph);
        for (idx, upstream) in &blocked {
            tracing::warn!(
                task = %run.ids[*idx],
                blocked_by = %upstream,
                "task not run: an upstream task failed"
            );
            self.telemetry.emit(
                "task.blocked",
                json!({
                    "crew": self.crew,
                    "task": run.ids[*idx].as_str(),
                    "blocked_by": upstream.as_str(),
                }),
            );
        }

        let result = run.into_result(self.crew.clone(), started_at);
        let failed = result.failures().count();
        let completed = result.task_results().count();
        tracing::info!(
            crew = %self.crew,
            completed,
            failed,
            blocked = blocked.len(),
            elapsed_ms = clock.elapsed().as_millis() as u64,
            "crew finished"
        );
        self.telemetry.emit(
            "pipeline.completed",
            json!({
                "crew": self.crew,
                "completed": completed,
                "failed": failed,
                "blocked": blocked.len(),
                "duration_ms": clock.elapsed().as_millis() as u64,
            }),
        );
        Ok(result)
    }

    fn job_for(&self, prepared: &PreparedTask, run: &RunState) -> Result<TaskJob, CrewError> {
        let task = self.graph.task(prepared.index);
        let agent = self.registry.get(&task.agent)?;
        let backend = self
            .backends
            .get(&task.agent)
            .cloned()
            .ok_or_else(|| CrewError::not_found("backend for agent", task.agent.as_str()))?;

        let context = self
            .graph
            .dependencies(prepared.index)
            .iter()
            .filter_map(|dep| run.results[*dep].as_ref().map(|r| r.raw.as_str()))
            .collect::<Vec<_>>();

        let fixed_output = task.short_circuit.as_ref().and_then(|rule| {
            let dep = self.graph.index_of(&rule.when)?;
            let upstream = run.results[dep].as_ref()?;
            rule.matches(&upstream.raw).then(|| rule.output.clone())
        });

        Ok(TaskJob {
            index: prepared.index,
            id: prepared.id.clone(),
            agent: agent.role.to_string(),
            model: agent.model.to_string(),
            description: prepared.description.clone(),
            messages: build_messages(
                &prepared.persona,
                &prepared.description,
                &prepared.expected_output,
                &context,
            ),
            contract: task.contract.clone(),
            fixed_output,
            backend,
            limiter: Arc::clone(&self.limiter),
            retry: self.retry,
            output_path: prepared.output_path.clone(),
        })
    }

    async fn run_batch(
        &self,
        jobs: Vec<TaskJob>,
    ) -> Result<Vec<(usize, JobOutcome)>, CrewError> {
        if jobs.len() == 1 {
            let mut finished = Vec::with_capacity(1);
            for job in jobs {
                let idx = job.index;
                finished.push((idx, job.execute().await));
            }
            return Ok(finished);
        }

        let mut set = tokio::task::JoinSet::new();
        for job in jobs {
            set.spawn(async move {
                let idx = job.index;
                (idx, job.execute().await)
            });
        }

        let mut finished = Vec::new();
        while let Some(joined) = set.join_next().await {
            let pair = joined.map_err(|e| {
                CrewError::backend(self.crew.clone(), format!("task worker aborted: {e}"))
            })?;
            finished.push(pair);
        }
        finished.sort_by_key(|(idx, _)| *idx);
        Ok(finished)
    }

    fn finish(&self, run: &mut RunState, idx: usize, outcome: JobOutcome) {
        let id = run.ids[idx].clone();
        match outcome {
            Ok(result) => {
                tracing::info!(
                    task = %id,
                    attempts = result.attempts,
                    output_chars = result.raw.chars().count(),
                    "task completed"
                );
                self.telemetry.emit(
                    "task.completed",
                    json!({
                        "crew": self.crew,
                        "task": id.as_str(),
                        "attempts": result.attempts,
                        "output_chars": result.raw.chars().count(),
                        "output_file": result.output_file.as_ref().map(|p| p.display().to_string()),
                    }),
                );
                run.transition(idx, TaskState::Completed);
                run.results[idx] = Some(result);
            }
            Err((err, attempts)) => {
                let dependents = self.graph.dependents_closure(idx).len();
                tracing::error!(task = %id, attempts, dependents, error = %err, "task failed");
                let failure = TaskFailure::from_error(id.clone(), &err, attempts);
                self.telemetry.emit(
                    "task.failed",
                    json!({
                        "crew": self.crew,
                        "task": id.as_str(),
                        "attempts": attempts,
                        "category": failure.category,
                        "reason": failure.reason,
                        "dependents": dependents,
                    }),
                );
                run.transition(idx, TaskState::Failed);
                run.failures[idx] = Some(failure);
            }
        }
    }
}

fn resolve_output_path(output_dir: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        output_dir.join(path)
    }
}

type JobOutcome = Result<TaskResult, (CrewError, u32)>;

/// Everything one task execution needs, owned so it can move onto a worker.
struct TaskJob {
    index: usize,
    id: TaskId,
    agent: String,
    model: String,
    description: String,
    messages: Vec<ChatMessage>,
    contract: OutputContract,
    fixed_output: Option<String>,
    backend: Arc<dyn LlmBackend>,
    limiter: Arc<RequestRateLimiter>,
    retry: RetryPolicy,
    output_path: Option<PathBuf>,
}

impl TaskJob {
    async fn execute(self) -> JobOutcome {
        let (raw, attempts, backend_label) = match self.fixed_output.clone() {
            Some(fixed) => {
                tracing::info!(task = %self.id, "short-circuit rule matched, skipping backend call");
                (fixed, 0, None)
            }
            None => {
                let (outcome, attempts) =
                    call_with_retry(self.retry, self.id.as_str(), |_attempt| {
                        let backend = Arc::clone(&self.backend);
                        let limiter = Arc::clone(&self.limiter);
                        let request = CompletionRequest::new(self.messages.clone());
                        let contract = &self.contract;
                        async move {
                            limiter.acquire().await;
                            let response = backend.complete(request).await?;
                            contract.apply(&response.content).map_err(|reason| {
                                CrewError::backend(
                                    backend.backend_name(),
                                    format!("malformed response: {reason}"),
                                )
                            })
                        }
                    })
                    .await;
                match outcome {
                    Ok(raw) => (raw, attempts, Some(self.model.clone())),
                    Err(err) => return Err((err, attempts)),
                }
            }
        };

        if let Some(path) = &self.output_path {
            write_output_file(path, &raw).map_err(|err| (err, attempts))?;
            tracing::debug!(task = %self.id, path = %path.display(), "output file written");
        }

        Ok(TaskResult {
            task: self.id,
            agent: self.agent,
            description: self.description,
            raw,
            backend: backend_label,
            attempts,
            output_file: self.output_path,
            completed_at: Utc::now(),
        })
    }
}

/// Writes `content` to `path`, replacing any previous file. Not atomic.
pub fn write_output_file(path: &Path, content: &str) -> Result<(), CrewError> {
    let io_err = |source| CrewError::Io {
        path: path.display().to_string(),
        source,
    };
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }
    std::fs::write(path, content).map_err(io_err)
}

struct RunState {
    ids: Vec<TaskId>,
    states: Vec<TaskState>,
    results: Vec<Option<TaskResult>>,
    failures: Vec<Option<TaskFailure>>,
    blocked_by: Vec<Option<TaskId>>,
    transitions: Vec<StateTransition>,
}

impl RunState {
    fn new(graph: &TaskGraph) -> Self {
        let len = graph.len();
        Self {
            ids: graph.tasks().iter().map(|t| t.id.clone()).collect(),
            states: vec![TaskState::Pending; len],
            results: vec![None; len],
            failures: vec![None; len],
            blocked_by: vec![None; len],
            transitions: Vec::new(),
        }
    }

    /// Pending tasks whose dependencies have all completed, in declaration order.
    fn ready(&self, graph: &TaskGraph) -> Vec<usize> {
        (0..self.states.len())
            .filter(|idx| self.states[*idx] == TaskState::Pending)
            .filter(|idx| {
                graph
                    .dependencies(*idx)
                    .iter()
                    .all(|dep| self.states[*dep] == TaskState::Completed)
            })
            .collect()
    }

    fn transition(&mut self, idx: usize, to: TaskState) {
        let from = self.states[idx];
        debug_assert!(
            from.can_transition_to(to),
            "illegal task transition {from:?} -> {to:?}"
        );
        self.states[idx] = to;
        self.transitions.push(StateTransition {
            task: self.ids[idx].clone(),
            from,
            to,
            at: Utc::now(),
        });
    }

    /// Records, for every task left pending, the failed task upstream of it.
    fn settle_blocked(&mut self, graph: &TaskGraph) -> Vec<(usize, TaskId)> {
        let mut blocked = Vec::new();
        for idx in 0..self.states.len() {
            if self.states[idx] != TaskState::Pending {
                continue;
            }
            let upstream = graph.dependencies(idx).iter().find_map(|dep| {
                if self.states[*dep] == TaskState::Failed {
                    Some(self.ids[*dep].clone())
                } else {
                    self.blocked_by[*dep].clone()
                }
            });
            if let Some(upstream) = upstream {
                self.blocked_by[idx] = Some(upstream.clone());
                blocked.push((idx, upstream));
            }
        }
        blocked
    }

    fn into_result(self, crew: String, started_at: chrono::DateTime<Utc>) -> PipelineResult {
        let outcomes = self
            .ids
            .into_iter()
            .zip(self.states)
            .zip(self.results)
            .zip(self.failures)
            .zip(self.blocked_by)
            .map(|((((task, state), result), failure), blocked_by)| TaskOutcome {
                task,
                state,
                result,
                failure,
                blocked_by,
            })
            .collect();

        PipelineResult {
            crew,
            outcomes,
            transitions: self.transitions,
            started_at,
            finished_at: Utc::now(),
        }
    }
}
