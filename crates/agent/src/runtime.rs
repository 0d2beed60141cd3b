//! The agent loop.
//!
//! `Init → Running ⇄ Waiting → … → Stopped`. One iteration replenishes the
//! cached inputs, draws a task, runs its handler and picks a sleep. Nothing
//! that happens inside an iteration ends the loop; only the shutdown flag
//! does, and it is observed between iterations.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, FixedOffset, Local, Timelike, Utc};
use murmur_config::AgentDefinition;
use murmur_core::state::keys;
use murmur_core::{AgentState, ConnectionError, ConnectionRegistry, DomainEvent, EventBus};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::error::AgentError;
use crate::handlers::{self, TaskContext, TaskHandler, TaskOutcome};
use crate::prompt;
use crate::selector::TaskSelector;

/// Source of the current instant.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopPhase {
    Init,
    Running,
    Waiting,
    Stopped,
}

/// What one iteration did and how long to sleep afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct IterationReport {
    pub task: Option<String>,
    pub outcome: IterationOutcome,
    pub sleep: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub enum IterationOutcome {
    /// The handler returned an outcome.
    Task(TaskOutcome),
    /// Timeline reads are rate limited; no task was selected.
    TimelineLimited,
    /// No task could be drawn.
    SelectionFailed(String),
    /// The handler failed.
    Failed(String),
}

impl IterationReport {
    pub fn is_success(&self) -> bool {
        matches!(&self.outcome, IterationOutcome::Task(outcome) if outcome.is_success())
    }
}

pub struct Agent {
    definition: AgentDefinition,
    registry: Arc<ConnectionRegistry>,
    handlers: HashMap<String, Arc<dyn TaskHandler>>,
    selector: TaskSelector,
    state: AgentState,
    model_provider: String,
    username: Option<String>,
    system_prompt: Option<String>,
    event_bus: Arc<EventBus>,
    clock: Clock,
    /// Offset used for time weighting; `None` means the host's local time.
    utc_offset: Option<FixedOffset>,
    rng: StdRng,
    phase: LoopPhase,
    iterations: u64,
}

impl Agent {
    /// Initialise an agent: resolve the model provider, bind task handlers
    /// and look up the agent's own username.
    pub fn new(
        definition: AgentDefinition,
        registry: Arc<ConnectionRegistry>,
    ) -> Result<Self, AgentError> {
        let model_provider = registry
            .get_model_providers()
            .first()
            .map(|name| name.to_string())
            .ok_or(ConnectionError::NoProvider)?;

        let handlers = handlers::bind_handlers(&definition, &registry)?;

        let username = std::env::var(&definition.identity_env)
            .ok()
            .filter(|u| !u.trim().is_empty());
        if username.is_none() {
            if definition.require_identity {
                return Err(AgentError::MissingIdentity(definition.identity_env.clone()));
            }
            warn!(
                env = %definition.identity_env,
                "Agent username not set; running without self-interaction checks"
            );
        }

        let selector = TaskSelector::for_agent(&definition);
        info!(
            agent = %definition.name,
            model_provider = %model_provider,
            tasks = definition.tasks.len(),
            time_weighted = selector.is_time_weighted(),
            "Agent initialised"
        );

        Ok(Self {
            selector,
            definition,
            registry,
            handlers,
            state: AgentState::new(),
            model_provider,
            username,
            system_prompt: None,
            event_bus: Arc::new(EventBus::default()),
            clock: Arc::new(Utc::now),
            utc_offset: None,
            rng: StdRng::from_os_rng(),
            phase: LoopPhase::Init,
            iterations: 0,
        })
    }

    /// Override the agent's own username.
    pub fn with_username(mut self, username: Option<String>) -> Self {
        self.username = username;
        self
    }

    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.event_bus = bus;
        self
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Evaluate time weighting at a fixed UTC offset instead of local time.
    pub fn with_utc_offset(mut self, offset: FixedOffset) -> Self {
        self.utc_offset = Some(offset);
        self
    }

    /// Make task selection reproducible.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn definition(&self) -> &AgentDefinition {
        &self.definition
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    pub fn state(&self) -> &AgentState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut AgentState {
        &mut self.state
    }

    pub fn model_provider(&self) -> &str {
        &self.model_provider
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn phase(&self) -> LoopPhase {
        self.phase
    }

    pub fn iterations(&self) -> u64 {
        self.iterations
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    /// The persona prompt, built on first use and cached.
    pub async fn system_prompt(&mut self) -> &str {
        if self.system_prompt.is_none() {
            let examples = prompt::fetch_account_examples(&self.definition, &self.registry).await;
            let built = prompt::build_system_prompt(&self.definition, &examples);
            debug!(chars = built.len(), "Built system prompt");
            self.system_prompt = Some(built);
        }
        self.system_prompt.as_deref().unwrap_or_default()
    }

    fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    fn rate_limited_until(&self, key: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.state.timestamp(key).filter(|reset| *reset > now)
    }

    /// Fill every empty cached input some task needs.
    async fn replenish(&mut self, now: DateTime<Utc>) {
        let sources: Vec<_> = self.definition.required_data_sources().cloned().collect();
        for source in sources {
            if !self.state.is_vacant(&source.state_key) {
                continue;
            }
            if !self.registry.contains(&source.connection) {
                debug!(key = %source.state_key, connection = %source.connection, "Data source connection not registered");
                continue;
            }

            info!(key = %source.state_key, "Replenishing");
            match self
                .registry
                .perform_action(&source.connection, &source.action, source.args.clone())
                .await
            {
                Ok(value) => self.state.set(source.state_key.clone(), value),
                Err(e) => {
                    if let (Some(secs), true) = (
                        e.retry_after(),
                        source.state_key == keys::TIMELINE_TWEETS,
                    ) {
                        self.state.set_deadline(keys::TIMELINE_LIMIT_RESET, now, secs);
                        warn!(retry_after_secs = secs, "Timeline reads rate limited");
                    }
                    warn!(
                        key = %source.state_key,
                        connection = %source.connection,
                        action = %source.action,
                        error = %e,
                        "Failed to replenish"
                    );
                }
            }
        }
    }

    fn log_status(&self, now: DateTime<Utc>) {
        let posting = if self.rate_limited_until(keys::TWEET_LIMIT_RESET, now).is_some() {
            "likes-only"
        } else {
            "normal"
        };
        let timeline = if self.rate_limited_until(keys::TIMELINE_LIMIT_RESET, now).is_some() {
            "rate-limited"
        } else {
            "normal"
        };
        info!(
            agent = %self.definition.name,
            iteration = self.iterations + 1,
            queued = self.state.list_len(keys::TIMELINE_TWEETS),
            posting,
            timeline,
            "Agent status"
        );
    }

    /// Draw the next task, weighting by the hour of `now` in the agent's
    /// timezone.
    fn select_task(&mut self, now: DateTime<Utc>) -> Result<String, AgentError> {
        let hour = match self.utc_offset {
            Some(offset) => now.with_timezone(&offset).hour(),
            None => now.with_timezone(&Local).hour(),
        };
        let task = self
            .selector
            .select(&self.definition.tasks, Some(hour), &mut self.rng)?;
        Ok(task.name.clone())
    }

    fn publish_failure(&self, context: &str, message: &str) {
        self.event_bus.publish(DomainEvent::IterationFailed {
            context: context.to_string(),
            error_message: message.to_string(),
            timestamp: Utc::now(),
        });
    }

    /// Run one iteration and report the sleep that should follow it.
    pub async fn run_iteration(&mut self) -> IterationReport {
        let now = self.now();
        let loop_delay = self.definition.loop_delay();
        let fallback_delay = self.definition.fallback_delay();
        self.log_status(now);
        self.iterations += 1;

        if let Some(reset) = self.rate_limited_until(keys::TIMELINE_LIMIT_RESET, now) {
            let remaining = (reset - now).to_std().unwrap_or_default();
            info!(remaining_secs = remaining.as_secs(), "Timeline rate limited, waiting");
            return IterationReport {
                task: None,
                outcome: IterationOutcome::TimelineLimited,
                sleep: remaining.min(loop_delay),
            };
        }

        self.replenish(now).await;
        self.system_prompt().await;

        let task = match self.select_task(now) {
            Ok(task) => task,
            Err(e) => {
                error!(error = %e, "Task selection failed");
                self.publish_failure("selection", &e.to_string());
                return IterationReport {
                    task: None,
                    outcome: IterationOutcome::SelectionFailed(e.to_string()),
                    sleep: fallback_delay,
                };
            }
        };

        self.execute(task, now).await
    }

    /// Run one configured task by name, bypassing weighted selection.
    ///
    /// Zero-weight tasks can only run this way.
    pub async fn run_task(&mut self, name: &str) -> Result<IterationReport, AgentError> {
        if !self.handlers.contains_key(name) {
            return Err(AgentError::Handler {
                task: name.to_string(),
                message: "no such task configured".into(),
            });
        }
        let now = self.now();
        self.replenish(now).await;
        self.system_prompt().await;
        Ok(self.execute(name.to_string(), now).await)
    }

    async fn execute(&mut self, task: String, now: DateTime<Utc>) -> IterationReport {
        let loop_delay = self.definition.loop_delay();
        let fallback_delay = self.definition.fallback_delay();

        info!(task = %task, "Selected task");
        self.event_bus.publish(DomainEvent::TaskSelected {
            task: task.clone(),
            timestamp: Utc::now(),
        });

        let Some(handler) = self.handlers.get(&task).cloned() else {
            let e = AgentError::Handler {
                task: task.clone(),
                message: "no handler bound".into(),
            };
            error!(error = %e, "Task failed");
            self.publish_failure(&task, &e.to_string());
            return IterationReport {
                task: Some(task),
                outcome: IterationOutcome::Failed(e.to_string()),
                sleep: loop_delay,
            };
        };

        let started = Instant::now();
        let result = {
            let mut cx = TaskContext {
                registry: &self.registry,
                state: &mut self.state,
                definition: &self.definition,
                model_provider: &self.model_provider,
                system_prompt: self.system_prompt.as_deref().unwrap_or_default(),
                username: self.username.as_deref(),
                now,
            };
            handler.run(&mut cx).await
        };
        let duration_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(outcome) => {
                let success = outcome.is_success();
                match &outcome {
                    TaskOutcome::Completed => info!(task = %task, duration_ms, "Task completed"),
                    TaskOutcome::Idle { reason } => info!(task = %task, reason = %reason, "Task idle"),
                    TaskOutcome::CoolingDown { remaining } => {
                        info!(task = %task, remaining_secs = remaining.as_secs(), "Task cooling down")
                    }
                }
                self.event_bus.publish(DomainEvent::TaskCompleted {
                    task: task.clone(),
                    success,
                    duration_ms,
                    timestamp: Utc::now(),
                });
                IterationReport {
                    task: Some(task),
                    outcome: IterationOutcome::Task(outcome),
                    sleep: if success { loop_delay } else { fallback_delay },
                }
            }
            Err(e) => {
                let sleep = if e.is_execution_failure() {
                    fallback_delay
                } else {
                    loop_delay
                };
                error!(task = %task, error = %e, "Task failed");
                self.event_bus.publish(DomainEvent::TaskCompleted {
                    task: task.clone(),
                    success: false,
                    duration_ms,
                    timestamp: Utc::now(),
                });
                self.publish_failure(&task, &e.to_string());
                IterationReport {
                    task: Some(task),
                    outcome: IterationOutcome::Failed(e.to_string()),
                    sleep,
                }
            }
        }
    }

    /// Run until `shutdown` becomes `true`. Returns the iteration count.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> u64 {
        self.phase = LoopPhase::Running;
        info!(agent = %self.definition.name, "Starting loop");
        self.event_bus.publish(DomainEvent::LoopStarted {
            agent: self.definition.name.clone(),
            model_provider: self.model_provider.clone(),
            timestamp: Utc::now(),
        });

        while !*shutdown.borrow() {
            let report = self.run_iteration().await;
            debug!(sleep_secs = report.sleep.as_secs_f64(), "Iteration done");

            self.phase = LoopPhase::Waiting;
            let sleep = tokio::time::sleep(report.sleep);
            tokio::pin!(sleep);
            let sender_dropped = tokio::select! {
                _ = &mut sleep => false,
                closed = async { shutdown.wait_for(|stop| *stop).await.is_err() } => closed,
            };
            // A dropped sender can never request shutdown.
            if sender_dropped {
                sleep.await;
            }
            self.phase = LoopPhase::Running;
        }

        self.phase = LoopPhase::Stopped;
        info!(iterations = self.iterations, "Loop stopped");
        self.event_bus.publish(DomainEvent::LoopStopped {
            iterations: self.iterations,
            timestamp: Utc::now(),
        });
        self.iterations
    }
}
