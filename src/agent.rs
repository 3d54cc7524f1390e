//! The request → act → observe loop.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::artifacts::{ArtifactStore, FsArtifactStore, InlineArtifactStore};
use crate::brain::{system_prompt, ModelClient, ModelRequest};
use crate::config::AgentConfig;
use crate::dispatch::Dispatcher;
use crate::error::FatalError;
use crate::events::{publish, AgentEvent};
use crate::session::Session;
use crate::surface::InputSurface;
use crate::types::{ActionRequest, Turn};

/// What the invoker gets back from a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TaskOutcome {
    /// The model stopped proposing actions; `text` is its final answer.
    Completed { text: String, steps: usize },
    Failed { error: FatalError, steps: usize },
}

impl TaskOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, TaskOutcome::Completed { .. })
    }

    pub fn steps(&self) -> usize {
        match self {
            TaskOutcome::Completed { steps, .. } | TaskOutcome::Failed { steps, .. } => *steps,
        }
    }
}

pub struct Agent<M: ModelClient> {
    model: M,
    config: AgentConfig,
    dispatcher: Dispatcher,
    artifacts: Arc<dyn ArtifactStore>,
    events: Option<broadcast::Sender<AgentEvent>>,
}

impl<M: ModelClient> Agent<M> {
    pub fn new(model: M, config: AgentConfig) -> Self {
        let artifacts: Arc<dyn ArtifactStore> = match &config.artifacts_dir {
            Some(dir) => Arc::new(FsArtifactStore::new(dir)),
            None => Arc::new(InlineArtifactStore),
        };
        Self {
            model,
            config,
            dispatcher: Dispatcher::standard(),
            artifacts,
            events: None,
        }
    }

    pub fn with_artifacts(mut self, artifacts: Arc<dyn ArtifactStore>) -> Self {
        self.artifacts = artifacts;
        self
    }

    pub fn with_dispatcher(mut self, dispatcher: Dispatcher) -> Self {
        self.dispatcher = dispatcher;
        self
    }

    pub fn with_events(mut self, events: broadcast::Sender<AgentEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    /// Runs one task on `surface` until the model finishes or a fatal
    /// condition occurs. The surface is released before this returns.
    pub async fn run(&self, task: &str, surface: Box<dyn InputSurface>, cancel: &CancellationToken) -> TaskOutcome {
        info!("Starting task: {}", task);
        let mut session = match Session::open(task, surface, self.config.scaling).await {
            Ok(session) => session,
            Err(error) => return self.finish(Err(error), 0),
        };

        let (result, steps) = self.drive(&mut session, cancel).await;

        if let Err(e) = session.release().await {
            warn!("Surface release failed: {}", e);
        }
        self.finish(result, steps)
    }

    fn finish(&self, result: Result<String, FatalError>, steps: usize) -> TaskOutcome {
        match result {
            Ok(text) => {
                info!("Task complete after {} steps", steps);
                publish(self.events.as_ref(), AgentEvent::TaskComplete { summary: text.clone() });
                TaskOutcome::Completed { text, steps }
            }
            Err(error) => {
                error!("Task failed after {} steps: {}", steps, error);
                publish(self.events.as_ref(), AgentEvent::TaskError { message: error.to_string() });
                TaskOutcome::Failed { error, steps }
            }
        }
    }

    async fn drive(&self, session: &mut Session, cancel: &CancellationToken) -> (Result<String, FatalError>, usize) {
        let structured = session.is_structured();
        let system = system_prompt(structured);
        let actions: Vec<String> = self.dispatcher.names().into_iter().map(String::from).collect();
        let max_steps = self.config.max_steps;
        let mut steps = 0;

        loop {
            if cancel.is_cancelled() {
                return (Err(FatalError::Cancelled), steps);
            }

            let conversation = session.conversation_mut();
            conversation.prune(self.config.max_turns);
            conversation.elide_images(self.config.keep_images);

            publish(self.events.as_ref(), AgentEvent::Thinking);
            let request = ModelRequest {
                system: system.clone(),
                turns: conversation.snapshot(),
                display: session.scaler().logical(),
                structured,
                actions: actions.clone(),
            };

            let reply = match self.model.respond(&request).await {
                Ok(reply) => reply,
                Err(e) => {
                    return (
                        Err(FatalError::ModelFailure {
                            message: format!("{:#}", e),
                        }),
                        steps,
                    );
                }
            };

            if reply.actions.is_empty() {
                let text = reply.text.unwrap_or_default();
                if !text.is_empty() {
                    session.conversation_mut().append(Turn::model_text(text.clone()));
                }
                return (Ok(text), steps);
            }

            let mut text = reply.text;
            for action in reply.actions {
                if steps >= max_steps {
                    return (Err(FatalError::BudgetExceeded { limit: max_steps }), steps);
                }
                steps += 1;
                publish(
                    self.events.as_ref(),
                    AgentEvent::Step {
                        number: steps,
                        description: describe(&action),
                    },
                );

                let outcome = {
                    let mut ctx = session.context(self.artifacts.as_ref(), self.config.draw_overlay);
                    self.dispatcher.execute(&action, &mut ctx).await
                };
                let result = match outcome {
                    Ok(result) => result,
                    Err(e) => return (Err(e.into()), steps),
                };

                info!("Step {}: {} -> {}", steps, action.name, result.summary());
                if result.is_error() {
                    publish(
                        self.events.as_ref(),
                        AgentEvent::StepError {
                            message: result.summary(),
                        },
                    );
                }

                let conversation = session.conversation_mut();
                conversation.append(Turn::proposal(text.take(), action));
                conversation.append(Turn::observation(result));
            }
        }
    }
}

fn describe(action: &ActionRequest) -> String {
    let mut out = action.name.clone();
    if let Some(id) = action.element {
        out.push_str(&format!(" element {}", id));
    }
    if let Some((x, y)) = action.coordinate {
        out.push_str(&format!(" at ({}, {})", x, y));
    }
    if let Some(text) = action.text.as_ref().or(action.key.as_ref()) {
        out.push_str(&format!(" '{}'", text));
    }
    out
}
