use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use super::{ModelClient, ModelReply, ModelRequest};

#[derive(Debug, Default)]
struct Script {
    replies: VecDeque<Result<ModelReply, String>>,
    fallback: Option<ModelReply>,
    requests: Vec<ModelRequest>,
}

/// A model that answers from a queue of prepared replies and records every
/// request it was sent. Once the queue is empty it repeats the fallback reply,
/// or fails if there is none.
#[derive(Debug, Clone, Default)]
pub struct ScriptedModel {
    script: Arc<Mutex<Script>>,
}

impl ScriptedModel {
    pub fn new(replies: impl IntoIterator<Item = ModelReply>) -> Self {
        let model = Self::default();
        model.lock().replies = replies.into_iter().map(Ok).collect();
        model
    }

    /// Reply given once the queue runs out.
    pub fn then_repeat(self, reply: ModelReply) -> Self {
        self.lock().fallback = Some(reply);
        self
    }

    /// Queues a transport failure.
    pub fn then_fail(self, message: impl Into<String>) -> Self {
        self.lock().replies.push_back(Err(message.into()));
        self
    }

    pub fn requests(&self) -> Vec<ModelRequest> {
        self.lock().requests.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl ModelClient for ScriptedModel {
    async fn respond(&self, request: &ModelRequest) -> Result<ModelReply> {
        let mut script = self.lock();
        script.requests.push(request.clone());
        match script.replies.pop_front() {
            Some(Ok(reply)) => Ok(reply),
            Some(Err(message)) => Err(anyhow!(message)),
            None => script
                .fallback
                .clone()
                .ok_or_else(|| anyhow!("scripted model has no replies left")),
        }
    }
}
