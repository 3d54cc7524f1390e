//! Progress events published while a task runs.

use serde::Serialize;
use tokio::sync::broadcast;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AgentEvent {
    Thinking,
    Step { number: usize, description: String },
    StepError { message: String },
    TaskComplete { summary: String },
    TaskError { message: String },
}

/// Creates the channel a front end subscribes to.
pub fn channel(capacity: usize) -> (broadcast::Sender<AgentEvent>, broadcast::Receiver<AgentEvent>) {
    broadcast::channel(capacity)
}

/// Sends if anyone is listening; a task never fails for lack of observers.
pub(crate) fn publish(events: Option<&broadcast::Sender<AgentEvent>>, event: AgentEvent) {
    if let Some(tx) = events {
        let _ = tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_event_tag() {
        let json = serde_json::to_value(AgentEvent::Step {
            number: 2,
            description: "click".into(),
        })
        .unwrap();
        assert_eq!(json["event"], "step");
        assert_eq!(json["number"], 2);
    }
}
