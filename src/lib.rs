//! Drive a web page or a desktop with a tool-calling model.
//!
//! The model proposes symbolic actions (`click`, `type`, `screenshot`, ...),
//! the [`Dispatcher`] executes them on an [`InputSurface`], and the results
//! go back to the model until it answers without an action.

pub mod agent;
pub mod artifacts;
pub mod brain;
pub mod config;
pub mod conversation;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod grounding;
pub mod keys;
pub mod scaling;
pub mod session;
pub mod surface;
pub mod types;

pub use agent::{Agent, TaskOutcome};
pub use brain::{AnthropicClient, ModelClient, ModelReply, ModelRequest, ScriptedModel};
pub use config::{AgentConfig, ModelConfig};
pub use conversation::Conversation;
pub use dispatch::{ActionHandler, DispatchContext, Dispatcher};
pub use error::{ActionError, ErrorKind, FatalError, SurfaceError};
pub use events::AgentEvent;
pub use grounding::{ElementIndex, IndexSnapshot};
pub use scaling::{Resolution, Scaler};
pub use session::Session;
pub use surface::{BrowserSurface, DesktopSurface, InputSurface, MockSurface, StructuredSurface};
pub use types::{ActionRequest, ActionResult, Outcome, Turn};
