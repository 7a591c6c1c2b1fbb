//! Assistant function calls
//!
//! Timer and mute functions exposed to the language model. Results are
//! plain sentences the model reads back to the user.

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use crate::events::{Event, EventSender};
use crate::timers::TimerService;

/// Reply after muting through a function call
pub const MUTED_REPLY: &str = "I've muted myself. Tap the dashboard or toggle the mute switch to unmute me.";

/// Reply after unmuting through a function call
pub const UNMUTED_REPLY: &str = "I've unmuted myself.";

#[derive(Debug, Deserialize)]
struct SetTimerArgs {
    duration_minutes: f64,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TimerNameArgs {
    name: String,
}

/// OpenAI-style function schemas for every supported call
#[must_use]
pub fn tool_definitions() -> Value {
    let function = |name: &str, description: &str, properties: Value, required: &[&str]| {
        json!({
            "type": "function",
            "function": {
                "name": name,
                "description": description,
                "parameters": {
                    "type": "object",
                    "properties": properties,
                    "required": required,
                },
            },
        })
    };

    let timer_name = |description: &str| json!({ "name": { "type": "string", "description": description } });

    Value::Array(vec![
        function(
            "set_timer",
            "Set a timer for a specified duration",
            json!({
                "duration_minutes": {
                    "type": "number",
                    "description": "Duration in minutes (e.g., 5, 10, 0.5 for 30 seconds)"
                },
                "name": {
                    "type": "string",
                    "description": "Optional name for the timer (e.g., 'pasta timer', 'workout')"
                }
            }),
            &["duration_minutes"],
        ),
        function(
            "cancel_timer",
            "Cancel a specific timer by name",
            timer_name("Name of the timer to cancel"),
            &["name"],
        ),
        function("list_timers", "List all active timers", json!({}), &[]),
        function(
            "get_timer_status",
            "Get the remaining time for a specific timer",
            timer_name("Name of the timer to check"),
            &["name"],
        ),
        function(
            "mute_assistant",
            "Mute the assistant so it stops listening until unmuted",
            json!({}),
            &[],
        ),
        function(
            "unmute_assistant",
            "Unmute the assistant so it listens for the wake word again",
            json!({}),
            &[],
        ),
    ])
}

/// Routes function calls to the session's services
#[derive(Debug, Clone)]
pub struct ToolDispatcher {
    timers: TimerService,
    upstream: EventSender,
}

impl ToolDispatcher {
    /// Create a dispatcher over an already-built timer service
    ///
    /// Mute calls are injected into `upstream` so they apply on the
    /// session's event path like any other mute command.
    #[must_use]
    pub const fn new(timers: TimerService, upstream: EventSender) -> Self {
        Self { timers, upstream }
    }

    /// Execute a function call and return the text result
    pub async fn call(&self, name: &str, arguments: &Value) -> String {
        tracing::debug!(function = name, "executing function call");

        let result = match name {
            "set_timer" => match parse::<SetTimerArgs>(arguments) {
                Ok(args) => Ok(self
                    .timers
                    .set_timer(args.duration_minutes, args.name.as_deref())
                    .await
                    .unwrap_or_else(|e| e.to_string())),
                Err(e) => Err(e),
            },
            "cancel_timer" => match parse::<TimerNameArgs>(arguments) {
                Ok(args) => Ok(self
                    .timers
                    .cancel_timer(&args.name)
                    .await
                    .unwrap_or_else(|e| e.to_string())),
                Err(e) => Err(e),
            },
            "list_timers" => Ok(self.timers.list_timers().await),
            "get_timer_status" => match parse::<TimerNameArgs>(arguments) {
                Ok(args) => Ok(self
                    .timers
                    .get_timer_status(&args.name)
                    .await
                    .unwrap_or_else(|e| e.to_string())),
                Err(e) => Err(e),
            },
            "mute_assistant" => self.request_mute(true).map(|()| MUTED_REPLY.to_string()),
            "unmute_assistant" => self.request_mute(false).map(|()| UNMUTED_REPLY.to_string()),
            _ => {
                tracing::warn!(function = name, "unknown function call");
                return format!("Unknown function: {name}");
            }
        };

        result.unwrap_or_else(|e| {
            tracing::error!(function = name, error = %e, "function call failed");
            format!("Error executing {name}: {e}")
        })
    }

    fn request_mute(&self, muted: bool) -> Result<(), String> {
        self.upstream
            .send(Event::Mute { muted })
            .map_err(|_| "session is closed".to_string())
    }
}

fn parse<T: DeserializeOwned>(arguments: &Value) -> Result<T, String> {
    serde_json::from_value(arguments.clone()).map_err(|e| e.to_string())
}
