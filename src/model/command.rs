//! Command beans: control instructions addressed to running consumers.
//!
//! Commands have no status and are never queued. They are broadcast on a
//! command topic and every consumer listening decides whether it applies.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A control message that can be broadcast to consumers.
pub trait CommandBean: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Short name of the instruction, used for logging.
    fn command_name(&self) -> &str;
}

/// The instruction carried by a [`ConsumerCommand`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    Pause,
    Resume,
    Terminate,
    Restart,
}

impl Command {
    /// Wire name, matching the serde representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Command::Pause => "pause",
            Command::Resume => "resume",
            Command::Terminate => "terminate",
            Command::Restart => "restart",
        }
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A command for one consumer, or for every consumer of a queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsumerCommand {
    pub command: Command,

    /// Target consumer. None addresses every consumer on the topic.
    pub consumer_id: Option<Uuid>,

    /// Restricts the command to consumers of this queue.
    pub queue_name: Option<String>,

    pub message: Option<String>,

    pub issued_at: DateTime<Utc>,
}

impl ConsumerCommand {
    pub fn new(command: Command) -> Self {
        Self {
            command,
            consumer_id: None,
            queue_name: None,
            message: None,
            issued_at: Utc::now(),
        }
    }

    pub fn pause() -> Self {
        Self::new(Command::Pause)
    }

    pub fn resume() -> Self {
        Self::new(Command::Resume)
    }

    pub fn terminate() -> Self {
        Self::new(Command::Terminate)
    }

    pub fn for_consumer(mut self, consumer_id: Uuid) -> Self {
        self.consumer_id = Some(consumer_id);
        self
    }

    pub fn for_queue(mut self, queue_name: impl Into<String>) -> Self {
        self.queue_name = Some(queue_name.into());
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Does this command apply to the given consumer on the given queue?
    pub fn addresses(&self, consumer_id: Uuid, queue_name: &str) -> bool {
        self.consumer_id.is_none_or(|id| id == consumer_id)
            && self.queue_name.as_deref().is_none_or(|q| q == queue_name)
    }
}

impl CommandBean for ConsumerCommand {
    fn command_name(&self) -> &str {
        self.command.as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broadcast_command_addresses_everyone() {
        let cmd = ConsumerCommand::pause();
        assert!(cmd.addresses(Uuid::new_v4(), "scan.submit"));
    }

    #[test]
    fn targeted_command_only_addresses_its_consumer() {
        let target = Uuid::new_v4();
        let cmd = ConsumerCommand::terminate()
            .for_consumer(target)
            .for_queue("scan.submit");
        assert!(cmd.addresses(target, "scan.submit"));
        assert!(!cmd.addresses(Uuid::new_v4(), "scan.submit"));
        assert!(!cmd.addresses(target, "other.submit"));
    }

    #[test]
    fn command_name_matches_display() {
        for command in [Command::Pause, Command::Resume, Command::Terminate, Command::Restart] {
            let cmd = ConsumerCommand::new(command);
            assert_eq!(cmd.command_name(), command.to_string());
        }
    }

    #[test]
    fn command_name_matches_wire_name() {
        for command in [Command::Pause, Command::Resume, Command::Terminate, Command::Restart] {
            let wire = serde_json::to_value(command).unwrap();
            assert_eq!(wire, serde_json::Value::from(command.as_str()));
        }
    }
}
