use std::sync::Arc;
use std::time::Instant;

use uuid::Uuid;

use crate::value::CallArgs;

/// Ambient state of one logical call, shared by all of its sub-queries.
#[derive(Debug)]
pub struct CallContext {
    id: Uuid,
    description: String,
    args: CallArgs,
    started: Instant,
}

impl CallContext {
    pub fn new(description: impl Into<String>, args: CallArgs) -> Arc<Self> {
        Arc::new(Self {
            id: Uuid::new_v4(),
            description: description.into(),
            args,
            started: Instant::now(),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// What originated the call, typically the statement text.
    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn args(&self) -> &CallArgs {
        &self.args
    }

    pub fn started(&self) -> Instant {
        self.started
    }
}
