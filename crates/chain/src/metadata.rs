//! Execution metadata: per-engine status of one chain run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::ExecutionPlan;

/// Status of a chain execution or of one engine execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Scheduled,
    InProgress,
    Completed,
    Failed,
    Skipped,
}

impl ExecutionStatus {
    /// Completed and failed executions are finished; skipped ones never ran.
    pub fn is_finished(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Scheduled => write!(f, "scheduled"),
            Self::InProgress => write!(f, "in_progress"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}

impl std::str::FromStr for ExecutionStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scheduled"   => Ok(Self::Scheduled),
            "in_progress" => Ok(Self::InProgress),
            "completed"   => Ok(Self::Completed),
            "failed"      => Ok(Self::Failed),
            "skipped"     => Ok(Self::Skipped),
            other         => Err(format!("unknown execution status: {other}")),
        }
    }
}

/// Status record of one engine in a chain run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineExecution {
    pub engine: String,
    pub optional: bool,
    pub status: ExecutionStatus,
    pub message: Option<String>,
    pub started: Option<DateTime<Utc>>,
    pub completed: Option<DateTime<Utc>>,
}

impl EngineExecution {
    fn scheduled(engine: &str, optional: bool) -> Self {
        Self {
            engine: engine.to_owned(),
            optional,
            status: ExecutionStatus::Scheduled,
            message: None,
            started: None,
            completed: None,
        }
    }
}

/// Status of a whole chain run plus one record per engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionMetadata {
    pub execution_id: Uuid,
    pub chain: String,
    pub status: ExecutionStatus,
    pub message: Option<String>,
    pub started: Option<DateTime<Utc>>,
    pub completed: Option<DateTime<Utc>>,
    /// Missing engines first, then plan order.
    pub engines: Vec<EngineExecution>,
}

impl ExecutionMetadata {
    /// Metadata for a fresh run of `plan`: everything `Scheduled`.
    pub fn for_plan(plan: &ExecutionPlan) -> Self {
        let engines = plan
            .missing
            .iter()
            .map(|m| EngineExecution::scheduled(&m.engine, m.optional))
            .chain(plan.nodes().map(|n| EngineExecution::scheduled(&n.engine, n.optional)))
            .collect();

        Self {
            execution_id: Uuid::new_v4(),
            chain: plan.chain.clone(),
            status: ExecutionStatus::Scheduled,
            message: None,
            started: None,
            completed: None,
            engines,
        }
    }

    pub fn engine(&self, name: &str) -> Option<&EngineExecution> {
        self.engines.iter().find(|e| e.engine == name)
    }

    fn engine_mut(&mut self, name: &str) -> Option<&mut EngineExecution> {
        self.engines.iter_mut().find(|e| e.engine == name)
    }

    /// Mark the chain run as started.
    pub fn start(&mut self) {
        self.status = ExecutionStatus::InProgress;
        self.started = Some(Utc::now());
    }

    /// Mark the chain run as finished with `status`.
    pub fn finish(&mut self, status: ExecutionStatus, message: Option<String>) {
        self.status = status;
        self.message = message;
        self.completed = Some(Utc::now());
    }

    pub fn set_in_progress(&mut self, engine: &str) {
        if let Some(e) = self.engine_mut(engine) {
            e.status = ExecutionStatus::InProgress;
            e.started = Some(Utc::now());
        }
    }

    pub fn set_completed(&mut self, engine: &str) {
        self.set_final(engine, ExecutionStatus::Completed, None);
    }

    pub fn set_failed(&mut self, engine: &str, message: impl Into<String>) {
        self.set_final(engine, ExecutionStatus::Failed, Some(message.into()));
    }

    pub fn set_skipped(&mut self, engine: &str, message: impl Into<String>) {
        self.set_final(engine, ExecutionStatus::Skipped, Some(message.into()));
    }

    fn set_final(&mut self, engine: &str, status: ExecutionStatus, message: Option<String>) {
        if let Some(e) = self.engine_mut(engine) {
            e.status = status;
            e.message = message;
            e.completed = Some(Utc::now());
        }
    }

    /// Skip every engine still `Scheduled`.
    pub fn skip_remaining(&mut self, message: &str) {
        for e in self.engines.iter_mut().filter(|e| e.status == ExecutionStatus::Scheduled) {
            e.status = ExecutionStatus::Skipped;
            e.message = Some(message.to_owned());
        }
    }

    pub fn is_failed(&self) -> bool {
        self.status == ExecutionStatus::Failed
    }

    pub fn is_finished(&self) -> bool {
        self.status.is_finished()
    }

    /// Engines whose record has `status`, in record order.
    pub fn with_status(&self, status: ExecutionStatus) -> Vec<&str> {
        self.engines
            .iter()
            .filter(|e| e.status == status)
            .map(|e| e.engine.as_str())
            .collect()
    }
}
