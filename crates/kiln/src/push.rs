//! Applying a push plan to a database.
//!
//! Steps run in plan order, each through [`DdlExecutor::apply`]. The first
//! failing step stops the push: steps before it stay applied, steps after
//! it are skipped, and the [`PushReport`] says which is which.

use crate::solver::{PushPlan, StepPhase};
use crate::traced::ConnectionExt;
use std::fmt;
use std::future::Future;

/// A statement the database refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyError {
    /// The statement that failed.
    pub statement: String,
    /// The database's explanation.
    pub message: String,
}

impl ApplyError {
    pub fn new(statement: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            statement: statement.into(),
            message: message.into(),
        }
    }

    fn from_postgres(statement: &str, err: &tokio_postgres::Error) -> Self {
        let message = err
            .as_db_error()
            .map(|db| db.message().to_string())
            .unwrap_or_else(|| err.to_string());
        Self::new(statement, message)
    }
}

impl fmt::Display for ApplyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (while running `{}`)", self.message, self.statement)
    }
}

impl std::error::Error for ApplyError {}

/// Runs the statements of one push step.
///
/// Implementations must apply a step atomically: either every statement
/// takes effect or none does.
pub trait DdlExecutor {
    fn apply(
        &mut self,
        table: &str,
        statements: &[String],
    ) -> impl Future<Output = Result<(), ApplyError>> + Send;
}

/// Applies each step in its own PostgreSQL transaction.
pub struct PostgresExecutor<'c> {
    client: &'c mut tokio_postgres::Client,
}

impl<'c> PostgresExecutor<'c> {
    pub fn new(client: &'c mut tokio_postgres::Client) -> Self {
        Self { client }
    }
}

impl DdlExecutor for PostgresExecutor<'_> {
    async fn apply(&mut self, table: &str, statements: &[String]) -> Result<(), ApplyError> {
        let tx = self
            .client
            .transaction()
            .await
            .map_err(|e| ApplyError::from_postgres("BEGIN", &e))?;

        for statement in statements {
            // dropping `tx` on error rolls the step back
            tx.traced()
                .execute(statement, &[])
                .await
                .map_err(|e| ApplyError::from_postgres(statement, &e))?;
        }

        tx.commit()
            .await
            .map_err(|e| ApplyError::from_postgres("COMMIT", &e))?;
        tracing::debug!(%table, statements = statements.len(), "committed");
        Ok(())
    }
}

/// What happened to a step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepStatus {
    Applied { statements: usize },
    Failed(ApplyError),
    /// Not attempted because an earlier step failed.
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepReport {
    pub table: String,
    pub phase: StepPhase,
    pub status: StepStatus,
}

/// Outcome of a push, one entry per planned step.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PushReport {
    pub steps: Vec<StepReport>,
}

impl PushReport {
    pub fn applied(&self) -> impl Iterator<Item = &StepReport> {
        self.steps
            .iter()
            .filter(|s| matches!(s.status, StepStatus::Applied { .. }))
    }

    /// The failed step, if any.
    pub fn failed(&self) -> Option<(&StepReport, &ApplyError)> {
        self.steps.iter().find_map(|s| match &s.status {
            StepStatus::Failed(err) => Some((s, err)),
            _ => None,
        })
    }

    pub fn skipped(&self) -> impl Iterator<Item = &StepReport> {
        self.steps
            .iter()
            .filter(|s| matches!(s.status, StepStatus::Skipped))
    }

    pub fn is_success(&self) -> bool {
        self.failed().is_none()
    }
}

/// Apply `plan` step by step, stopping at the first failure.
pub async fn apply_plan<E: DdlExecutor>(plan: &PushPlan, executor: &mut E) -> PushReport {
    let mut report = PushReport::default();
    let mut failed = false;

    for step in &plan.steps {
        let status = if failed {
            StepStatus::Skipped
        } else {
            let statements = step.statements();
            tracing::info!(
                table = %step.table,
                phase = %step.phase,
                statements = statements.len(),
                "applying"
            );
            match executor.apply(&step.table, &statements).await {
                Ok(()) => StepStatus::Applied {
                    statements: statements.len(),
                },
                Err(err) => {
                    tracing::error!(
                        table = %step.table,
                        statement = %err.statement,
                        error = %err.message,
                        "step failed, skipping the rest"
                    );
                    failed = true;
                    StepStatus::Failed(err)
                }
            }
        };

        report.steps.push(StepReport {
            table: step.table.clone(),
            phase: step.phase,
            status,
        });
    }

    report
}
