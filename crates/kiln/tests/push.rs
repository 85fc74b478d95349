use kiln::{
    ApplyError, DdlExecutor, EntitySchema, RelationDefinition, ResolvedSchema, Schema,
    SchemaBuilder, StepPhase, StepStatus,
};

/// Records every statement, failing on one table.
#[derive(Default)]
struct RecordingExecutor {
    applied: Vec<(String, Vec<String>)>,
    fail_on: Option<String>,
}

impl DdlExecutor for RecordingExecutor {
    async fn apply(&mut self, table: &str, statements: &[String]) -> Result<(), ApplyError> {
        if self.fail_on.as_deref() == Some(table) {
            return Err(ApplyError::new(
                statements.first().cloned().unwrap_or_default(),
                "permission denied",
            ));
        }
        self.applied.push((table.to_string(), statements.to_vec()));
        Ok(())
    }
}

fn blog() -> ResolvedSchema {
    let mut builder = SchemaBuilder::new();
    builder.add_schema(EntitySchema::new("User")).unwrap();
    builder
        .add_schema(EntitySchema::new("Post").relation("author", RelationDefinition::belongs_to("User")))
        .unwrap();
    builder
        .add_schema(
            EntitySchema::new("Comment").relation("post", RelationDefinition::belongs_to("Post")),
        )
        .unwrap();
    builder.resolve_relations().unwrap()
}

#[tokio::test]
async fn test_push_applies_every_step() {
    let resolved = blog();
    let mut executor = RecordingExecutor::default();

    let report = resolved
        .push_schema(&mut executor, &Schema::new())
        .await
        .unwrap();

    assert!(report.is_success());
    assert_eq!(report.applied().count(), 3);

    let tables: Vec<&str> = executor.applied.iter().map(|(t, _)| t.as_str()).collect();
    assert_eq!(tables, vec!["user", "post", "comment"]);

    let post = &executor.applied[1].1;
    assert!(post[0].starts_with("CREATE TABLE \"post\""));
    assert!(post.iter().any(|s| s.contains("FOREIGN KEY (\"user_id\")")));
}

#[tokio::test]
async fn test_push_stops_at_first_failure() {
    let resolved = blog();
    let mut executor = RecordingExecutor {
        fail_on: Some("post".to_string()),
        ..Default::default()
    };

    let report = resolved
        .push_schema(&mut executor, &Schema::new())
        .await
        .unwrap();

    assert!(!report.is_success());
    let (step, err) = report.failed().unwrap();
    assert_eq!(step.table, "post");
    assert_eq!(step.phase, StepPhase::Table);
    assert_eq!(err.message, "permission denied");
    assert!(err.statement.starts_with("CREATE TABLE \"post\""));

    let skipped: Vec<&str> = report.skipped().map(|s| s.table.as_str()).collect();
    assert_eq!(skipped, vec!["comment"]);
    assert_eq!(executor.applied.len(), 1);
    assert_eq!(
        report.steps[0].status,
        StepStatus::Applied { statements: 1 }
    );
}

#[tokio::test]
async fn test_push_up_to_date() {
    let resolved = blog();
    let live = resolved.schema().clone();
    let mut executor = RecordingExecutor::default();

    let report = resolved.push_schema(&mut executor, &live).await.unwrap();

    assert!(report.steps.is_empty());
    assert!(executor.applied.is_empty());
}

#[tokio::test]
async fn test_push_only_touches_changed_tables() {
    let resolved = blog();
    let mut live = resolved.schema().clone();
    live.tables.shift_remove("comment");
    let mut executor = RecordingExecutor::default();

    let report = resolved.push_schema(&mut executor, &live).await.unwrap();

    let tables: Vec<&str> = report.steps.iter().map(|s| s.table.as_str()).collect();
    assert_eq!(tables, vec!["comment"]);
    assert!(report.is_success());
}
