//! Push planner: orders table changes so that every statement can succeed.
//!
//! Each changed table becomes one step. A step that adds a foreign key to
//! another changed table must run after that table's step, otherwise the
//! referenced table (or column) may not exist yet:
//!
//! ```text
//! -- This fails:
//! CREATE TABLE "comment" (...);
//! ALTER TABLE "comment" ADD CONSTRAINT ... REFERENCES "post" ("id");  -- "post" doesn't exist!
//! CREATE TABLE "post" (...);
//!
//! -- This works:
//! CREATE TABLE "post" (...);
//! CREATE TABLE "comment" (...);
//! ALTER TABLE "comment" ADD CONSTRAINT ... REFERENCES "post" ("id");
//! ```
//!
//! Steps are sorted topologically; declaration order breaks ties, so the
//! same diff always yields the same plan. Tables whose foreign keys form a
//! cycle are either rejected or, under [`CyclePolicy::Defer`], created
//! without the offending constraints, which are then added by trailing
//! [`StepPhase::DeferredConstraints`] steps.
//!
//! Dropped foreign keys that point into another changed table go the other
//! way: they are pulled into leading [`StepPhase::ReleasedConstraints`]
//! steps, so the referenced column is free by the time its table's step
//! drops or retypes it.

use crate::diff::{Change, SchemaDiff};
use kiln_db_schema::Schema;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

/// What to do when foreign keys between tables form a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CyclePolicy {
    /// Refuse the schema.
    #[default]
    Reject,
    /// Create the tables first and add the cyclic constraints afterwards.
    Defer,
}

impl fmt::Display for CyclePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CyclePolicy::Reject => f.write_str("reject"),
            CyclePolicy::Defer => f.write_str("defer"),
        }
    }
}

impl FromStr for CyclePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reject" => Ok(CyclePolicy::Reject),
            "defer" => Ok(CyclePolicy::Defer),
            other => Err(format!(
                "unknown cycle policy '{}' (expected reject or defer)",
                other
            )),
        }
    }
}

/// Error when a diff cannot be turned into a push plan.
#[derive(Debug, Clone, PartialEq)]
pub enum OrderError {
    /// Foreign keys between these tables form a cycle.
    Cycle { tables: Vec<String> },
    /// A foreign key references a table that is neither declared nor live.
    ForeignKeyTargetNotFound { table: String, target: String },
}

impl fmt::Display for OrderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderError::Cycle { tables } => {
                write!(
                    f,
                    "dependency cycle detected, cannot order: {}",
                    tables.join(" -> ")
                )
            }
            OrderError::ForeignKeyTargetNotFound { table, target } => {
                write!(
                    f,
                    "foreign key from '{}' references non-existent table '{}'",
                    table, target
                )
            }
        }
    }
}

impl std::error::Error for OrderError {}

/// Which part of a table's changes a step carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepPhase {
    /// Foreign keys into other changed tables, dropped before any table step.
    ReleasedConstraints,
    /// The table's changes, minus any released or deferred constraints.
    Table,
    /// Foreign keys held back until every table of a cycle exists.
    DeferredConstraints,
}

impl fmt::Display for StepPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepPhase::ReleasedConstraints => f.write_str("released constraints"),
            StepPhase::Table => f.write_str("table"),
            StepPhase::DeferredConstraints => f.write_str("deferred constraints"),
        }
    }
}

/// Changes applied together, in one transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct PushStep {
    pub table: String,
    pub phase: StepPhase,
    pub changes: Vec<Change>,
}

impl PushStep {
    /// SQL statements of this step, in order.
    pub fn statements(&self) -> Vec<String> {
        self.changes
            .iter()
            .map(|change| change.to_sql(&self.table))
            .collect()
    }
}

/// Ordered steps bringing the database in line with the declared schema.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PushPlan {
    pub steps: Vec<PushStep>,
}

impl PushPlan {
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Every statement of the plan, in execution order.
    pub fn statements(&self) -> Vec<String> {
        self.steps.iter().flat_map(PushStep::statements).collect()
    }

    /// Render the plan as a SQL script, one block per step.
    pub fn to_sql(&self) -> String {
        let mut sql = String::new();
        for step in &self.steps {
            match step.phase {
                StepPhase::ReleasedConstraints => {
                    sql.push_str(&format!("-- Released constraints: {}\n", step.table))
                }
                StepPhase::Table => sql.push_str(&format!("-- Table: {}\n", step.table)),
                StepPhase::DeferredConstraints => {
                    sql.push_str(&format!("-- Deferred constraints: {}\n", step.table))
                }
            }
            for statement in step.statements() {
                sql.push_str(&statement);
                sql.push('\n');
            }
            sql.push('\n');
        }
        sql
    }
}

/// Order the table diffs of `diff` into a push plan.
///
/// `live` is the current database state; foreign keys may reference tables
/// that are either changed in this diff or already live.
pub fn plan_push(
    diff: &SchemaDiff,
    live: &Schema,
    policy: CyclePolicy,
) -> Result<PushPlan, OrderError> {
    let position: HashMap<&str, usize> = diff
        .table_diffs
        .iter()
        .enumerate()
        .map(|(i, t)| (t.table.as_str(), i))
        .collect();

    let mut changes: Vec<Vec<Change>> = Vec::with_capacity(diff.table_diffs.len());
    let mut deps: Vec<HashSet<usize>> = Vec::with_capacity(diff.table_diffs.len());
    let mut released: Vec<PushStep> = Vec::new();

    for table_diff in &diff.table_diffs {
        let (release, table_changes): (Vec<Change>, Vec<Change>) =
            table_diff.changes.iter().cloned().partition(|c| {
                matches!(c, Change::DropForeignKey(fk)
                    if fk.references_table != table_diff.table
                        && position.contains_key(fk.references_table.as_str()))
            });
        if !release.is_empty() {
            released.push(PushStep {
                table: table_diff.table.clone(),
                phase: StepPhase::ReleasedConstraints,
                changes: release,
            });
        }

        let mut table_deps = HashSet::new();
        for change in &table_changes {
            let Change::AddForeignKey(fk) = change else {
                continue;
            };
            let target = fk.references_table.as_str();
            match position.get(target) {
                Some(&i) if target != table_diff.table => {
                    table_deps.insert(i);
                }
                Some(_) => {}
                None if live.get_table(target).is_some() => {}
                None => {
                    return Err(OrderError::ForeignKeyTargetNotFound {
                        table: table_diff.table.clone(),
                        target: target.to_string(),
                    });
                }
            }
        }
        changes.push(table_changes);
        deps.push(table_deps);
    }

    let mut order: Vec<usize> = Vec::with_capacity(changes.len());
    let mut scheduled = vec![false; changes.len()];
    let mut deferred: Vec<(usize, Vec<Change>)> = Vec::new();

    while order.len() < changes.len() {
        let ready = (0..changes.len())
            .find(|&i| !scheduled[i] && deps[i].iter().all(|&d| scheduled[d]));

        if let Some(i) = ready {
            scheduled[i] = true;
            order.push(i);
            continue;
        }

        // Stuck: whatever is left depends on a cycle.
        let remaining: Vec<usize> = (0..changes.len()).filter(|&i| !scheduled[i]).collect();
        let cyclic = cyclic_edges(&remaining, &deps);

        if policy == CyclePolicy::Reject || cyclic.is_empty() {
            let mut tables: Vec<String> = remaining
                .iter()
                .filter(|&&i| cyclic.iter().any(|&(from, _)| from == i))
                .map(|&i| diff.table_diffs[i].table.clone())
                .collect();
            if tables.is_empty() {
                tables = remaining
                    .iter()
                    .map(|&i| diff.table_diffs[i].table.clone())
                    .collect();
            }
            return Err(OrderError::Cycle { tables });
        }

        for &(from, to) in &cyclic {
            let target = diff.table_diffs[to].table.as_str();
            let (held, kept): (Vec<Change>, Vec<Change>) = std::mem::take(&mut changes[from])
                .into_iter()
                .partition(|c| {
                    matches!(c, Change::AddForeignKey(fk) if fk.references_table == target)
                });
            changes[from] = kept;
            deps[from].remove(&to);

            match deferred.iter_mut().find(|(i, _)| *i == from) {
                Some((_, pending)) => pending.extend(held),
                None => deferred.push((from, held)),
            }
        }
        let tables: Vec<&str> = cyclic
            .iter()
            .map(|&(from, _)| diff.table_diffs[from].table.as_str())
            .collect();
        tracing::warn!(?tables, "foreign key cycle, deferring constraints");
    }

    let mut steps = released;
    steps.extend(order.into_iter().filter_map(|i| {
        let table_changes = std::mem::take(&mut changes[i]);
        (!table_changes.is_empty()).then(|| PushStep {
            table: diff.table_diffs[i].table.clone(),
            phase: StepPhase::Table,
            changes: table_changes,
        })
    }));

    deferred.sort_by_key(|(i, _)| *i);
    steps.extend(deferred.into_iter().map(|(i, held)| PushStep {
        table: diff.table_diffs[i].table.clone(),
        phase: StepPhase::DeferredConstraints,
        changes: held,
    }));

    Ok(PushPlan { steps })
}

/// Dependency edges `(from, to)` among `nodes` that lie on a cycle, i.e.
/// where `to` can reach `from` back.
fn cyclic_edges(nodes: &[usize], deps: &[HashSet<usize>]) -> Vec<(usize, usize)> {
    let within: HashSet<usize> = nodes.iter().copied().collect();

    let reaches = |start: usize, goal: usize| -> bool {
        let mut seen = HashSet::new();
        let mut stack = vec![start];
        while let Some(node) = stack.pop() {
            if node == goal {
                return true;
            }
            if !seen.insert(node) {
                continue;
            }
            stack.extend(deps[node].iter().copied().filter(|d| within.contains(d)));
        }
        false
    };

    let mut edges = Vec::new();
    for &from in nodes {
        let mut targets: Vec<usize> = deps[from]
            .iter()
            .copied()
            .filter(|to| within.contains(to) && reaches(*to, from))
            .collect();
        targets.sort_unstable();
        edges.extend(targets.into_iter().map(|to| (from, to)));
    }
    edges
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::diff_schemas;
    use kiln_db_schema::{AbstractType, Column, ForeignKey, ReferentialAction, Table};

    fn make_table(name: &str, references: &[&str]) -> Table {
        let mut table = Table::new(name);
        table.columns.push(Column::primary("id", AbstractType::Primary));
        for target in references {
            let column = format!("{}_id", target);
            table
                .columns
                .push(Column::new(column.clone(), AbstractType::Integer).nullable(true));
            table.foreign_keys.push(ForeignKey::new(
                name,
                column,
                *target,
                "id",
                ReferentialAction::Cascade,
            ));
        }
        table
    }

    fn step_tables(plan: &PushPlan) -> Vec<(&str, StepPhase)> {
        plan.steps
            .iter()
            .map(|s| (s.table.as_str(), s.phase))
            .collect()
    }

    #[test]
    fn test_referenced_tables_come_first() {
        let declared: Schema = [
            make_table("comment", &["post", "user"]),
            make_table("post", &["user"]),
            make_table("user", &[]),
        ]
        .into_iter()
        .collect();

        let diff = diff_schemas(&declared, &Schema::new());
        let plan = plan_push(&diff, &Schema::new(), CyclePolicy::Reject).unwrap();

        assert_eq!(
            step_tables(&plan),
            vec![
                ("user", StepPhase::Table),
                ("post", StepPhase::Table),
                ("comment", StepPhase::Table),
            ]
        );
    }

    #[test]
    fn test_declaration_order_breaks_ties() {
        let declared: Schema = [
            make_table("b", &[]),
            make_table("a", &[]),
            make_table("c", &[]),
        ]
        .into_iter()
        .collect();

        let diff = diff_schemas(&declared, &Schema::new());
        let plan = plan_push(&diff, &Schema::new(), CyclePolicy::Reject).unwrap();

        let tables: Vec<&str> = plan.steps.iter().map(|s| s.table.as_str()).collect();
        assert_eq!(tables, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_self_reference_is_not_a_cycle() {
        let declared: Schema = [make_table("category", &["category"])].into_iter().collect();

        let diff = diff_schemas(&declared, &Schema::new());
        let plan = plan_push(&diff, &Schema::new(), CyclePolicy::Reject).unwrap();
        assert_eq!(plan.steps.len(), 1);
    }

    #[test]
    fn test_live_target_is_accepted() {
        let user = make_table("user", &[]);
        let declared: Schema = [user.clone(), make_table("post", &["user"])]
            .into_iter()
            .collect();
        let live: Schema = [user].into_iter().collect();

        let diff = diff_schemas(&declared, &live);
        let plan = plan_push(&diff, &live, CyclePolicy::Reject).unwrap();
        assert_eq!(step_tables(&plan), vec![("post", StepPhase::Table)]);
    }

    #[test]
    fn test_missing_target_is_an_error() {
        let declared: Schema = [make_table("post", &["user"])].into_iter().collect();

        let diff = diff_schemas(&declared, &Schema::new());
        let result = plan_push(&diff, &Schema::new(), CyclePolicy::Reject);
        assert_eq!(
            result,
            Err(OrderError::ForeignKeyTargetNotFound {
                table: "post".to_string(),
                target: "user".to_string(),
            })
        );
    }

    #[test]
    fn test_cycle_is_rejected() {
        let declared: Schema = [
            make_table("a", &["b"]),
            make_table("b", &["a"]),
            make_table("c", &[]),
        ]
        .into_iter()
        .collect();

        let diff = diff_schemas(&declared, &Schema::new());
        let result = plan_push(&diff, &Schema::new(), CyclePolicy::Reject);
        assert_eq!(
            result,
            Err(OrderError::Cycle {
                tables: vec!["a".to_string(), "b".to_string()],
            })
        );
    }

    #[test]
    fn test_cycle_is_deferred() {
        let declared: Schema = [
            make_table("a", &["b"]),
            make_table("b", &["a"]),
            make_table("d", &["a"]),
        ]
        .into_iter()
        .collect();

        let diff = diff_schemas(&declared, &Schema::new());
        let plan = plan_push(&diff, &Schema::new(), CyclePolicy::Defer).unwrap();

        assert_eq!(
            step_tables(&plan),
            vec![
                ("a", StepPhase::Table),
                ("b", StepPhase::Table),
                ("d", StepPhase::Table),
                ("a", StepPhase::DeferredConstraints),
                ("b", StepPhase::DeferredConstraints),
            ]
        );

        // the table steps carry no cyclic constraint
        for step in &plan.steps[..2] {
            assert!(
                !step
                    .changes
                    .iter()
                    .any(|c| matches!(c, Change::AddForeignKey(_)))
            );
        }
        // d's constraint on a isn't part of the cycle
        assert!(
            plan.steps[2]
                .changes
                .iter()
                .any(|c| matches!(c, Change::AddForeignKey(_)))
        );
        assert_eq!(plan.steps[3].changes.len(), 1);
    }

    #[test]
    fn test_dropped_references_are_released_first() {
        let mut live_user = make_table("user", &[]);
        live_user
            .columns
            .push(Column::new("uid", AbstractType::Integer));
        let mut live_post = make_table("post", &[]);
        live_post
            .columns
            .push(Column::new("user_uid", AbstractType::Integer));
        live_post.foreign_keys.push(ForeignKey::new(
            "post",
            "user_uid",
            "user",
            "uid",
            ReferentialAction::Cascade,
        ));
        let live: Schema = [live_user, live_post].into_iter().collect();
        let declared: Schema = [make_table("user", &[]), make_table("post", &[])]
            .into_iter()
            .collect();

        let diff = diff_schemas(&declared, &live);
        let plan = plan_push(&diff, &live, CyclePolicy::Reject).unwrap();

        assert_eq!(
            step_tables(&plan),
            vec![
                ("post", StepPhase::ReleasedConstraints),
                ("user", StepPhase::Table),
                ("post", StepPhase::Table),
            ]
        );
        insta::assert_snapshot!(plan.statements().join("\n"), @r#"
        ALTER TABLE "post" DROP CONSTRAINT "fk_post_user_uid";
        ALTER TABLE "user" DROP COLUMN "uid";
        ALTER TABLE "post" DROP COLUMN "user_uid";
        "#);
    }

    #[test]
    fn test_plan_sql() {
        let declared: Schema = [make_table("post", &["user"]), make_table("user", &[])]
            .into_iter()
            .collect();

        let diff = diff_schemas(&declared, &Schema::new());
        let plan = plan_push(&diff, &Schema::new(), CyclePolicy::Reject).unwrap();

        insta::assert_snapshot!(plan.to_sql(), @r#"
        -- Table: user
        CREATE TABLE "user" (
            "id" SERIAL PRIMARY KEY
        );

        -- Table: post
        CREATE TABLE "post" (
            "id" SERIAL PRIMARY KEY,
            "user_id" INTEGER
        );
        ALTER TABLE "post" ADD CONSTRAINT "fk_post_user_id" FOREIGN KEY ("user_id") REFERENCES "user" ("id") ON DELETE CASCADE ON UPDATE CASCADE;
        "#);
    }

    #[test]
    fn test_cycle_policy_from_str() {
        assert_eq!("defer".parse::<CyclePolicy>(), Ok(CyclePolicy::Defer));
        assert_eq!(" Reject ".parse::<CyclePolicy>(), Ok(CyclePolicy::Reject));
        assert!("sometimes".parse::<CyclePolicy>().is_err());
    }
}
