//! Dropping everything in the managed schemas.

use super::{CommandEngine, EngineState};
use crate::db::{ObjectRef, SchemaObject};
use crate::error::{KeelError, Result};
use crate::history::MigrationType;
use itertools::Itertools;
use petgraph::algo::toposort;
use petgraph::graph::DiGraph;
use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default, Serialize)]
pub struct CleanResult {
    /// Schemas emptied but kept
    pub schemas_cleaned: Vec<String>,
    /// Schemas keel created and dropped whole
    pub schemas_dropped: Vec<String>,
    pub objects_dropped: Vec<String>,
    /// Drops that failed; clean carries on past them
    pub warnings: Vec<String>,
}

impl CommandEngine {
    /// Drop all objects in the managed schemas, and the schemas themselves
    /// when keel created them.
    pub async fn clean(&self) -> Result<CleanResult> {
        self.run_command(async {
            if self.config.behavior.clean_disabled {
                return Err(KeelError::CleanDisabled);
            }
            self.transition(EngineState::Locking)?;
            self.lock.with_lock(self.clean_locked()).await
        })
        .await
    }

    async fn clean_locked(&self) -> Result<CleanResult> {
        let mut result = CleanResult::default();

        self.transition(EngineState::LoadingHistory)?;
        let created = self.created_schemas().await?;
        let mut existing = Vec::new();
        for schema in &self.config.schemas.names {
            if self.db.schema_exists(schema).await? {
                existing.push(schema.clone());
            } else {
                debug!("Schema {} does not exist, skipping", schema);
            }
        }

        self.transition(EngineState::Executing)?;
        for object in self.db.list_global_objects(&existing).await? {
            self.drop_object(&object, &mut result).await;
        }

        let mut objects = Vec::new();
        for schema in &existing {
            objects.extend(self.db.list_schema_objects(schema).await?);
        }
        for object in drop_order(objects) {
            self.drop_object(&object, &mut result).await;
        }

        for schema in existing.iter().rev() {
            if !created.contains(schema) {
                result.schemas_cleaned.push(schema.clone());
                continue;
            }
            match self.db.drop_schema(schema).await {
                Ok(()) => {
                    info!("Dropped schema {}", schema);
                    result.schemas_dropped.push(schema.clone());
                }
                Err(e) => {
                    self.warn(
                        &mut result.warnings,
                        format!("Unable to drop schema {} ({}); cleaned it instead", schema, e),
                    );
                    result.schemas_cleaned.push(schema.clone());
                }
            }
        }
        result.schemas_cleaned.reverse();
        result.schemas_dropped.reverse();

        self.history.clear_cache().await;
        info!(
            "Cleaned {} object(s) in {}",
            result.objects_dropped.len(),
            existing.iter().join(", ")
        );
        self.transition(EngineState::Unlocking)?;
        Ok(result)
    }

    /// Schemas recorded by the schema creation marker.
    async fn created_schemas(&self) -> Result<Vec<String>> {
        if !self.history.exists().await? {
            return Ok(Vec::new());
        }
        Ok(self
            .load_history()
            .await?
            .into_iter()
            .filter(|row| row.migration_type == MigrationType::Schema)
            .flat_map(|row| {
                row.script
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect::<Vec<_>>()
            })
            .collect())
    }

    async fn drop_object(&self, object: &SchemaObject, result: &mut CleanResult) {
        let sql = self.db.drop_object_sql(object);
        debug!("Dropping {} {}", object.kind, object.id);
        match self.db.execute(&sql).await {
            Ok(()) => result
                .objects_dropped
                .push(format!("{} {}", object.kind, object.id)),
            Err(e) => self.warn(
                &mut result.warnings,
                format!("Unable to drop {} {}: {}", object.kind, object.id, e),
            ),
        }
    }
}

/// Dependents before the objects they depend on.
pub fn drop_order(objects: Vec<SchemaObject>) -> Vec<SchemaObject> {
    let objects: Vec<SchemaObject> = objects
        .into_iter()
        .sorted_by(|a, b| {
            a.kind
                .drop_priority()
                .cmp(&b.kind.drop_priority())
                .then_with(|| a.id.cmp(&b.id))
                .then_with(|| a.signature.cmp(&b.signature))
        })
        .collect();

    let mut graph = DiGraph::<usize, ()>::new();
    let nodes: Vec<_> = (0..objects.len()).map(|i| graph.add_node(i)).collect();
    // overloaded routines share a name, so a reference may match several objects
    let mut index: HashMap<&ObjectRef, Vec<usize>> = HashMap::new();
    for (i, object) in objects.iter().enumerate() {
        index.entry(&object.id).or_default().push(i);
    }

    for (i, object) in objects.iter().enumerate() {
        for dependency in &object.depends_on {
            for &j in index.get(dependency).into_iter().flatten() {
                if i != j {
                    graph.add_edge(nodes[i], nodes[j], ());
                }
            }
        }
    }

    match toposort(&graph, None) {
        Ok(sorted) => sorted
            .into_iter()
            .map(|node| objects[graph[node]].clone())
            .collect(),
        Err(cycle) => {
            warn!(
                "Dependency cycle involving {}, dropping in kind order",
                objects[graph[cycle.node_id()]].id
            );
            objects
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::ObjectKind;

    fn object(kind: ObjectKind, name: &str, depends_on: &[&str]) -> SchemaObject {
        object_in("public", kind, name, depends_on)
    }

    /// `depends_on` entries are `name` in the same schema or `schema.name`.
    fn object_in(schema: &str, kind: ObjectKind, name: &str, depends_on: &[&str]) -> SchemaObject {
        SchemaObject {
            kind,
            id: ObjectRef {
                schema: Some(schema.to_string()),
                name: name.to_string(),
            },
            signature: None,
            depends_on: depends_on
                .iter()
                .map(|d| match d.split_once('.') {
                    Some((s, n)) => ObjectRef {
                        schema: Some(s.to_string()),
                        name: n.to_string(),
                    },
                    None => ObjectRef {
                        schema: Some(schema.to_string()),
                        name: d.to_string(),
                    },
                })
                .collect(),
        }
    }

    fn position_in(order: &[SchemaObject], schema: &str, name: &str) -> usize {
        order
            .iter()
            .position(|o| o.id.schema.as_deref() == Some(schema) && o.id.name == name)
            .unwrap()
    }

    fn position(order: &[SchemaObject], name: &str) -> usize {
        order.iter().position(|o| o.id.name == name).unwrap()
    }

    #[test]
    fn test_dependents_dropped_first() {
        let order = drop_order(vec![
            object(ObjectKind::Table, "users", &[]),
            object(ObjectKind::Table, "orders", &["users"]),
            object(ObjectKind::View, "user_orders", &["users", "orders"]),
            object(ObjectKind::View, "top_users", &["user_orders"]),
        ]);
        assert!(position(&order, "top_users") < position(&order, "user_orders"));
        assert!(position(&order, "user_orders") < position(&order, "orders"));
        assert!(position(&order, "orders") < position(&order, "users"));
    }

    #[test]
    fn test_cycle_falls_back_to_kind_order() {
        let order = drop_order(vec![
            object(ObjectKind::Table, "a", &["b"]),
            object(ObjectKind::Table, "b", &["a"]),
            object(ObjectKind::View, "v", &[]),
        ]);
        assert_eq!(order.len(), 3);
        assert_eq!(order[0].id.name, "v");
    }

    #[test]
    fn test_unknown_dependencies_are_ignored() {
        let order = drop_order(vec![object(ObjectKind::View, "v", &["elsewhere"])]);
        assert_eq!(order.len(), 1);
    }

    #[test]
    fn test_overloads_all_ordered_after_dependents() {
        let mut one = object(ObjectKind::Routine, "total", &[]);
        one.signature = Some("integer".to_string());
        let mut two = object(ObjectKind::Routine, "total", &[]);
        two.signature = Some("integer, integer".to_string());
        let view = object(ObjectKind::View, "totals", &["total"]);

        let order = drop_order(vec![one, two, view]);

        assert_eq!(order.len(), 3);
        let view_at = position(&order, "totals");
        for (i, o) in order.iter().enumerate() {
            if o.id.name == "total" {
                assert!(view_at < i, "view must be dropped before {:?}", o.signature);
            }
        }
    }

    #[test]
    fn test_same_name_in_other_schema_is_distinct() {
        let order = drop_order(vec![
            object_in("app", ObjectKind::Table, "users", &[]),
            object_in("audit", ObjectKind::Table, "users", &[]),
            object_in("audit", ObjectKind::Table, "log", &["app.users"]),
        ]);
        assert!(position_in(&order, "audit", "log") < position_in(&order, "app", "users"));
        assert_eq!(order.len(), 3);
    }
}
