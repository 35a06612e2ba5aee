use std::collections::HashMap;

use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    application::repos::{CategoriesRepo, RepoError},
    domain::categories::CategoryRecord,
};

use super::{PostgresRepositories, map_sqlx_error};

#[derive(sqlx::FromRow)]
struct CategoryRow {
    id: Uuid,
    name: String,
    parent_id: Option<Uuid>,
}

#[async_trait]
impl CategoriesRepo for PostgresRepositories {
    async fn list_categories(&self) -> Result<Vec<CategoryRecord>, RepoError> {
        let rows = sqlx::query_as::<_, CategoryRow>(
            r#"
            SELECT id, name, parent_id
            FROM categories
            ORDER BY created_at, name, id
            "#,
        )
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(resolve_children(rows))
    }
}

/// Turn rows into records whose `children` list the ids pointing back at them.
fn resolve_children(rows: Vec<CategoryRow>) -> Vec<CategoryRecord> {
    let mut children: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
    for row in &rows {
        if let Some(parent) = row.parent_id {
            children.entry(parent).or_default().push(row.id);
        }
    }

    rows.into_iter()
        .map(|row| CategoryRecord {
            children: children.remove(&row.id).unwrap_or_default(),
            id: row.id,
            name: row.name,
            parent_id: row.parent_id,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: u128, parent: Option<u128>) -> CategoryRow {
        CategoryRow {
            id: Uuid::from_u128(id),
            name: format!("c{id}"),
            parent_id: parent.map(Uuid::from_u128),
        }
    }

    #[test]
    fn children_are_collected_in_row_order() {
        let records = resolve_children(vec![row(1, None), row(2, Some(1)), row(3, Some(1))]);

        assert_eq!(
            records[0].children,
            vec![Uuid::from_u128(2), Uuid::from_u128(3)]
        );
        assert!(records[1].children.is_empty());
        assert_eq!(records[2].parent_id, Some(Uuid::from_u128(1)));
    }
}
