//! Drag-and-drop re-sequencing of orderable resources.
//!
//! A list is loaded sorted by `order`, one item is moved to another item's
//! position, every item is renumbered `1..=n` and the whole sequence is
//! written back through `DataProvider::batch_update_order`.

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, instrument};

use crate::domain::Resource;
use crate::error::{AdminError, AdminResult};
use crate::protocol::{ListParams, OrderUpdate, Pagination, Sort};
use crate::provider::DataProvider;
use crate::records::{id_string, values_equal};

/// Enough for any single parent; lists are not paginated in the ordering view.
const ORDERING_LIMIT: u64 = 1000;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct OrderedItem {
    pub id: Value,
    pub name: String,
    pub order: i64,
}

fn ensure_orderable(resource: Resource) -> AdminResult<()> {
    if resource.is_orderable() {
        Ok(())
    } else {
        Err(AdminError::validation(resource.name(), "resource has no display order"))
    }
}

#[instrument(level = "info", skip(provider), fields(%resource))]
pub async fn load_items(
    provider: &DataProvider,
    resource: Resource,
    parent: Option<Value>,
) -> AdminResult<Vec<OrderedItem>> {
    ensure_orderable(resource)?;
    let mut params = ListParams::new(Pagination::new(1, ORDERING_LIMIT), Sort::asc("order"));
    if let (Some(field), Some(parent)) = (resource.parent_field(), parent) {
        params = params.filter(field, parent);
    }
    let list = provider.get_list(resource, &params).await?;
    Ok(list
        .data
        .into_iter()
        .map(|r| OrderedItem {
            id: r.get("id").cloned().unwrap_or(Value::Null),
            name: r.get("name").and_then(Value::as_str).unwrap_or_default().to_string(),
            order: r.get("order").and_then(Value::as_i64).unwrap_or(0),
        })
        .collect())
}

/// Move `active` to the position of `over` and renumber from 1. Returns
/// false, leaving `items` untouched, when the ids are equal or unknown.
pub fn move_item(items: &mut Vec<OrderedItem>, active: &Value, over: &Value) -> bool {
    if values_equal(active, over) {
        return false;
    }
    let from = items.iter().position(|i| values_equal(&i.id, active));
    let to = items.iter().position(|i| values_equal(&i.id, over));
    let (Some(from), Some(to)) = (from, to) else {
        return false;
    };
    let item = items.remove(from);
    items.insert(to, item);
    for (index, item) in items.iter_mut().enumerate() {
        item.order = index as i64 + 1;
    }
    true
}

#[instrument(level = "info", skip(provider, items), fields(%resource, n = items.len()))]
pub async fn save_items(provider: &DataProvider, resource: Resource, items: &[OrderedItem]) -> AdminResult<usize> {
    ensure_orderable(resource)?;
    let updates: Vec<OrderUpdate> = items
        .iter()
        .map(|i| OrderUpdate { id: i.id.clone(), order: i.order })
        .collect();
    provider.batch_update_order(resource, &updates).await
}

/// Load, move and save in one step. The returned sequence is what was
/// persisted; an unknown or identical pair saves nothing.
#[instrument(level = "info", skip(provider), fields(%resource))]
pub async fn reorder(
    provider: &DataProvider,
    resource: Resource,
    parent: Option<Value>,
    active: &Value,
    over: &Value,
) -> AdminResult<Vec<OrderedItem>> {
    let mut items = load_items(provider, resource, parent).await?;
    if !move_item(&mut items, active, over) {
        debug!(target: "ordering", active = %id_string(active), over = %id_string(over), "nothing to move");
        return Ok(items);
    }
    save_items(provider, resource, &items).await?;
    info!(target: "ordering", %resource, active = %id_string(active), over = %id_string(over), "item moved");
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryStore;
    use crate::seeds::demo_dataset;
    use serde_json::json;
    use std::sync::Arc;

    fn item(id: i64, order: i64) -> OrderedItem {
        OrderedItem { id: json!(id), name: format!("item {id}"), order }
    }

    fn ids(items: &[OrderedItem]) -> Vec<i64> {
        items.iter().map(|i| i.id.as_i64().unwrap()).collect()
    }

    #[test]
    fn move_down_and_renumber() {
        let mut items = vec![item(10, 1), item(20, 2), item(30, 3), item(40, 4)];
        assert!(move_item(&mut items, &json!(10), &json!(30)));
        assert_eq!(ids(&items), vec![20, 30, 10, 40]);
        assert_eq!(items.iter().map(|i| i.order).collect::<Vec<_>>(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn move_up_fixes_gapped_orders() {
        let mut items = vec![item(1, 5), item(2, 9), item(3, 40)];
        assert!(move_item(&mut items, &json!("3"), &json!(1)));
        assert_eq!(ids(&items), vec![3, 1, 2]);
        assert_eq!(items[2].order, 3);
    }

    #[test]
    fn same_or_unknown_ids_are_no_ops() {
        let mut items = vec![item(1, 1), item(2, 2)];
        assert!(!move_item(&mut items, &json!(1), &json!(1)));
        assert!(!move_item(&mut items, &json!(1), &json!(99)));
        assert_eq!(ids(&items), vec![1, 2]);
    }

    #[tokio::test]
    async fn load_is_scoped_to_parent_and_sorted() {
        let p = DataProvider::new(Arc::new(MemoryStore::from_dataset(demo_dataset()).unwrap()));
        let headings = load_items(&p, Resource::Headings, Some(json!(1))).await.unwrap();
        assert_eq!(ids(&headings), vec![1, 2]);
        assert_eq!(headings[0].name, "Past tense");

        let err = load_items(&p, Resource::Questions, None).await.unwrap_err();
        assert!(matches!(err, AdminError::Validation { .. }));
    }

    #[tokio::test]
    async fn reorder_persists_the_new_sequence() {
        let store = MemoryStore::from_dataset(demo_dataset()).unwrap();
        let p = DataProvider::new(Arc::new(store.clone()));
        let moved = reorder(&p, Resource::Topics, Some(json!(1)), &json!(2), &json!(1)).await.unwrap();
        assert_eq!(ids(&moved), vec![2, 1]);

        let topics = store.rows("topics").await;
        let order_of = |id: i64| topics.iter().find(|r| r["id"] == id).unwrap()["order"].clone();
        assert_eq!(order_of(2), json!(1));
        assert_eq!(order_of(1), json!(2));
        // Other parents are untouched.
        assert_eq!(order_of(3), json!(1));
    }
}
