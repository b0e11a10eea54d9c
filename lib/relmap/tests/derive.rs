#![allow(clippy::unwrap_used, clippy::expect_used)]

use pretty_assertions::assert_eq;
use relmap::{
    Collection, Entity, FieldRole, Link, NodeId, Reference, RelationKind, Row, Value,
    metadata::join_spec,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Debug, Clone, Default, Serialize, Deserialize, Entity)]
#[entity(table = "accounts")]
struct Account {
    id: Option<i64>,
    #[field(column = "display_name")]
    name: String,
    #[serde(default)]
    #[relation(one_to_many, mapped_by = "owner")]
    orders: Collection<Order>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Entity)]
struct Order {
    id: Option<i64>,
    total: f64,
    #[serde(default)]
    #[relation(many_to_one, nullable = false)]
    owner: Reference<Account>,
    #[serde(default)]
    #[relation(many_to_many, join_table = "order_items", inverse_join_column = "item_sku")]
    items: Collection<Item>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Entity)]
#[entity(table = "items", primary_key = "sku")]
struct Item {
    sku: String,
    #[serde(default)]
    #[relation(many_to_many, target = Order, mapped_by = "items")]
    orders: Collection<Order>,
}

#[test]
fn derives_table_and_field_roles() {
    let meta = Account::metadata();
    assert_eq!(meta.name, "Account");
    assert_eq!(meta.table, "accounts");
    assert_eq!(meta.primary_key, "id");
    assert_eq!(meta.field("name").unwrap().column_name(), "display_name");

    let orders = meta.field("orders").unwrap();
    assert_eq!(orders.role, FieldRole::Relation(RelationKind::OneToMany));
    assert_eq!(orders.mapped_by, Some("owner"));
    assert_eq!(orders.target().unwrap().name, "Order");
    assert!(!orders.is_owning());
}

#[test]
fn default_table_and_relation_options() {
    let meta = Order::metadata();
    assert_eq!(meta.table, "orders");

    let owner = meta.field("owner").unwrap();
    assert!(owner.is_owning());
    assert!(!owner.nullable);

    let items = meta.field("items").unwrap();
    let join = items.join_table.unwrap();
    assert_eq!(join.table, "order_items");
    assert_eq!(join.join_column, None);
    assert_eq!(join.inverse_join_column, Some("item_sku"));

    let spec = join_spec(meta, items).unwrap();
    assert_eq!(spec.table, "order_items");
    assert_eq!(spec.own_column, "order_id");
    assert_eq!(spec.other_column, "item_sku");

    // the inverse side reads the same join table with columns swapped
    let inverse = join_spec(Item::metadata(), Item::metadata().field("orders").unwrap()).unwrap();
    assert_eq!(inverse.own_column, "item_sku");
    assert_eq!(inverse.other_column, "order_id");
}

#[test]
fn primary_key_accessors() {
    let mut order = Order::default();
    assert_eq!(order.primary_key(), None);
    order.set_primary_key(&Value::UInt(12)).unwrap();
    assert_eq!(order.id, Some(12));
    assert_eq!(order.primary_key(), Some(Value::Int(12)));

    let mut item = Item::default();
    assert_eq!(item.primary_key(), None);
    item.set_primary_key(&Value::from("SKU-1")).unwrap();
    assert_eq!(item.primary_key(), Some(Value::from("SKU-1")));
}

#[test]
fn set_relation_routes_by_field_name() {
    let mut account = Account::default();
    assert!(account.set_relation("orders", &Link::Many(vec![])));
    assert!(account.orders.is_loaded());
    assert!(!account.set_relation("name", &Link::Null));
    assert!(!account.set_relation("missing", &Link::Null));
}

#[test]
fn hydrates_from_row_columns() {
    let row: Row = [
        ("id".to_string(), json!(4)),
        ("total".to_string(), json!(9.5)),
        ("owner_id".to_string(), json!(2)),
    ]
    .into_iter()
    .collect();
    let order: Order = relmap::entity::hydrate(&row).unwrap();
    assert_eq!(order.id, Some(4));
    assert_eq!(order.owner.key(), Some(&Value::Int(2)));
    assert!(!order.owner.is_loaded());
    assert_eq!(order.owner.node(), None::<NodeId>);
}
