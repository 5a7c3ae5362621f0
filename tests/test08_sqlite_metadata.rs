#![cfg(feature = "sqlite")]

use datastore_middleware::prelude::*;
use serde_json::json;
use tempfile::tempdir;

#[derive(Debug, Default, Clone, PartialEq)]
struct Order {
    id: i64,
    desc: String,
    amount: i64,
}

impl Record for Order {
    fn fields() -> Vec<FieldMeta> {
        vec![
            FieldMeta::new("id").autoincrement(),
            FieldMeta::new("desc"),
            FieldMeta::new("amount"),
        ]
    }

    fn get_field(&self, name: &str) -> Option<RowValues> {
        match name {
            "id" => Some(RowValues::Int(self.id)),
            "desc" => Some(RowValues::Text(self.desc.clone())),
            "amount" => Some(RowValues::Int(self.amount)),
            _ => None,
        }
    }

    fn set_field(&mut self, name: &str, value: RowValues) -> Result<(), DatastoreError> {
        match name {
            "id" => self.id = i64::from_row_value(value)?,
            "desc" => self.desc = String::from_row_value(value)?,
            "amount" => self.amount = i64::from_row_value(value)?,
            _ => {}
        }
        Ok(())
    }
}

#[tokio::test]
async fn catalog_queries_reflect_the_schema() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let manager = ManagerFactory::default()
        .create(Config::new("sqlite", dir.path().join("catalog.db").to_string_lossy()))
        .await?;
    manager
        .execute(
            "CREATE TABLE items (id INTEGER PRIMARY KEY AUTOINCREMENT, sku TEXT, qty INTEGER)",
            &[],
        )
        .await?;
    manager.execute("CREATE TABLE notes (body TEXT)", &[]).await?;

    assert_eq!(manager.tables(None).await?, vec!["items", "notes"]);
    assert_eq!(manager.columns("items").await?, vec!["id", "sku", "qty"]);
    assert_eq!(manager.sequence("items").await?, 0);

    for sku in ["a", "b", "c"] {
        manager
            .execute(
                "INSERT INTO items(sku, qty) VALUES (?, 1)",
                &[RowValues::Text(sku.into())],
            )
            .await?;
    }
    assert_eq!(manager.sequence("items").await?, 3);
    assert!(manager.datastores().await?.contains(&"main".to_string()));

    manager.drop_table("notes").await?;
    assert_eq!(manager.tables(None).await?, vec!["items"]);
    Ok(())
}

#[tokio::test]
async fn reserved_identifiers_are_quoted() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let manager = ManagerFactory::default()
        .create(
            Config::new("sqlite", dir.path().join("orders.db").to_string_lossy())
                .with_param("quoteReservedIdentifiers", "true"),
        )
        .await?;
    manager
        .execute(
            "CREATE TABLE `order` (id INTEGER PRIMARY KEY AUTOINCREMENT, `desc` TEXT, amount INTEGER)",
            &[],
        )
        .await?;

    let mut orders = vec![
        Order {
            desc: "first".into(),
            amount: 10,
            ..Order::default()
        },
        Order {
            desc: "second".into(),
            amount: 20,
            ..Order::default()
        },
    ];
    assert_eq!(manager.persist_all(&mut orders, "order").await?, (2, 0));
    orders[1].amount = 25;
    assert_eq!(manager.persist_all(&mut orders[1..], "order").await?, (0, 1));

    let stored: Vec<Order> = manager.read_table("order").await?;
    assert_eq!(stored, orders);

    assert_eq!(manager.delete_all(&orders[..1], "order").await?, 1);
    let left = manager
        .read_all_rows("SELECT `desc` FROM `order`", &[])
        .await?;
    assert_eq!(left, vec![vec![RowValues::Text("second".into())]]);
    Ok(())
}

#[tokio::test]
async fn table_backed_by_a_query() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let document = json!({
        "driverName": "sqlite",
        "descriptor": "[dir]/reports.db",
        "parameters": {
            "dir": dir.path().to_string_lossy(),
            "quoteReservedIdentifiers": "true"
        },
        "tables": [{
            "table": "big_orders",
            "pkColumns": ["id"],
            "columns": ["id", "desc", "amount"],
            "orderColumns": ["amount"],
            "fromQuery": "SELECT id, label AS `desc`, amount FROM sales WHERE amount > 100",
            "fromQueryAlias": "b"
        }]
    });
    let manager = ManagerFactory::default()
        .create(Config::from_json(&document.to_string())?)
        .await?;
    manager
        .execute(
            "CREATE TABLE sales (id INTEGER PRIMARY KEY, label TEXT, amount INTEGER)",
            &[],
        )
        .await?;
    for (id, label, amount) in [(1, "x", 500), (2, "y", 50), (3, "z", 150)] {
        manager
            .execute(
                "INSERT INTO sales(id, label, amount) VALUES (?, ?, ?)",
                &[
                    RowValues::Int(id),
                    RowValues::Text(label.into()),
                    RowValues::Int(amount),
                ],
            )
            .await?;
    }

    let big: Vec<Order> = manager.read_table("big_orders").await?;
    let ids: Vec<i64> = big.iter().map(|o| o.id).collect();
    assert_eq!(ids, vec![3, 1]);
    assert_eq!(big[0].desc, "z");
    Ok(())
}
