//! Builders for throwaway validation projects on disk.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tval_guard::config::ProjectConfig;

pub const USERS_SCHEMA: &str = r#"
table:
  name: users
  description: Registered users
  source_dir: data/users
columns:
  - name: user_id
    logical_name: User ID
    type: BIGINT
    not_null: true
  - name: name
    type: VARCHAR
  - name: age
    logical_name: Age
    type: INTEGER
    min: 0
    max: 150
table_constraints:
  primary_key:
    columns: [user_id]
"#;

pub const ORDERS_SCHEMA: &str = r#"
table:
  name: orders
  source_dir: data/orders
columns:
  - name: order_id
    type: BIGINT
    not_null: true
  - name: user_id
    type: BIGINT
  - name: status
    type: VARCHAR
    allowed_values: [open, closed]
table_constraints:
  primary_key:
    columns: [order_id]
  foreign_keys:
    - columns: [user_id]
      references:
        table: users
        columns: [user_id]
  checks:
    - description: at least one open order
      query: "SELECT COUNT(*) FROM {table} WHERE status = $1"
      expect_zero: false
      params: [open]
"#;

pub const ITEMS_SCHEMA: &str = r#"
table:
  name: items
  source_dir: data/items
columns:
  - name: item_id
    type: BIGINT
  - name: order_id
    type: BIGINT
  - name: price
    type: DOUBLE
table_constraints:
  foreign_keys:
    - columns: [order_id]
      references:
        table: orders
        columns: [order_id]
  aggregation_checks:
    - description: total price is positive
      query: "SELECT CASE WHEN SUM(price) > 0 THEN 0 ELSE 1 END FROM {table}"
"#;

pub const USER_ORDERS_RELATION: &str = r#"
relations:
  - name: user_orders
    cardinality: "1:N"
    from: { table: users, columns: [user_id] }
    to: { table: orders, columns: [user_id] }
"#;

pub const USERS_CSV: &str = "user_id,name,age\n1,alice,30\n2,bob,41\n3,carol,29\n";
pub const ORDERS_CSV: &str = "order_id,user_id,status\n10,1,open\n11,1,closed\n12,3,open\n";

/// A project directory with `config.yaml`, `schema/` and `data/`.
pub struct Project {
    pub dir: TempDir,
}

impl Project {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("schema")).unwrap();
        std::fs::create_dir(dir.path().join("data")).unwrap();
        Self { dir }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn schema(self, file: &str, yaml: &str) -> Self {
        std::fs::write(self.root().join("schema").join(file), yaml).unwrap();
        self
    }

    pub fn data(self, table: &str, file: &str, contents: &[u8]) -> Self {
        let dir = self.root().join("data").join(table);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(file), contents).unwrap();
        self
    }

    pub fn empty_data_dir(self, table: &str) -> Self {
        std::fs::create_dir_all(self.root().join("data").join(table)).unwrap();
        self
    }

    pub fn relations(self, yaml: &str) -> Self {
        std::fs::write(self.root().join("relations.yaml"), yaml).unwrap();
        self
    }

    /// Writes `config.yaml` with `extra` appended and returns its path.
    pub fn config(&self, extra: &str) -> PathBuf {
        let relations = if self.root().join("relations.yaml").exists() {
            "relations_path: relations.yaml\n"
        } else {
            ""
        };
        let path = self.root().join("config.yaml");
        std::fs::write(
            &path,
            format!("schema_dir: schema\n{relations}max_concurrency: 2\n{extra}"),
        )
        .unwrap();
        path
    }

    pub fn load_config(&self, extra: &str) -> ProjectConfig {
        ProjectConfig::from_file(&self.config(extra)).unwrap()
    }

    /// users and orders with clean data and the 1:N relation.
    pub fn users_and_orders() -> Self {
        Self::new()
            .schema("users.yaml", USERS_SCHEMA)
            .schema("orders.yaml", ORDERS_SCHEMA)
            .data("users", "users.csv", USERS_CSV.as_bytes())
            .data("orders", "orders.csv", ORDERS_CSV.as_bytes())
            .relations(USER_ORDERS_RELATION)
    }
}
