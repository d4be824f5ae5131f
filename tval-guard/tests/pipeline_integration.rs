//! End-to-end runs over projects written to temporary directories.

mod common;

use common::*;
use tval_guard::checks::LOAD_ERROR_SKIP_MESSAGE;
use tval_guard::core::{CheckStatus, ExportStatus, TableStatus};
use tval_guard::logging::LogConfig;
use tval_guard::pipeline::{run, run_with_config, RunOptions};
use tval_guard::report::RunReport;
use tval_guard::sources::LoadFailureKind;
use tval_guard::TvalError;

async fn validate(project: &Project, extra: &str, export: bool) -> RunReport {
    let config = project.load_config(extra);
    run_with_config(&config, export, &LogConfig::default())
        .await
        .unwrap()
}

#[tokio::test]
async fn test_clean_project_passes_and_exports() {
    let project = Project::users_and_orders();
    let report = validate(&project, "", true).await;

    assert!(report.passed(), "{report:#?}");
    assert_eq!(report.summary.tables_ok, 2);
    let names: Vec<&str> = report.tables.iter().map(|t| t.table.as_str()).collect();
    assert_eq!(names, vec!["users", "orders"]);

    let users = report.table("users").unwrap();
    assert_eq!(users.load.rows_loaded, 3);
    assert!(users.all_checks().all(|c| c.status == CheckStatus::Ok));
    assert_eq!(users.profiles.len(), 3);
    assert_eq!(users.profiles[2].max, Some(41.0));

    let relation: Vec<(&str, CheckStatus)> = report
        .relation_checks
        .iter()
        .map(|r| (r.description.as_str(), r.status))
        .collect();
    assert_eq!(
        relation,
        vec![
            ("[user_orders] users(user_id) uniqueness (1-side)", CheckStatus::Ok),
            ("[user_orders] orders -> users referential integrity", CheckStatus::Ok),
        ]
    );

    let exported = project
        .root()
        .join("output")
        .join("parquet")
        .join("orders")
        .join("orders.parquet");
    assert!(exported.is_file());
    assert_eq!(
        report.table("orders").unwrap().export.as_ref().unwrap().status,
        ExportStatus::Ok
    );
    assert!(project.root().join("output").join("report.json").is_file());
}

#[tokio::test]
async fn test_load_failure_skips_checks_relations_and_export() {
    let project = Project::users_and_orders().data(
        "orders",
        "orders.csv",
        b"order_id,user_id,status\n10,1,open\nabc,1,closed\n",
    );
    let report = validate(&project, "", true).await;
    assert!(!report.passed());

    let orders = report.table("orders").unwrap();
    assert_eq!(orders.status, TableStatus::Ng);
    assert_eq!(orders.load.failures[0].kind, LoadFailureKind::TypeMismatch);
    assert!(!orders.load.failures[0].raw_message.is_empty());
    assert!(orders.all_checks().all(|c| c.status == CheckStatus::Skipped
        && c.message.as_deref() == Some(LOAD_ERROR_SKIP_MESSAGE)));
    assert!(orders.profiles.is_empty());

    assert_eq!(report.table("users").unwrap().status, TableStatus::Ok);
    assert!(report
        .relation_checks
        .iter()
        .all(|r| r.status == CheckStatus::Skipped
            && r.message.as_deref() == Some("Skipped due to errors in: orders")));

    assert!(report
        .tables
        .iter()
        .all(|t| t.export.as_ref().unwrap().status == ExportStatus::Skipped));
    assert!(!project.root().join("output").join("parquet").exists());
}

#[tokio::test]
async fn test_check_failure_skip_policy() {
    let users = "user_id,name,age\n1,alice,30\n2,bob,200\n3,carol,29\n";
    let project = Project::users_and_orders().data("users", "users.csv", users.as_bytes());

    let strict = validate(&project, "", false).await;
    let range = strict
        .table("users")
        .unwrap()
        .checks
        .iter()
        .find(|c| c.description.contains("range check"))
        .unwrap();
    assert_eq!(range.status, CheckStatus::Ng);
    assert_eq!(range.result_count, Some(1));
    assert!(strict.relation_checks.iter().all(|r| r.status == CheckStatus::Skipped));
    assert_eq!(
        strict.relation_checks[0].message.as_deref(),
        Some("Skipped due to errors in: users (check failed)")
    );

    let lenient = validate(&project, "relation_skip_policy: load_failure_only\n", false).await;
    assert!(lenient.relation_checks.iter().all(|r| r.status == CheckStatus::Ok));
    assert!(!lenient.passed());
}

#[tokio::test]
async fn test_orphan_foreign_key_taints_table() {
    let orders = "order_id,user_id,status\n10,1,open\n11,9,open\n12,,closed\n";
    let project = Project::users_and_orders().data("orders", "orders.csv", orders.as_bytes());

    let report = validate(&project, "", false).await;
    let orders = report.table("orders").unwrap();
    assert_eq!(orders.load.failures.len(), 1);
    assert_eq!(orders.load.failures[0].kind, LoadFailureKind::FkViolation);
    assert!(orders.all_checks().all(|c| c.status.is_skipped()));

    let unverified = validate(&project, "verify_keys_after_load: false\n", false).await;
    let orders = unverified.table("orders").unwrap();
    assert!(orders.load.failures.is_empty());
    // the relation check still catches the orphan
    let referential = unverified
        .relation_checks
        .iter()
        .find(|r| r.description.ends_with("referential integrity"))
        .unwrap();
    assert_eq!(referential.status, CheckStatus::Ng);
    assert_eq!(referential.result_count, Some(1));
    assert!(!unverified.passed());
}

#[tokio::test]
async fn test_tables_follow_dependency_order() {
    let project = Project::new()
        .schema("a_items.yaml", ITEMS_SCHEMA)
        .schema("b_orders.yaml", ORDERS_SCHEMA)
        .schema("c_users.yaml", USERS_SCHEMA)
        .data("users", "users.csv", USERS_CSV.as_bytes())
        .data("orders", "orders.csv", ORDERS_CSV.as_bytes())
        .data("items", "items.csv", b"item_id,order_id,price\n1,10,9.5\n2,12,3.0\n");

    let report = validate(&project, "", false).await;
    let names: Vec<&str> = report.tables.iter().map(|t| t.table.as_str()).collect();
    assert_eq!(names, vec!["users", "orders", "items"]);
    assert!(report.passed(), "{report:#?}");
    assert_eq!(
        report.table("items").unwrap().aggregate_checks[0].status,
        CheckStatus::Ok
    );
}

#[tokio::test]
async fn test_cycle_aborts_before_loading() {
    let a = r#"
table: { name: a, source_dir: data/a }
columns:
  - { name: id, type: BIGINT }
  - { name: b_id, type: BIGINT }
table_constraints:
  foreign_keys:
    - { columns: [b_id], references: { table: b, columns: [id] } }
"#;
    let b = r#"
table: { name: b, source_dir: data/b }
columns:
  - { name: id, type: BIGINT }
  - { name: a_id, type: BIGINT }
table_constraints:
  foreign_keys:
    - { columns: [a_id], references: { table: a, columns: [id] } }
"#;
    let project = Project::new()
        .schema("a.yaml", a)
        .schema("b.yaml", b)
        .empty_data_dir("a")
        .empty_data_dir("b");
    let config = project.load_config("");

    let err = run_with_config(&config, false, &LogConfig::default())
        .await
        .unwrap_err();
    match err {
        TvalError::CyclicDependency { tables } => assert_eq!(tables, vec!["a", "b"]),
        other => panic!("unexpected error: {other}"),
    }
    assert!(!project.root().join("output").join("report.json").exists());
}

#[tokio::test]
async fn test_definition_errors_are_fatal() {
    let project = Project::users_and_orders().relations(
        r#"
relations:
  - name: broken
    cardinality: "N:N"
    from: { table: users, columns: [user_id] }
    to: { table: payments, columns: [user_id] }
"#,
    );
    let config = project.load_config("");
    let err = run_with_config(&config, false, &LogConfig::default())
        .await
        .unwrap_err();
    assert!(err.is_definition_error());
    assert!(err.to_string().contains("payments"));
}

#[tokio::test]
async fn test_empty_source_dir_is_no_files_failure() {
    let project = Project::new()
        .schema("users.yaml", USERS_SCHEMA)
        .empty_data_dir("users");
    let report = validate(&project, "", false).await;
    let users = report.table("users").unwrap();
    assert_eq!(users.load.failures[0].kind, LoadFailureKind::NoFiles);
    assert!(!report.passed());
}

#[tokio::test]
async fn test_shift_jis_file_with_fallback() {
    let (encoded, _, _) = encoding_rs::SHIFT_JIS.encode("user_id,name,age\n1,山田,30\n");
    let project = Project::new()
        .schema("users.yaml", USERS_SCHEMA)
        .data("users", "users.csv", &encoded);

    let without = validate(&project, "", false).await;
    assert_eq!(
        without.table("users").unwrap().load.failures[0].kind,
        LoadFailureKind::Encoding
    );

    let with = validate(&project, "fallback_encoding: shift_jis\n", false).await;
    let users = with.table("users").unwrap();
    assert!(users.load.failures.is_empty(), "{:?}", users.load.failures);
    assert_eq!(users.load.rows_loaded, 1);

    let detected = validate(&project, "fallback_encoding: auto\n", false).await;
    let users = detected.table("users").unwrap();
    assert!(users.load.failures.is_empty(), "{:?}", users.load.failures);
    assert_eq!(users.load.rows_loaded, 1);
}

#[tokio::test]
async fn test_run_with_explicit_config_path() {
    let project = Project::users_and_orders();
    let path = project.config("output_path: results/run.json\n");
    let report = run(RunOptions::new(Some(path), false)).await.unwrap();
    assert!(report.passed());
    assert!(!report.export_requested);

    let written = std::fs::read_to_string(project.root().join("results").join("run.json")).unwrap();
    let parsed: RunReport = serde_json::from_str(&written).unwrap();
    assert_eq!(parsed.summary, report.summary);
}
