//! End-to-end import flows against a file-backed store.

use quotaboard_db::QuotaboardDb;
use quotaboard_ingest::{IngestConfig, IngestService};
use quotaboard_protocol::{
    EntityKind, ImportId, ImportMode, ImportSnapshot, ImportStatus, PlanPeriod,
};
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;

fn write_file(dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    let mut f = std::fs::File::create(&path).unwrap();
    f.write_all(content.as_bytes()).unwrap();
    path
}

async fn open_service(dir: &TempDir, config: IngestConfig) -> IngestService {
    let db = QuotaboardDb::open(&dir.path().join("store.sqlite"))
        .await
        .unwrap();
    IngestService::new(db, config)
}

async fn wait_terminal(service: &IngestService, id: &ImportId) -> ImportSnapshot {
    for _ in 0..500 {
        let snap = service.status(id).unwrap();
        if snap.status.is_terminal() {
            return snap;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job never reached a terminal status");
}

async fn run_to_end(
    service: &IngestService,
    path: &Path,
    mode: ImportMode,
) -> ImportSnapshot {
    let id = service
        .submit(path, None, mode, PlanPeriod::default())
        .await
        .unwrap();
    wait_terminal(service, &id).await
}

fn sales_csv(rows: usize) -> String {
    let mut content = String::from("date,customer,product,qty,price,amount\n");
    for i in 0..rows {
        content.push_str(&format!(
            "2024-05-{:02},Customer {i},Widget,2,5,10\n",
            i % 28 + 1
        ));
    }
    content
}

#[tokio::test]
async fn clean_file_imports_every_row() {
    let dir = TempDir::new().unwrap();
    let path = write_file(&dir, "sales.csv", &sales_csv(25));
    let service = open_service(&dir, IngestConfig::default()).await;

    let snap = run_to_end(&service, &path, ImportMode::Append).await;

    assert_eq!(snap.status, ImportStatus::Completed);
    assert_eq!(snap.data_type, Some(EntityKind::Sales));
    assert_eq!(snap.total_rows, Some(25));
    assert_eq!(snap.imported_rows, 25);
    assert_eq!(snap.failed_rows, 0);
    assert_eq!(snap.progress_percent, 100.0);
    assert!(snap.error_log.is_empty());
}

#[tokio::test]
async fn malformed_rows_are_isolated_with_positions() {
    let dir = TempDir::new().unwrap();
    let path = write_file(
        &dir,
        "sales.csv",
        "date,customer,amount\n\
         2024-05-01,Acme,10\n\
         garbage,Acme,20\n\
         2024-05-03,Acme,not-a-number\n\
         2024-05-04,Acme,40\n",
    );
    let service = open_service(&dir, IngestConfig::default()).await;

    let snap = run_to_end(&service, &path, ImportMode::Append).await;

    assert_eq!(snap.status, ImportStatus::Completed);
    assert_eq!(snap.imported_rows, 2);
    assert_eq!(snap.failed_rows, 2);
    let rows: Vec<Option<u64>> = snap.error_log.iter().map(|e| e.row).collect();
    assert!(rows.contains(&Some(3)), "positions were {rows:?}");
    assert!(rows.contains(&Some(4)), "positions were {rows:?}");
}

#[tokio::test]
async fn large_file_with_scattered_failures() {
    let dir = TempDir::new().unwrap();
    let mut content = String::from("date,customer,product,qty,price,amount\n");
    for i in 0..10_000 {
        if i % 200 == 0 {
            // 50 rows with an unparsable amount
            content.push_str("2024-05-01,Acme,Widget,2,5,broken\n");
        } else {
            content.push_str("2024-05-01,Acme,Widget,2,5,10\n");
        }
    }
    let path = write_file(&dir, "sales.csv", &content);
    let service = open_service(&dir, IngestConfig::default()).await;
    let db = QuotaboardDb::open(&dir.path().join("store.sqlite"))
        .await
        .unwrap();

    let snap = run_to_end(&service, &path, ImportMode::Append).await;

    assert_eq!(snap.status, ImportStatus::Completed);
    assert_eq!(snap.total_rows, Some(10_000));
    assert_eq!(snap.imported_rows, 9_950);
    assert_eq!(snap.failed_rows, 50);
    assert_eq!(snap.error_log.len(), 50);
    assert_eq!(db.count(EntityKind::Sales).await.unwrap(), 9_950);
}

#[tokio::test]
async fn error_log_is_capped_but_counters_are_not() {
    let dir = TempDir::new().unwrap();
    let mut content = String::from("date,customer,amount\n");
    for _ in 0..10 {
        content.push_str("bad-date,Acme,10\n");
    }
    let path = write_file(&dir, "sales.csv", &content);
    let service = open_service(
        &dir,
        IngestConfig {
            error_log_cap: 4,
            ..IngestConfig::default()
        },
    )
    .await;

    let snap = run_to_end(&service, &path, ImportMode::Append).await;

    assert_eq!(snap.status, ImportStatus::Completed);
    assert_eq!(snap.failed_rows, 10);
    assert_eq!(snap.error_log.len(), 4);
    // Newest-first: the last failing row (file position 11) leads the log
    assert_eq!(snap.error_log[0].row, Some(11));
}

#[tokio::test]
async fn xlsx_file_imports_end_to_end() {
    use rust_xlsxwriter::Workbook;

    let dir = TempDir::new().unwrap();
    let path = dir.path().join("sales.xlsx");

    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    for (col, name) in ["date", "customer", "amount"].iter().enumerate() {
        sheet.write_string(0, col as u16, *name).unwrap();
    }
    for i in 0..30u32 {
        sheet.write_string(i + 1, 0, "2024-05-01").unwrap();
        sheet
            .write_string(i + 1, 1, format!("Customer {i}").as_str())
            .unwrap();
        sheet.write_number(i + 1, 2, 10.0).unwrap();
    }
    workbook.save(&path).unwrap();

    let service = open_service(&dir, IngestConfig::default()).await;
    let db = QuotaboardDb::open(&dir.path().join("store.sqlite"))
        .await
        .unwrap();

    let snap = run_to_end(&service, &path, ImportMode::Append).await;

    assert_eq!(snap.status, ImportStatus::Completed);
    assert_eq!(snap.data_type, Some(EntityKind::Sales));
    assert_eq!(snap.total_rows, Some(30));
    assert_eq!(snap.imported_rows, 30);
    assert_eq!(snap.failed_rows, 0);
    assert_eq!(snap.progress_percent, 100.0);
    assert_eq!(db.count(EntityKind::Sales).await.unwrap(), 30);
}

#[tokio::test]
async fn replace_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let path = write_file(&dir, "products.csv", "product_name,sku\nWidget,W-1\nGadget,G-1\n");
    let service = open_service(&dir, IngestConfig::default()).await;
    let db = QuotaboardDb::open(&dir.path().join("store.sqlite"))
        .await
        .unwrap();

    for _ in 0..2 {
        let snap = run_to_end(&service, &path, ImportMode::Replace).await;
        assert_eq!(snap.status, ImportStatus::Completed);
        assert_eq!(db.count(EntityKind::Products).await.unwrap(), 2);
    }
}

#[tokio::test]
async fn append_is_additive_for_sales() {
    let dir = TempDir::new().unwrap();
    let path = write_file(&dir, "sales.csv", &sales_csv(5));
    let service = open_service(&dir, IngestConfig::default()).await;
    let db = QuotaboardDb::open(&dir.path().join("store.sqlite"))
        .await
        .unwrap();

    run_to_end(&service, &path, ImportMode::Append).await;
    run_to_end(&service, &path, ImportMode::Append).await;

    assert_eq!(db.count(EntityKind::Sales).await.unwrap(), 10);
}

#[tokio::test]
async fn duplicate_names_fail_rows_on_second_append() {
    let dir = TempDir::new().unwrap();
    let path = write_file(
        &dir,
        "customers.csv",
        "customer_name,segment,city\nAcme,Enterprise,Boston\nGlobex,SMB,Denver\n",
    );
    let service = open_service(&dir, IngestConfig::default()).await;
    let db = QuotaboardDb::open(&dir.path().join("store.sqlite"))
        .await
        .unwrap();

    let first = run_to_end(&service, &path, ImportMode::Append).await;
    assert_eq!(first.imported_rows, 2);
    assert_eq!(first.failed_rows, 0);

    // Same names again: the store rejects each row, the run still completes
    let second = run_to_end(&service, &path, ImportMode::Append).await;
    assert_eq!(second.status, ImportStatus::Completed);
    assert_eq!(second.imported_rows, 0);
    assert_eq!(second.failed_rows, 2);

    assert_eq!(db.count(EntityKind::Customers).await.unwrap(), 2);
}

#[tokio::test]
async fn explicit_data_type_overrides_classification() {
    let dir = TempDir::new().unwrap();
    // Header reads like a customer file, but the caller insists on agents
    let path = write_file(&dir, "people.csv", "name,email,phone\nIvanov,i@x.io,555\n");
    let service = open_service(&dir, IngestConfig::default()).await;
    let db = QuotaboardDb::open(&dir.path().join("store.sqlite"))
        .await
        .unwrap();

    let id = service
        .submit(
            &path,
            Some(EntityKind::Agents),
            ImportMode::Append,
            PlanPeriod::default(),
        )
        .await
        .unwrap();
    let snap = wait_terminal(&service, &id).await;

    assert_eq!(snap.status, ImportStatus::Completed);
    assert_eq!(snap.data_type, Some(EntityKind::Agents));
    assert_eq!(db.count(EntityKind::Agents).await.unwrap(), 1);
}

#[tokio::test]
async fn agent_import_stamps_plan_period() {
    let dir = TempDir::new().unwrap();
    let path = write_file(
        &dir,
        "agents.csv",
        "agent,region,plan_amount\nIvanov,North,100000\n",
    );
    let service = open_service(&dir, IngestConfig::default()).await;

    let period = PlanPeriod {
        start: chrono::NaiveDate::from_ymd_opt(2024, 1, 1),
        end: chrono::NaiveDate::from_ymd_opt(2024, 12, 31),
    };
    let id = service
        .submit(&path, None, ImportMode::Append, period)
        .await
        .unwrap();
    let snap = wait_terminal(&service, &id).await;

    assert_eq!(snap.status, ImportStatus::Completed);
    assert_eq!(snap.imported_rows, 1);
}

#[tokio::test]
async fn polling_observes_monotonic_progress() {
    let dir = TempDir::new().unwrap();
    let path = write_file(&dir, "sales.csv", &sales_csv(200));
    let service = open_service(
        &dir,
        IngestConfig {
            batch_size: 10,
            ..IngestConfig::default()
        },
    )
    .await;

    let id = service
        .submit(&path, None, ImportMode::Append, PlanPeriod::default())
        .await
        .unwrap();

    let mut last_imported = 0u64;
    let mut last_pct = 0.0f64;
    let mut saw_terminal = false;
    for _ in 0..500 {
        let snap = service.status(&id).unwrap();
        assert!(
            snap.imported_rows >= last_imported,
            "imported went backwards: {} -> {}",
            last_imported,
            snap.imported_rows
        );
        assert!(
            snap.progress_percent >= last_pct,
            "progress went backwards: {} -> {}",
            last_pct,
            snap.progress_percent
        );
        if saw_terminal {
            assert!(snap.status.is_terminal(), "left terminal status");
        }
        last_imported = snap.imported_rows;
        last_pct = snap.progress_percent;
        if snap.status.is_terminal() {
            if saw_terminal {
                break;
            }
            saw_terminal = true;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }

    let snap = service.status(&id).unwrap();
    assert_eq!(snap.status, ImportStatus::Completed);
    assert_eq!(snap.imported_rows, 200);
    assert_eq!(snap.progress_percent, 100.0);
}
