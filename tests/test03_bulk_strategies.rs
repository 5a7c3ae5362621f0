use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use datastore_middleware::prelude::*;
use flate2::read::GzDecoder;

/// What a COPY statement found in its file while the file still existed.
#[derive(Debug, Clone)]
struct CopySeen {
    path: PathBuf,
    lines: Vec<String>,
}

#[derive(Debug, Default)]
struct BulkRecorder {
    statements: Mutex<Vec<(String, Vec<RowValues>)>>,
    copies: Mutex<Vec<CopySeen>>,
    next_id: Mutex<i64>,
}

#[derive(Debug)]
struct BulkDriver(Arc<BulkRecorder>);

#[derive(Debug)]
struct BulkConnection {
    recorder: Arc<BulkRecorder>,
    in_tx: bool,
}

#[async_trait]
impl Driver for BulkDriver {
    async fn connect(&self, _: &Config) -> Result<Box<dyn Connection>, DatastoreError> {
        Ok(Box::new(BulkConnection {
            recorder: Arc::clone(&self.0),
            in_tx: false,
        }))
    }
}

fn read_copy_file(sql: &str) -> Result<CopySeen, DatastoreError> {
    let start = sql
        .find("LOCAL '")
        .ok_or_else(|| DatastoreError::ExecutionError("no file in COPY".into()))?
        + "LOCAL '".len();
    let end = start
        + sql[start..]
            .find('\'')
            .ok_or_else(|| DatastoreError::ExecutionError("unterminated path".into()))?;
    let path = PathBuf::from(&sql[start..end]);
    let reader = BufReader::new(GzDecoder::new(std::fs::File::open(&path)?));
    let lines = reader.lines().collect::<Result<Vec<_>, _>>()?;
    Ok(CopySeen { path, lines })
}

#[async_trait]
impl Connection for BulkConnection {
    async fn execute(
        &mut self,
        sql: &str,
        params: &[RowValues],
    ) -> Result<ExecResult, DatastoreError> {
        self.recorder
            .statements
            .lock()
            .unwrap()
            .push((sql.to_string(), params.to_vec()));
        // two bound columns per row; literal strategies bind nothing
        let rows = if sql.starts_with("COPY") {
            let seen = read_copy_file(sql)?;
            let rows = seen.lines.len() as u64;
            self.recorder.copies.lock().unwrap().push(seen);
            rows
        } else if params.is_empty() {
            sql.matches("SELECT").count() as u64
        } else {
            params.len() as u64 / 2
        };
        let mut next_id = self.recorder.next_id.lock().unwrap();
        let first = *next_id + 1;
        *next_id += rows as i64;
        Ok(ExecResult::new(rows, Some(first)))
    }

    async fn query(&mut self, _: &str, _: &[RowValues]) -> Result<ResultSet, DatastoreError> {
        Ok(ResultSet::with_columns(vec!["id".to_string()]))
    }

    async fn begin(&mut self) -> Result<(), DatastoreError> {
        self.in_tx = true;
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), DatastoreError> {
        self.in_tx = false;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), DatastoreError> {
        self.in_tx = false;
        Ok(())
    }

    fn supports_transactions(&self) -> bool {
        true
    }

    fn in_transaction(&self) -> bool {
        self.in_tx
    }

    async fn ping(&mut self) -> Result<(), DatastoreError> {
        Ok(())
    }

    async fn close(&mut self) -> Result<(), DatastoreError> {
        Ok(())
    }
}

#[derive(Debug, Default, Clone)]
struct Event {
    id: i64,
    name: String,
    score: i64,
}

impl Event {
    fn new(name: &str, score: i64) -> Self {
        Self {
            id: 0,
            name: name.to_string(),
            score,
        }
    }
}

impl Record for Event {
    fn fields() -> Vec<FieldMeta> {
        vec![
            FieldMeta::new("id").autoincrement(),
            FieldMeta::new("name"),
            FieldMeta::new("score"),
        ]
    }

    fn get_field(&self, name: &str) -> Option<RowValues> {
        match name {
            "id" => Some(RowValues::Int(self.id)),
            "name" => Some(RowValues::Text(self.name.clone())),
            "score" => Some(RowValues::Int(self.score)),
            _ => None,
        }
    }

    fn set_field(&mut self, name: &str, value: RowValues) -> Result<(), DatastoreError> {
        match name {
            "id" => self.id = i64::from_row_value(value)?,
            "name" => self.name = String::from_row_value(value)?,
            "score" => self.score = i64::from_row_value(value)?,
            _ => {}
        }
        Ok(())
    }
}

async fn bulk_manager(
    recorder: &Arc<BulkRecorder>,
    strategy: BulkInsertStrategy,
    batch_size: usize,
) -> Manager {
    let mut registry = Registry::new();
    registry.register(
        "bulk",
        Arc::new(BulkDriver(Arc::clone(recorder))),
        Arc::new(GenericDialect::new("bulk").with_strategy(strategy)),
    );
    ManagerFactory::new(registry)
        .create(Config::new("bulk", "memory").with_param("batchSize", batch_size.to_string()))
        .await
        .unwrap()
}

fn statements(recorder: &BulkRecorder) -> Vec<(String, Vec<RowValues>)> {
    recorder.statements.lock().unwrap().clone()
}

#[tokio::test]
async fn copy_local_loads_one_gzipped_file() {
    let recorder = Arc::new(BulkRecorder::default());
    let manager = bulk_manager(&recorder, BulkInsertStrategy::CopyLocal, 200).await;

    let mut events: Vec<Event> = (0..1000).map(|i| Event::new(&format!("e{i}"), i)).collect();
    assert_eq!(manager.persist_all(&mut events, "events").await.unwrap(), (1000, 0));

    let statements = statements(&recorder);
    assert_eq!(statements.len(), 1);
    let (sql, params) = &statements[0];
    assert!(sql.starts_with("COPY events(name, score) FROM LOCAL '"));
    assert!(sql.ends_with("' GZIP DELIMITER ',' NULL AS 'null' ENCLOSED BY ''''"));
    assert!(params.is_empty());

    let copies = recorder.copies.lock().unwrap().clone();
    assert_eq!(copies.len(), 1);
    assert_eq!(copies[0].lines.len(), 1000);
    assert_eq!(copies[0].lines[0], "'e0',0");
    assert_eq!(copies[0].lines[999], "'e999',999");
    assert!(!copies[0].path.exists());

    assert_eq!(events[0].id, 1);
    assert_eq!(events[999].id, 1000);
}

#[tokio::test]
async fn union_all_inlines_literals() {
    let recorder = Arc::new(BulkRecorder::default());
    let manager = bulk_manager(&recorder, BulkInsertStrategy::UnionAll, 200).await;

    let mut events = vec![Event::new("a", 1), Event::new("it's", 2), Event::new("c", 3)];
    assert_eq!(manager.persist_all(&mut events, "events").await.unwrap(), (3, 0));

    let statements = statements(&recorder);
    assert_eq!(statements.len(), 1);
    assert_eq!(
        statements[0].0,
        "INSERT INTO events(name, score) SELECT 'a', 1 UNION ALL SELECT 'it''s', 2 UNION ALL SELECT 'c', 3"
    );
    assert!(statements[0].1.is_empty());
}

#[tokio::test]
async fn insert_all_closes_with_dual() {
    let recorder = Arc::new(BulkRecorder::default());
    let manager = bulk_manager(&recorder, BulkInsertStrategy::InsertAll, 200).await;

    let mut events = vec![Event::new("a", 1), Event::new("b", 2)];
    manager.persist_all(&mut events, "events").await.unwrap();

    let statements = statements(&recorder);
    assert_eq!(
        statements[0].0,
        "INSERT ALL INTO events(name, score) VALUES (?, ?) INTO events(name, score) VALUES (?, ?) SELECT 1 FROM DUAL"
    );
    assert_eq!(
        statements[0].1,
        vec![
            RowValues::Text("a".into()),
            RowValues::Int(1),
            RowValues::Text("b".into()),
            RowValues::Int(2),
        ]
    );
}

#[tokio::test]
async fn multi_row_values_flush_per_batch_and_backfill_ids() {
    let recorder = Arc::new(BulkRecorder::default());
    let manager = bulk_manager(&recorder, BulkInsertStrategy::MultiRowValues, 2).await;

    let mut events: Vec<Event> = (0..5).map(|i| Event::new(&format!("m{i}"), i)).collect();
    assert_eq!(manager.persist_all(&mut events, "events").await.unwrap(), (5, 0));

    let statements = statements(&recorder);
    let shapes: Vec<usize> = statements.iter().map(|(_, params)| params.len()).collect();
    assert_eq!(shapes, vec![4, 4, 2]);
    assert_eq!(
        statements[0].0,
        "INSERT INTO events(name, score) VALUES (?, ?),(?, ?)"
    );
    let ids: Vec<i64> = events.iter().map(|e| e.id).collect();
    assert_eq!(ids, vec![1, 2, 3, 4, 5]);
}

#[cfg(feature = "sqlite")]
#[tokio::test]
async fn batched_and_single_row_inserts_leave_the_same_rows() {
    async fn load(strategy: &str) -> Vec<Vec<RowValues>> {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.db");
        let manager = ManagerFactory::default()
            .create(
                Config::new("sqlite", path.to_string_lossy())
                    .with_param("insertStrategy", strategy)
                    .with_param("batchSize", "4"),
            )
            .await
            .unwrap();
        manager
            .execute(
                "CREATE TABLE events (id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT, score INTEGER)",
                &[],
            )
            .await
            .unwrap();
        let mut events: Vec<Event> = (0..10).map(|i| Event::new(&format!("s{i}"), i * 10)).collect();
        manager.persist_all(&mut events, "events").await.unwrap();
        manager
            .read_all_rows("SELECT id, name, score FROM events ORDER BY id", &[])
            .await
            .unwrap()
    }

    let batched = load("multiRowValues").await;
    assert_eq!(batched.len(), 10);
    assert_eq!(batched, load("singleRow").await);
    assert_eq!(batched, load("unionAll").await);
}
