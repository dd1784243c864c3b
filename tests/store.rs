use counter_web::prelude::*;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};

/// A sqlite file under the temp dir, removed with its journal files on drop.
struct TempDb {
    path: PathBuf,
}

impl TempDb {
    fn new(name: &str) -> Self {
        static SEQ: AtomicUsize = AtomicUsize::new(0);
        let seq = SEQ.fetch_add(1, Ordering::SeqCst);
        let path = std::env::temp_dir().join(format!(
            "counter-web-{name}-{}-{seq}.db",
            std::process::id()
        ));
        let db = Self { path };
        db.remove();
        db
    }

    fn config(&self, max_connections: u32) -> DatabaseConfig {
        DatabaseConfig {
            url: format!("sqlite://{}", self.path.display()),
            max_connections,
        }
    }

    fn remove(&self) {
        for suffix in ["", "-wal", "-shm", "-journal"] {
            let mut file = self.path.clone().into_os_string();
            file.push(suffix);
            let _ = std::fs::remove_file(file);
        }
    }
}

impl Drop for TempDb {
    fn drop(&mut self) {
        self.remove();
    }
}

async fn concurrent_increments(k: i64) {
    let file = TempDb::new(&format!("concurrent-{k}"));
    let store = CounterStore::open(&file.config(4)).await.unwrap();
    for _ in 0..3 {
        store.increment().await.unwrap();
    }
    let before = store.get().await.unwrap();

    let tasks: Vec<_> = (0..k)
        .map(|_| {
            let store = store.clone();
            tokio::spawn(async move { store.increment().await.unwrap() })
        })
        .collect();
    let mut returned = Vec::new();
    for task in tasks {
        returned.push(task.await.unwrap());
    }

    returned.sort_unstable();
    let expected: Vec<i64> = (before + 1..=before + k).collect();
    assert_eq!(returned, expected, "every increment saw a distinct value");
    assert_eq!(store.get().await.unwrap(), before + k);
    store.close().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn two_concurrent_increments() {
    concurrent_increments(2).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn ten_concurrent_increments() {
    concurrent_increments(10).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn hundred_concurrent_increments() {
    concurrent_increments(100).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn ten_concurrent_increments_from_zero_in_memory() {
    let store = CounterStore::open(&DatabaseConfig::in_memory()).await.unwrap();
    let tasks: Vec<_> = (0..10)
        .map(|_| {
            let store = store.clone();
            tokio::spawn(async move { store.increment().await })
        })
        .collect();
    for task in tasks {
        task.await.unwrap().unwrap();
    }
    assert_eq!(store.get().await.unwrap(), 10);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn reads_never_go_backwards() {
    let file = TempDb::new("reads");
    let store = CounterStore::open(&file.config(4)).await.unwrap();
    let writers = 50;

    let reader = {
        let store = store.clone();
        tokio::spawn(async move {
            let mut last = 0;
            for _ in 0..writers {
                let value = store.get().await.unwrap();
                assert!(value >= last, "read {value} after {last}");
                assert!(value <= writers);
                last = value;
                tokio::task::yield_now().await;
            }
        })
    };
    let tasks: Vec<_> = (0..writers)
        .map(|_| {
            let store = store.clone();
            tokio::spawn(async move { store.increment().await.unwrap() })
        })
        .collect();
    for task in tasks {
        let returned = task.await.unwrap();
        assert!(store.get().await.unwrap() >= returned);
    }
    reader.await.unwrap();
    assert_eq!(store.get().await.unwrap(), writers);
    store.close().await;
}

#[tokio::test]
async fn value_survives_reopen() {
    let file = TempDb::new("reopen");
    let store = CounterStore::open(&file.config(1)).await.unwrap();
    for _ in 0..3 {
        store.increment().await.unwrap();
    }
    store.close().await;
    assert!(matches!(
        store.get().await,
        Err(StoreError::StorageUnavailable(_))
    ));

    let reopened = CounterStore::open(&file.config(2)).await.unwrap();
    assert_eq!(reopened.get().await.unwrap(), 3);
    assert_eq!(reopened.increment().await.unwrap(), 4);
    reopened.close().await;
}

#[tokio::test]
async fn second_startup_keeps_one_record() {
    let file = TempDb::new("startup");
    let config = file.config(1);
    let first = CounterStore::open(&config).await.unwrap();
    first.increment().await.unwrap();
    let second = CounterStore::open(&config).await.unwrap();
    assert_eq!(second.get().await.unwrap(), 1);

    let pool = sqlite_with(&config).await.unwrap();
    let rows: i64 = sqlx::query_scalar("select count(*) from counters")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(rows, 1);
    pool.close().await;
    first.close().await;
    second.close().await;
}
