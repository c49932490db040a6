use std::sync::Arc;

use clap::Parser;
use storage_memory::{MemoryStore, MemoryStoreConfig};
use tablestore_api::{Cell, ClientError, Direction, PrimaryKey, RangeScan, Row, checksum};
use tablestore_engine::config::ClientConfig;
use tablestore_engine::{
    EngineError, Operation, RangeIterator, RangeIteratorParameter, RetryPolicy, RetryStrategy,
    execute_async,
};

const PK_NAME: &str = "id";

#[derive(Parser)]
#[command(name = "tablestore-scan", about = "Paged range scan over an in-memory table")]
struct Cli {
    /// Path to TOML configuration file.
    #[arg(long, default_value = "tablestore.toml", env = "TABLESTORE_CONFIG")]
    config: String,

    /// Rows to seed before scanning.
    #[arg(long, default_value_t = 1000)]
    rows: i64,

    /// Transport failures injected before the first and before the second page.
    #[arg(long, default_value_t = 0)]
    inject_failures: usize,
}

#[derive(Debug, Default)]
struct ScanSummary {
    rows: usize,
    pages: usize,
    retries: u32,
    read_units: u64,
    digest: u8,
}

fn seed(store: &MemoryStore, table: &str, rows: i64) -> Result<(), ClientError> {
    store.create_table(table, &[PK_NAME])?;
    for id in 0..rows {
        let pk = PrimaryKey::builder().add(PK_NAME, id).build()?;
        let cells = vec![
            Cell::new("name", format!("item-{id:05}")),
            Cell::new("price", id as f64 * 0.25),
            Cell::new("in_stock", id % 3 != 0),
        ];
        store.put_row(table, Row::new(pk, cells))?;
    }
    Ok(())
}

fn inject(store: &MemoryStore, count: usize) {
    for n in 0..count {
        store.inject_failure(ClientError::transport(format!("injected failure {}", n + 1)));
    }
}

fn range_parameter(config: &ClientConfig) -> Result<RangeIteratorParameter, ClientError> {
    let scan = &config.scan;
    let (start, end) = match scan.direction {
        Direction::Forward => (PrimaryKey::inf_min(&[PK_NAME])?, PrimaryKey::inf_max(&[PK_NAME])?),
        Direction::Backward => (PrimaryKey::inf_max(&[PK_NAME])?, PrimaryKey::inf_min(&[PK_NAME])?),
    };
    let mut param = RangeIteratorParameter::new(scan.table.clone(), start, end)
        .direction(scan.direction)
        .columns_to_get(scan.columns.iter().cloned());
    param.buffer_size = scan.buffer_size;
    param.max_count = scan.max_count;
    Ok(param)
}

async fn scan(
    store: Arc<MemoryStore>,
    policy: &RetryPolicy,
    param: RangeIteratorParameter,
    failures: usize,
) -> Result<ScanSummary, EngineError> {
    let mut summary = ScanSummary::default();

    inject(&store, failures);
    let mut attempts = 0u32;
    let mut iter = execute_async(policy, Operation::GetRange, || {
        attempts += 1;
        let result = RangeIterator::new(Arc::clone(&store), param.clone());
        async move { result }
    })
    .await?;
    summary.retries += attempts - 1;
    inject(&store, failures);

    drain(&mut iter, policy, &mut summary).await?;
    Ok(summary)
}

/// Pull every remaining row. Each page fetch is its own request: a failed
/// fetch starts a fresh retry state, so the deadline counts from that fetch.
async fn drain<S: RangeScan>(
    iter: &mut RangeIterator<S>,
    policy: &RetryPolicy,
    summary: &mut ScanSummary,
) -> Result<(), EngineError> {
    let mut retry: Option<RetryStrategy> = None;
    loop {
        match iter.has_next() {
            Ok(false) => break,
            Ok(true) => {
                if let Some(done) = retry.take() {
                    summary.retries += done.retry_count();
                }
                let row = iter.next_row()?;
                summary.digest = checksum::crc8_u8(summary.digest, checksum::row(&row));
                summary.rows += 1;
            }
            Err(err) => {
                let strategy = retry.get_or_insert_with(|| RetryStrategy::new(policy.clone()));
                let pause = strategy.next_pause(Operation::GetRange, &err);
                if pause.is_zero() {
                    return Err(err.into());
                }
                tracing::info!(
                    retry = strategy.retry_count(),
                    pause_ms = pause.as_millis() as u64,
                    error = %err,
                    "page fetch failed, retrying"
                );
                tokio::time::sleep(pause).await;
            }
        }
    }

    summary.pages = iter.fetch_count();
    summary.read_units = iter.consumed().read;
    Ok(())
}

async fn run(cli: &Cli) -> Result<ScanSummary, EngineError> {
    tracing::info!(config = %cli.config, "loading configuration");
    let config = ClientConfig::load(&cli.config)?;
    let policy = config.retry.build()?;

    let memory = match config.memory.clone() {
        Some(value) => toml::Value::try_into::<MemoryStoreConfig>(value)
            .map_err(|e| EngineError::Config(format!("[memory]: {e}")))?,
        None => MemoryStoreConfig::default(),
    };
    let store = Arc::new(MemoryStore::new(memory));

    tracing::info!(table = %config.scan.table, rows = cli.rows, "seeding table");
    seed(&store, &config.scan.table, cli.rows)?;

    let param = range_parameter(&config)?;
    tracing::info!(
        table = %config.scan.table,
        direction = ?config.scan.direction,
        buffer_size = ?config.scan.buffer_size,
        max_count = ?config.scan.max_count,
        "starting range scan"
    );
    scan(store, &policy, param, cli.inject_failures).await
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();

    match run(&cli).await {
        Ok(summary) => tracing::info!(
            rows = summary.rows,
            pages = summary.pages,
            retries = summary.retries,
            read_units = summary.read_units,
            digest = format_args!("{:#04x}", summary.digest),
            "scan complete"
        ),
        Err(e) => {
            tracing::error!(error = %e, "scan failed");
            std::process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use tablestore_api::{RangeRequest, RangeResponse};

    use super::*;

    /// Memory store behind a slow link that drops one chosen call.
    struct SlowLink {
        store: MemoryStore,
        latency: Duration,
        calls: AtomicUsize,
        fail_call: usize,
    }

    impl RangeScan for SlowLink {
        fn get_range(&self, request: &RangeRequest) -> Result<RangeResponse, ClientError> {
            std::thread::sleep(self.latency);
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call == self.fail_call {
                return Err(ClientError::transport("connection reset"));
            }
            self.store.get_range(request)
        }
    }

    fn config(buffer_size: usize) -> ClientConfig {
        let mut config = ClientConfig::default();
        config.scan.buffer_size = Some(buffer_size);
        config
    }

    #[tokio::test]
    async fn late_page_failure_gets_its_own_retry_budget() {
        let store = MemoryStore::default();
        seed(&store, "demo", 30).unwrap();
        // Third call fails after the scan has outlived the retry timeout.
        let link = SlowLink {
            store,
            latency: Duration::from_millis(40),
            calls: AtomicUsize::new(0),
            fail_call: 3,
        };
        let policy = RetryPolicy::default_with(3, Duration::from_millis(50));

        let mut iter = RangeIterator::new(&link, range_parameter(&config(10)).unwrap()).unwrap();
        let mut summary = ScanSummary::default();
        drain(&mut iter, &policy, &mut summary).await.unwrap();

        assert_eq!(summary.rows, 30);
        assert_eq!(summary.retries, 1);
        assert_eq!(summary.pages, 3);
    }

    #[tokio::test]
    async fn retries_are_counted_per_failed_fetch() {
        let store = Arc::new(MemoryStore::default());
        seed(&store, "demo", 25).unwrap();
        let policy = RetryPolicy::always(2);

        let summary = scan(Arc::clone(&store), &policy, range_parameter(&config(10)).unwrap(), 2)
            .await
            .unwrap();
        assert_eq!(summary.rows, 25);
        assert_eq!(summary.retries, 4);
        assert_eq!(summary.pages, 3);
    }
}
