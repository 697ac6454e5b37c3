use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use vigil_application::ports::QueryIterator;
use vigil_domain::{Query, Record};

/// Channel capacity of query result streams.
const RESULT_BUFFER: usize = 64;

/// How long a backend waits for the consumer before aborting iteration.
const SEND_TIMEOUT: Duration = Duration::from_secs(1);

/// Stream pre-collected records through a bounded channel on a dedicated
/// task, honouring order/limit/offset and cancellation.
///
/// Backends that iterate in memory collect matching records first and
/// hand them here; the 1-second send timeout keeps a stalled consumer
/// from pinning backend resources.
pub(crate) fn spawn_iteration(mut records: Vec<Record>, query: &Query) -> QueryIterator {
    if let Some(order_key) = &query.order_by {
        let key = order_key.clone();
        records.sort_by(|a, b| {
            let mut a = a.clone();
            let mut b = b.clone();
            let a_val = sort_key(&mut a, &key);
            let b_val = sort_key(&mut b, &key);
            a_val.partial_cmp(&b_val).unwrap_or(std::cmp::Ordering::Equal)
        });
    }

    let offset = query.offset.unwrap_or(0).max(0) as usize;
    let limit = query.limit.map(|l| l.max(0) as usize);
    let mut selected: Vec<Record> = records.into_iter().skip(offset).collect();
    if let Some(limit) = limit {
        selected.truncate(limit);
    }

    let (tx, rx) = mpsc::channel(RESULT_BUFFER);
    let done = CancellationToken::new();
    let worker_done = done.clone();

    tokio::spawn(async move {
        for record in selected {
            tokio::select! {
                _ = worker_done.cancelled() => {
                    debug!("Query iteration cancelled by consumer");
                    return;
                }
                sent = tokio::time::timeout(SEND_TIMEOUT, tx.send(record)) => {
                    match sent {
                        Ok(Ok(())) => {}
                        Ok(Err(_)) => return,
                        Err(_) => {
                            debug!("Query iteration aborted: consumer timed out");
                            return;
                        }
                    }
                }
            }
        }
    });

    QueryIterator::new(rx, done)
}

/// Orderable view of one field: strings sort lexicographically, numbers
/// numerically; missing keys sort first.
#[derive(PartialEq, PartialOrd)]
enum SortKey {
    Missing,
    Number(f64),
    Text(String),
}

fn sort_key(record: &mut Record, key: &str) -> SortKey {
    use vigil_domain::Accessor;
    let accessor = record.accessor();
    if let Some(n) = accessor.get_float(key) {
        return SortKey::Number(n);
    }
    if let Some(s) = accessor.get_string(key) {
        return SortKey::Text(s);
    }
    SortKey::Missing
}
