//! Bounded link queues: the row conduits between stage copies.
//!
//! A link queue has exactly one producer stage-copy and one consumer
//! stage-copy; fan-out and fan-in are done by allocating multiple queues,
//! never by sharing one. `put` blocks on a full buffer, `get` blocks on an
//! empty one, and a stop request interrupts both sides.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, RwLock};

use rowflux_types::layout::RowLayout;
use rowflux_types::row::Row;

struct Inner {
    buf: VecDeque<Row>,
    finished: bool,
    interrupted: bool,
}

/// Bounded, thread-safe FIFO of rows with an immutable shared row layout.
///
/// The layout is established by the producer at (or before) the first `put`
/// and never changes for the lifetime of the queue.
pub struct LinkQueue {
    name: String,
    producer: String,
    consumer: String,
    capacity: usize,
    inner: Mutex<Inner>,
    not_full: Condvar,
    not_empty: Condvar,
    layout: RwLock<Option<Arc<RowLayout>>>,
}

impl LinkQueue {
    pub fn new(
        producer: impl Into<String>,
        consumer: impl Into<String>,
        name: impl Into<String>,
        capacity: usize,
    ) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            producer: producer.into(),
            consumer: consumer.into(),
            capacity,
            inner: Mutex::new(Inner {
                buf: VecDeque::with_capacity(capacity),
                finished: false,
                interrupted: false,
            }),
            not_full: Condvar::new(),
            not_empty: Condvar::new(),
            layout: RwLock::new(None),
        })
    }

    /// Diagnostic name, `producer.copy -> consumer.copy`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stage name of the producing side.
    pub fn producer_stage(&self) -> &str {
        &self.producer
    }

    /// Stage name of the consuming side.
    pub fn consumer_stage(&self) -> &str {
        &self.consumer
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Establish the row layout. The first call wins; later calls are no-ops
    /// (the producer re-asserting the same layout on every row is harmless).
    pub fn set_layout(&self, layout: Arc<RowLayout>) {
        let mut guard = self.layout.write().expect("layout lock poisoned");
        if guard.is_none() {
            *guard = Some(layout);
        }
    }

    /// The layout, once established by the producer.
    pub fn layout(&self) -> Option<Arc<RowLayout>> {
        self.layout.read().expect("layout lock poisoned").clone()
    }

    /// Append a row, blocking while the buffer holds `capacity` rows.
    ///
    /// Returns `false` (discarding the row) only when the queue was
    /// interrupted by a stop request while waiting or before insertion.
    ///
    /// # Panics
    ///
    /// Calling `put` after [`LinkQueue::mark_producer_finished`] is a
    /// programming error in the producing stage and panics.
    pub fn put(&self, row: Row) -> bool {
        let mut inner = self.inner.lock().expect("queue lock poisoned");
        assert!(
            !inner.finished,
            "put after mark_producer_finished on queue [{}]",
            self.name
        );
        while inner.buf.len() >= self.capacity && !inner.interrupted {
            inner = self.not_full.wait(inner).expect("queue lock poisoned");
        }
        if inner.interrupted {
            return false;
        }
        inner.buf.push_back(row);
        drop(inner);
        self.not_empty.notify_one();
        true
    }

    /// Take the next row, blocking while the buffer is empty and the producer
    /// has not finished. Returns `None` at end-of-stream (producer finished
    /// and buffer drained) or when the queue was interrupted by a stop.
    pub fn get(&self) -> Option<Row> {
        let mut inner = self.inner.lock().expect("queue lock poisoned");
        while inner.buf.is_empty() && !inner.finished && !inner.interrupted {
            inner = self.not_empty.wait(inner).expect("queue lock poisoned");
        }
        if inner.interrupted {
            return None;
        }
        match inner.buf.pop_front() {
            Some(row) => {
                drop(inner);
                self.not_full.notify_one();
                Some(row)
            }
            None => None,
        }
    }

    /// Signal that no further rows will be produced. Idempotent; wakes any
    /// blocked consumer.
    pub fn mark_producer_finished(&self) {
        let mut inner = self.inner.lock().expect("queue lock poisoned");
        inner.finished = true;
        drop(inner);
        self.not_empty.notify_all();
    }

    /// Wake every blocked party and make the queue refuse further traffic.
    /// Buffered rows are dropped: after a stop, no row may appear downstream.
    pub fn interrupt(&self) {
        let mut inner = self.inner.lock().expect("queue lock poisoned");
        inner.interrupted = true;
        drop(inner);
        self.not_full.notify_all();
        self.not_empty.notify_all();
    }

    /// `true` once the producer finished and the buffer is drained.
    pub fn is_done(&self) -> bool {
        let inner = self.inner.lock().expect("queue lock poisoned");
        (inner.finished && inner.buf.is_empty()) || inner.interrupted
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("queue lock poisoned").buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.len() >= self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rowflux_types::layout::Column;
    use rowflux_types::row::{Value, ValueType};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    fn int_row(v: i64) -> Row {
        Row::new(vec![Value::Int64(v)])
    }

    fn queue(capacity: usize) -> Arc<LinkQueue> {
        LinkQueue::new("a", "b", "a.0 -> b.0", capacity)
    }

    #[test]
    fn test_fifo_order_preserved() {
        let q = queue(8);
        for i in 0..5 {
            assert!(q.put(int_row(i)));
        }
        q.mark_producer_finished();
        let mut got = Vec::new();
        while let Some(row) = q.get() {
            got.push(row.get(0).and_then(Value::as_i64).unwrap());
        }
        assert_eq!(got, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_put_blocks_at_capacity_and_unblocks_on_get() {
        let q = queue(2);
        assert!(q.put(int_row(1)));
        assert!(q.put(int_row(2)));
        assert!(q.is_full());

        let blocked = Arc::new(AtomicBool::new(true));
        let producer = {
            let q = q.clone();
            let blocked = blocked.clone();
            std::thread::spawn(move || {
                let accepted = q.put(int_row(3));
                blocked.store(false, Ordering::SeqCst);
                accepted
            })
        };

        // The producer must still be parked while the buffer is full.
        std::thread::sleep(Duration::from_millis(50));
        assert!(blocked.load(Ordering::SeqCst));

        // One get frees exactly one slot and releases the producer.
        assert_eq!(q.get().unwrap().get(0).and_then(Value::as_i64), Some(1));
        assert!(producer.join().unwrap());
        assert_eq!(q.len(), 2);
    }

    #[test]
    fn test_get_blocks_until_put() {
        let q = queue(2);
        let consumer = {
            let q = q.clone();
            std::thread::spawn(move || q.get())
        };
        std::thread::sleep(Duration::from_millis(20));
        assert!(q.put(int_row(9)));
        let row = consumer.join().unwrap().expect("row");
        assert_eq!(row.get(0).and_then(Value::as_i64), Some(9));
    }

    #[test]
    fn test_end_of_stream_after_drain() {
        let q = queue(4);
        assert!(q.put(int_row(1)));
        q.mark_producer_finished();
        q.mark_producer_finished(); // idempotent
        assert!(q.get().is_some());
        assert!(q.get().is_none());
        assert!(q.is_done());
    }

    #[test]
    fn test_finish_wakes_blocked_consumer() {
        let q = queue(2);
        let consumer = {
            let q = q.clone();
            std::thread::spawn(move || q.get())
        };
        std::thread::sleep(Duration::from_millis(20));
        q.mark_producer_finished();
        assert!(consumer.join().unwrap().is_none());
    }

    #[test]
    #[should_panic(expected = "put after mark_producer_finished")]
    fn test_put_after_finished_panics() {
        let q = queue(2);
        q.mark_producer_finished();
        q.put(int_row(1));
    }

    #[test]
    fn test_interrupt_unblocks_producer_and_discards_row() {
        let q = queue(1);
        assert!(q.put(int_row(1)));
        let producer = {
            let q = q.clone();
            std::thread::spawn(move || q.put(int_row(2)))
        };
        std::thread::sleep(Duration::from_millis(20));
        q.interrupt();
        assert!(!producer.join().unwrap());
        // Buffered rows are dropped for consumers once interrupted.
        assert!(q.get().is_none());
    }

    #[test]
    fn test_layout_first_set_wins() {
        let q = queue(2);
        assert!(q.layout().is_none());
        let a = Arc::new(RowLayout::new(vec![Column::new("id", ValueType::Int64)]));
        let b = Arc::new(RowLayout::new(vec![Column::new("x", ValueType::Utf8)]));
        q.set_layout(a.clone());
        q.set_layout(b);
        assert_eq!(q.layout().unwrap(), a);
    }
}
