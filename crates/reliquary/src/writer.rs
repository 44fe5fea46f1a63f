//! Byte-budgeted asynchronous file writes.
//!
//! The controlling thread owns the in-flight byte count and the number of
//! pending writes. Writers run on a dedicated rayon pool and only report their
//! own completion over a channel, so the counters never need a lock.

use std::fs;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::{Error, Result};

struct Completion {
    path: PathBuf,
    size: u64,
    result: io::Result<()>,
}

/// Write queue with a ceiling on bytes held by outstanding writes.
pub(crate) struct WriteQueue {
    pool: ThreadPool,
    sender: Sender<Completion>,
    receiver: Receiver<Completion>,
    limit: u64,
    backoff: Duration,
    in_flight: u64,
    pending: usize,
    peak: u64,
    written: usize,
}

impl WriteQueue {
    pub(crate) fn new(limit: u64, threads: usize, backoff: Duration) -> Result<Self> {
        let mut builder = ThreadPoolBuilder::new().thread_name(|i| format!("reliquary-writer-{i}"));
        if threads > 0 {
            builder = builder.num_threads(threads);
        }
        let pool = builder
            .build()
            .map_err(|e| Error::WriterPool(e.to_string()))?;
        let (sender, receiver) = crossbeam_channel::unbounded();

        Ok(Self {
            pool,
            sender,
            receiver,
            limit,
            backoff,
            in_flight: 0,
            pending: 0,
            peak: 0,
            written: 0,
        })
    }

    /// Block until `size` more bytes fit under the ceiling.
    ///
    /// With nothing outstanding any size is admitted, so the ceiling can be
    /// exceeded by at most one payload.
    pub(crate) fn admit(&mut self, size: u64) -> Result<()> {
        while self.over_budget(size) {
            self.drain_ready()?;
            if self.over_budget(size) {
                match self.receiver.recv_timeout(self.backoff) {
                    Ok(done) => self.complete(done)?,
                    Err(RecvTimeoutError::Timeout) => {}
                    Err(RecvTimeoutError::Disconnected) => unreachable!("queue holds a sender"),
                }
            }
        }
        Ok(())
    }

    /// Hand a payload to the writer pool.
    pub(crate) fn dispatch(&mut self, path: PathBuf, bytes: Vec<u8>) {
        let size = bytes.len() as u64;
        self.in_flight += size;
        self.pending += 1;
        self.peak = self.peak.max(self.in_flight);

        let sender = self.sender.clone();
        self.pool.spawn(move || {
            let result = fs::write(&path, &bytes);
            drop(bytes);
            // The receiver lives as long as the queue, which outlives every write
            let _ = sender.send(Completion { path, size, result });
        });
    }

    /// Wait for every outstanding write, returning the first failure.
    pub(crate) fn finish(&mut self) -> Result<()> {
        let mut first_error = None;
        while self.pending > 0 {
            let done = match self.receiver.recv() {
                Ok(done) => done,
                Err(_) => unreachable!("queue holds a sender"),
            };
            if let Err(e) = self.complete(done) {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Highest number of bytes held by outstanding writes so far.
    pub(crate) fn peak(&self) -> u64 {
        self.peak
    }

    /// Number of writes that completed successfully.
    pub(crate) fn written(&self) -> usize {
        self.written
    }

    fn over_budget(&self, size: u64) -> bool {
        self.pending > 0 && self.in_flight.saturating_add(size) > self.limit
    }

    fn drain_ready(&mut self) -> Result<()> {
        loop {
            match self.receiver.try_recv() {
                Ok(done) => self.complete(done)?,
                Err(TryRecvError::Empty) => return Ok(()),
                Err(TryRecvError::Disconnected) => unreachable!("queue holds a sender"),
            }
        }
    }

    fn complete(&mut self, done: Completion) -> Result<()> {
        self.pending -= 1;
        self.in_flight -= done.size;

        match done.result {
            Ok(()) => {
                self.written += 1;
                tracing::trace!(path = %done.path.display(), size = done.size, "write complete");
                Ok(())
            }
            Err(source) => Err(Error::WriteFile {
                path: done.path,
                source,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_writes_land_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let mut queue = WriteQueue::new(1024, 2, Duration::from_millis(1)).unwrap();

        for i in 0..8u8 {
            queue.admit(16).unwrap();
            queue.dispatch(dir.path().join(format!("{i}.bin")), vec![i; 16]);
        }
        queue.finish().unwrap();

        assert_eq!(queue.written(), 8);
        for i in 0..8u8 {
            assert_eq!(fs::read(dir.path().join(format!("{i}.bin"))).unwrap(), vec![i; 16]);
        }
    }

    #[test]
    fn test_budget_bounds_in_flight_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let limit = 100;
        let mut queue = WriteQueue::new(limit, 4, Duration::from_millis(1)).unwrap();

        for i in 0..32 {
            let size = 10 + (i % 7) * 10;
            queue.admit(size).unwrap();
            queue.dispatch(dir.path().join(format!("{i}")), vec![0; size as usize]);
            assert!(queue.in_flight <= limit.max(size));
        }
        queue.finish().unwrap();

        assert!(queue.peak() <= limit);
        assert_eq!(queue.in_flight, 0);
        assert_eq!(queue.pending, 0);
    }

    #[test]
    fn test_oversized_payload_admitted_when_idle() {
        let dir = tempfile::tempdir().unwrap();
        let mut queue = WriteQueue::new(8, 1, Duration::from_millis(1)).unwrap();

        queue.admit(64).unwrap();
        queue.dispatch(dir.path().join("big"), vec![1; 64]);
        queue.admit(64).unwrap();
        assert_eq!(queue.pending, 0);
        queue.finish().unwrap();
        assert_eq!(queue.peak(), 64);
    }

    #[test]
    fn test_failed_write_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let bad = dir.path().join("missing").join("file.bin");
        let mut queue = WriteQueue::new(1024, 1, Duration::from_millis(1)).unwrap();

        queue.dispatch(bad.clone(), vec![0; 4]);
        queue.dispatch(dir.path().join("ok.bin"), vec![0; 4]);

        match queue.finish() {
            Err(Error::WriteFile { path, .. }) => assert_eq!(path, bad),
            other => panic!("expected WriteFile error, got {other:?}"),
        }
        assert_eq!(queue.pending, 0);
        assert_eq!(queue.written(), 1);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn prop_in_flight_stays_under_limit(
            limit in 1u64..256,
            sizes in prop::collection::vec(1u64..128, 1..48),
        ) {
            let dir = tempfile::tempdir().unwrap();
            let mut queue = WriteQueue::new(limit, 3, Duration::from_millis(1)).unwrap();

            for (i, &size) in sizes.iter().enumerate() {
                queue.admit(size).unwrap();
                queue.dispatch(dir.path().join(i.to_string()), vec![0; size as usize]);
                // Only a lone oversized write may exceed the ceiling
                prop_assert!(queue.in_flight <= limit || queue.pending == 1);
            }
            queue.finish().unwrap();

            let largest = sizes.iter().copied().max().unwrap_or(0);
            prop_assert!(queue.peak() <= limit.max(largest));
            prop_assert_eq!(queue.written(), sizes.len());
            prop_assert_eq!(queue.in_flight, 0);
        }
    }
}
