mod command;
mod structure;

pub use command::CommandBackend;
pub use structure::ClassStructureBackend;

#[cfg(test)]
pub(crate) use structure::class_bytes;

use crate::archive::{passthrough_entry, ArchiveReader, EntryKind};
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use rayon::ThreadPoolBuilder;
use srccompare_common::{
    ArchiveInput, CompareConfig, CompareError, DecompilerConfig, FileInfo, FileSet,
};
use std::io;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// How long the collecting thread waits before re-checking cancellation
const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Turns the bytes of one compiled class into text
pub trait DecompileBackend: Send + Sync {
    fn decompile(&self, entry_name: &str, bytes: &[u8]) -> io::Result<String>;
}

enum TaskOutcome {
    Done { slot: usize, file: FileInfo },
    Failed { entry: String, source: io::Error },
    Skipped,
}

/// Raw entry bytes currently held by the orchestrator and its workers
#[derive(Default)]
struct ResidentBytes {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl ResidentBytes {
    fn acquire(&self, len: usize) {
        let now = self.current.fetch_add(len, Ordering::SeqCst) + len;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn release(&self, len: usize) {
        self.current.fetch_sub(len, Ordering::SeqCst);
    }

    fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

/// Shared state of one `decompile_archive` call
struct Run<'a> {
    archive_name: &'a str,
    permit_tx: Sender<()>,
    permit_rx: Receiver<()>,
    result_tx: Sender<TaskOutcome>,
    result_rx: Receiver<TaskOutcome>,
    abort: Arc<AtomicBool>,
    resident: Arc<ResidentBytes>,
    cancel: Option<&'a AtomicBool>,
    slots: Vec<Option<FileInfo>>,
    pending: usize,
}

impl Run<'_> {
    fn check_cancelled(&self) -> Result<(), CompareError> {
        if self.cancel.map_or(false, |flag| flag.load(Ordering::Relaxed)) {
            debug!("Decompilation of {} cancelled", self.archive_name);
            return Err(CompareError::Cancelled);
        }
        Ok(())
    }

    fn handle(&mut self, outcome: TaskOutcome) -> Result<(), CompareError> {
        match outcome {
            TaskOutcome::Done { slot, file } => {
                debug!("Decompiled {}", file.name());
                self.slots[slot] = Some(file);
                self.pending -= 1;
                Ok(())
            }
            TaskOutcome::Failed { entry, source } => Err(CompareError::Decompile { entry, source }),
            TaskOutcome::Skipped => {
                self.pending -= 1;
                Ok(())
            }
        }
    }

    fn drain_ready(&mut self) -> Result<(), CompareError> {
        while let Ok(outcome) = self.result_rx.try_recv() {
            self.handle(outcome)?;
        }
        Ok(())
    }

    /// Block until a worker slot frees up, handling results that arrive meanwhile
    fn acquire_permit(&mut self) -> Result<(), CompareError> {
        loop {
            self.check_cancelled()?;
            self.drain_ready()?;
            match self.permit_rx.recv_timeout(POLL_INTERVAL) {
                Ok(()) => return Ok(()),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(CompareError::Io(io::Error::new(
                        io::ErrorKind::BrokenPipe,
                        "decompile permit channel closed",
                    )))
                }
            }
        }
    }

    fn release_permit(&self) {
        let _ = self.permit_tx.send(());
    }

    fn await_pending(&mut self) -> Result<(), CompareError> {
        while self.pending > 0 {
            self.check_cancelled()?;
            match self.result_rx.recv_timeout(POLL_INTERVAL) {
                Ok(outcome) => self.handle(outcome)?,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(CompareError::Io(io::Error::new(
                        io::ErrorKind::BrokenPipe,
                        "decompile result channel closed",
                    )))
                }
            }
        }
        Ok(())
    }
}

/// Concurrent, memory-bounded decompilation of every class in an archive.
///
/// Each call builds its own worker pool. Entry bytes are read only while a
/// permit is held, and `pool_size` permits exist, so at most `pool_size`
/// raw entries are resident at once. The returned set follows archive order
/// regardless of completion order.
pub struct Decompiler {
    backend: Arc<dyn DecompileBackend>,
    pool_size: usize,
}

impl Decompiler {
    pub fn new(backend: Arc<dyn DecompileBackend>, pool_size: usize) -> Self {
        Self {
            backend,
            pool_size: pool_size.max(1),
        }
    }

    pub fn from_config(config: &CompareConfig) -> Self {
        let backend: Arc<dyn DecompileBackend> = match &config.decompiler {
            DecompilerConfig::Structure => Arc::new(ClassStructureBackend),
            DecompilerConfig::Command { program, args } => {
                Arc::new(CommandBackend::new(program.clone(), args.clone()))
            }
        };
        Self::new(backend, config.effective_pool_size())
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    pub fn decompile_archive(&self, input: &dyn ArchiveInput) -> Result<FileSet, CompareError> {
        self.decompile_archive_with_cancel(input, None)
    }

    pub fn decompile_archive_with_cancel(
        &self,
        input: &dyn ArchiveInput,
        cancel: Option<&AtomicBool>,
    ) -> Result<FileSet, CompareError> {
        let resident = Arc::new(ResidentBytes::default());
        let files = self.decompile_tracked(input, cancel, &resident)?;
        debug!(
            "Peak resident entry bytes for {}: {}",
            input.filename(),
            resident.peak()
        );
        Ok(files)
    }

    fn decompile_tracked(
        &self,
        input: &dyn ArchiveInput,
        cancel: Option<&AtomicBool>,
        resident: &Arc<ResidentBytes>,
    ) -> Result<FileSet, CompareError> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(self.pool_size)
            .thread_name(|i| format!("decompile-{}", i))
            .build()
            .map_err(|e| CompareError::Io(io::Error::new(io::ErrorKind::Other, e.to_string())))?;

        let (permit_tx, permit_rx) = channel::bounded(self.pool_size);
        for _ in 0..self.pool_size {
            let _ = permit_tx.send(());
        }
        let (result_tx, result_rx) = channel::unbounded();

        let mut run = Run {
            archive_name: input.filename(),
            permit_tx,
            permit_rx,
            result_tx,
            result_rx,
            abort: Arc::new(AtomicBool::new(false)),
            resident: Arc::clone(resident),
            cancel,
            slots: Vec::new(),
            pending: 0,
        };

        info!(
            "Decompiling {} with {} workers",
            input.filename(),
            self.pool_size
        );

        if let Err(e) = self.schedule(input, &pool, &mut run) {
            // Queued tasks see the flag and skip their work; the pool is
            // released when it goes out of scope.
            run.abort.store(true, Ordering::SeqCst);
            return Err(e);
        }

        let files: FileSet = run.slots.into_iter().flatten().collect();
        debug!("Decompiled {} entries from {}", files.len(), input.filename());
        Ok(files)
    }

    fn schedule(
        &self,
        input: &dyn ArchiveInput,
        pool: &rayon::ThreadPool,
        run: &mut Run<'_>,
    ) -> Result<(), CompareError> {
        let mut reader = ArchiveReader::open(input)?;

        loop {
            run.acquire_permit()?;
            let entry = match reader.next_entry() {
                Ok(Some(entry)) => entry,
                Ok(None) => {
                    run.release_permit();
                    break;
                }
                Err(e) => {
                    run.release_permit();
                    return Err(e);
                }
            };
            let len = entry.bytes.len();
            run.resident.acquire(len);

            if entry.is_dir {
                run.resident.release(len);
                run.release_permit();
                continue;
            }

            let kind = EntryKind::of(&entry.name);
            if kind != EntryKind::Class {
                run.slots
                    .push(Some(passthrough_entry(entry.name, &entry.bytes, kind)));
                drop(entry.bytes);
                run.resident.release(len);
                run.release_permit();
                continue;
            }

            let slot = run.slots.len();
            run.slots.push(None);
            run.pending += 1;

            let backend = Arc::clone(&self.backend);
            let abort = Arc::clone(&run.abort);
            let resident = Arc::clone(&run.resident);
            let permit = run.permit_tx.clone();
            let results = run.result_tx.clone();
            let name = entry.name;
            let bytes = entry.bytes;

            pool.spawn(move || {
                let outcome = if abort.load(Ordering::SeqCst) {
                    TaskOutcome::Skipped
                } else {
                    match catch_unwind(AssertUnwindSafe(|| backend.decompile(&name, &bytes))) {
                        Ok(Ok(text)) => TaskOutcome::Done {
                            slot,
                            file: FileInfo::new(name, text),
                        },
                        Ok(Err(source)) => TaskOutcome::Failed {
                            entry: name,
                            source,
                        },
                        Err(_) => TaskOutcome::Failed {
                            entry: name,
                            source: io::Error::new(io::ErrorKind::Other, "decompiler panicked"),
                        },
                    }
                };
                drop(bytes);
                resident.release(len);
                let _ = permit.send(());
                let _ = results.send(outcome);
            });
        }

        run.await_pending()
    }
}
