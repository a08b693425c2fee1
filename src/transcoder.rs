use std::{
    io,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    thread::JoinHandle,
};

use crossbeam_channel::{Receiver, Sender};
use reencode_core::{
    FormatStrategy, MediaBackend, TranscodeEngine, TranscodeError, TranscodeErrorInfo,
};
use tracing::{Level, debug, error, info, span, warn};

use crate::{config::TranscoderOptions, error::ErrorStack};

/// Receives the outcome of a session on the worker thread that runs it.
///
/// `percentage` is called zero or more times, followed by exactly one of `completed`, `canceled`
/// or `error`.
pub trait TranscodeCallback: Send + 'static {
    fn percentage(&mut self, progress: f64);

    fn completed(&mut self);

    fn canceled(&mut self);

    fn error(&mut self, err: TranscodeError);
}

#[derive(Debug)]
pub enum SessionEvent {
    Progress(f64),
    Completed,
    Canceled,
    Failed(TranscodeError),
}

impl SessionEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SessionEvent::Progress(_))
    }
}

/// Forwards events to a channel. Events are dropped once the receiver is gone.
impl TranscodeCallback for Sender<SessionEvent> {
    fn percentage(&mut self, progress: f64) {
        let _ = self.send(SessionEvent::Progress(progress));
    }

    fn completed(&mut self) {
        let _ = self.send(SessionEvent::Completed);
    }

    fn canceled(&mut self) {
        let _ = self.send(SessionEvent::Canceled);
    }

    fn error(&mut self, err: TranscodeError) {
        let _ = self.send(SessionEvent::Failed(err));
    }
}

#[derive(Debug, thiserror::Error)]
pub enum InitTranscoderError {
    #[error("Worker count has to be greater than zero.")]
    NoWorkers,

    #[error("Failed to spawn transcoder worker thread.")]
    SpawnWorker(#[source] io::Error),
}

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Runs transcoding sessions on a fixed pool of worker threads.
///
/// Sessions submitted while every worker is busy wait in a queue. Dropping the transcoder waits
/// for queued and running sessions to finish.
pub struct Transcoder<B: MediaBackend> {
    backend: Arc<B>,
    options: TranscoderOptions,
    job_sender: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
    next_session_id: AtomicU64,
}

impl<B: MediaBackend> Transcoder<B> {
    pub fn new(backend: B, options: TranscoderOptions) -> Result<Self, InitTranscoderError> {
        if options.worker_count == 0 {
            return Err(InitTranscoderError::NoWorkers);
        }
        let (job_sender, job_receiver) = crossbeam_channel::unbounded::<Job>();

        let mut transcoder = Self {
            backend: Arc::new(backend),
            options,
            job_sender: Some(job_sender),
            workers: Vec::with_capacity(options.worker_count),
            next_session_id: AtomicU64::new(0),
        };
        for worker_id in 0..options.worker_count {
            let job_receiver = job_receiver.clone();
            let worker = std::thread::Builder::new()
                .name(format!("reencode worker {worker_id}"))
                .spawn(move || run_worker(worker_id, job_receiver))
                .map_err(InitTranscoderError::SpawnWorker)?;
            transcoder.workers.push(worker);
        }
        info!(worker_count = options.worker_count, "Transcoder started.");
        Ok(transcoder)
    }

    pub fn execute(
        &self,
        input: B::Input,
        output: B::Output,
        strategy: Arc<dyn FormatStrategy>,
        mut callback: impl TranscodeCallback,
    ) -> SessionHandle {
        let session_id = self.next_session_id.fetch_add(1, Ordering::Relaxed);
        let (cancel_sender, cancel_receiver) = crossbeam_channel::bounded(1);
        let (done_sender, done_receiver) = crossbeam_channel::bounded(1);
        let handle = SessionHandle(Arc::new(SessionShared {
            canceled: AtomicBool::new(false),
            cancel_sender,
            done_receiver,
        }));

        let session = handle.clone();
        let backend = self.backend.clone();
        let engine_options = self.options.engine;
        let job: Job = Box::new(move || {
            let _span = span!(Level::INFO, "Session", session_id).entered();
            if session.is_canceled() {
                debug!("Session canceled before it started.");
                callback.canceled();
            } else {
                let engine = TranscodeEngine::new(backend.as_ref(), engine_options)
                    .with_interrupt(cancel_receiver);
                let result = engine.run(&input, &output, strategy.as_ref(), &mut |progress| {
                    callback.percentage(progress)
                });
                match result {
                    Ok(()) => callback.completed(),
                    Err(_) if session.is_canceled() => callback.canceled(),
                    Err(err) => {
                        let info = TranscodeErrorInfo::from(&err);
                        error!(
                            error_code = info.error_code,
                            error_type = ?info.error_type,
                            "Session failed: {}",
                            ErrorStack::new(&err).into_string()
                        );
                        callback.error(err);
                    }
                }
            }
            let _ = done_sender.send(());
        });

        match &self.job_sender {
            Some(job_sender) => {
                if job_sender.send(job).is_err() {
                    error!(session_id, "No transcoder worker is running, session dropped.");
                }
            }
            None => error!(session_id, "Transcoder is shutting down, session dropped."),
        }
        handle
    }
}

impl<B: MediaBackend> Drop for Transcoder<B> {
    fn drop(&mut self) {
        self.job_sender.take();
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                warn!("Transcoder worker panicked.");
            }
        }
    }
}

fn run_worker(worker_id: usize, jobs: Receiver<Job>) {
    let _span = span!(Level::INFO, "Worker", worker_id).entered();
    for job in jobs.iter() {
        job();
    }
    debug!("Worker finished.");
}

struct SessionShared {
    canceled: AtomicBool,
    cancel_sender: Sender<()>,
    done_receiver: Receiver<()>,
}

/// Handle to a submitted session. Clones refer to the same session.
#[derive(Clone)]
pub struct SessionHandle(Arc<SessionShared>);

impl SessionHandle {
    /// Requests cancellation. A queued session does not start, a running one stops at its next
    /// idle wait. Both report `canceled`.
    pub fn cancel(&self) {
        if !self.0.canceled.swap(true, Ordering::SeqCst) {
            let _ = self.0.cancel_sender.try_send(());
        }
    }

    pub fn is_canceled(&self) -> bool {
        self.0.canceled.load(Ordering::SeqCst)
    }

    /// Blocks until the terminal callback of the session returned, or the session was dropped
    /// without running.
    pub fn wait(&self) {
        let _ = self.0.done_receiver.recv();
    }
}
