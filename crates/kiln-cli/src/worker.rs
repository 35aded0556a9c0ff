//! Background evaluation.
//!
//! A script can loop for as long as it likes, so evaluation runs on a
//! dedicated thread that owns its own sandbox. The caller polls for replies.
//! There is no way to interrupt a running evaluation: `cancel` abandons the
//! thread and starts a fresh one, and the abandoned thread's replies are
//! never delivered.

use std::collections::BTreeSet;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::thread::JoinHandle;
use std::time::Duration;

use kiln_types::EvalReport;
use thiserror::Error;

use crate::config::SandboxConfig;
use crate::interpreter::Interpreter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Ticket(pub u64);

#[derive(Debug)]
pub struct WorkerReply {
    pub ticket: Ticket,
    /// `sha256:<hex>` of the evaluated script text
    pub digest: String,
    pub report: EvalReport,
    /// Captured `display` output
    pub output: String,
}

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("evaluation worker has stopped")]
    Disconnected,
    #[error("cannot start evaluation worker: {0}")]
    Spawn(#[from] std::io::Error),
}

/// SHA-256 of a script, used to match replies to the text they belong to.
pub fn script_digest(script: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(script.as_bytes());
    format!("sha256:{:x}", hasher.finalize())
}

struct Job {
    ticket: Ticket,
    script: String,
}

struct Handle {
    jobs: Sender<Job>,
    replies: Receiver<WorkerReply>,
    thread: JoinHandle<()>,
}

impl Handle {
    fn spawn(config: SandboxConfig) -> Result<Self, WorkerError> {
        let (jobs, job_rx) = mpsc::channel::<Job>();
        let (reply_tx, replies) = mpsc::channel();
        let thread = std::thread::Builder::new()
            .name("kiln-eval".to_string())
            .spawn(move || run(config, job_rx, reply_tx))?;
        Ok(Self {
            jobs,
            replies,
            thread,
        })
    }
}

fn run(config: SandboxConfig, jobs: Receiver<Job>, replies: Sender<WorkerReply>) {
    let mut interp = Interpreter::with_config(config);
    while let Ok(job) = jobs.recv() {
        tracing::debug!(target: "kiln::worker", ticket = job.ticket.0, "evaluating");
        let digest = script_digest(&job.script);
        let report = interp.eval(&job.script);
        let output = interp.take_output();
        let reply = WorkerReply {
            ticket: job.ticket,
            digest,
            report,
            output,
        };
        if replies.send(reply).is_err() {
            // Abandoned by `cancel`.
            break;
        }
    }
    tracing::debug!(target: "kiln::worker", "worker exiting");
}

pub struct EvalWorker {
    config: SandboxConfig,
    handle: Handle,
    next_ticket: u64,
    outstanding: BTreeSet<Ticket>,
}

impl EvalWorker {
    pub fn spawn(config: SandboxConfig) -> Result<Self, WorkerError> {
        let handle = Handle::spawn(config.clone())?;
        Ok(Self {
            config,
            handle,
            next_ticket: 1,
            outstanding: BTreeSet::new(),
        })
    }

    /// Queue a script. Scripts are evaluated in submission order.
    pub fn submit(&mut self, script: impl Into<String>) -> Result<Ticket, WorkerError> {
        let ticket = Ticket(self.next_ticket);
        self.next_ticket += 1;
        self.handle
            .jobs
            .send(Job {
                ticket,
                script: script.into(),
            })
            .map_err(|_| WorkerError::Disconnected)?;
        self.outstanding.insert(ticket);
        Ok(ticket)
    }

    /// Non-blocking poll.
    pub fn try_recv(&mut self) -> Result<Option<WorkerReply>, WorkerError> {
        match self.handle.replies.try_recv() {
            Ok(reply) => Ok(Some(self.delivered(reply))),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(WorkerError::Disconnected),
        }
    }

    pub fn recv_timeout(&mut self, timeout: Duration) -> Result<Option<WorkerReply>, WorkerError> {
        match self.handle.replies.recv_timeout(timeout) {
            Ok(reply) => Ok(Some(self.delivered(reply))),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(WorkerError::Disconnected),
        }
    }

    /// Block until the next reply.
    pub fn recv(&mut self) -> Result<WorkerReply, WorkerError> {
        let reply = self
            .handle
            .replies
            .recv()
            .map_err(|_| WorkerError::Disconnected)?;
        Ok(self.delivered(reply))
    }

    fn delivered(&mut self, reply: WorkerReply) -> WorkerReply {
        self.outstanding.remove(&reply.ticket);
        reply
    }

    /// True while a submitted script has no reply yet.
    pub fn in_progress(&self) -> bool {
        !self.outstanding.is_empty()
    }

    /// Abandon outstanding work and start over with a fresh sandbox.
    pub fn cancel(&mut self) -> Result<(), WorkerError> {
        let fresh = Handle::spawn(self.config.clone())?;
        let abandoned = std::mem::replace(&mut self.handle, fresh);
        tracing::warn!(
            target: "kiln::worker",
            outstanding = self.outstanding.len(),
            "evaluation cancelled; worker abandoned"
        );
        self.outstanding.clear();
        // Dropping the channels lets the old thread exit once its current
        // script finishes; its JoinHandle is detached.
        drop(abandoned);
        Ok(())
    }

    /// Stop accepting work and wait for the thread to finish queued scripts.
    pub fn shutdown(self) -> Result<(), WorkerError> {
        let Handle {
            jobs,
            replies,
            thread,
        } = self.handle;
        drop(jobs);
        drop(replies);
        thread.join().map_err(|_| WorkerError::Disconnected)
    }
}
