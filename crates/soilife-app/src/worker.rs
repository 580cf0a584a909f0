use std::thread::{self, JoinHandle};

use anyhow::{Context, Result, anyhow};
use crossfire::{MRx, MTx, detect_backoff_cfg, mpmc};
use soilife_core::{Frame, Kernel, KernelCommand, KernelError, KernelReply, StepReport};
use tracing::{debug, info, warn};

const BUS_CAPACITY: usize = 64;

type Reply = Result<KernelReply, KernelError>;

/// Runs a [`Kernel`] on its own thread.
///
/// [`KernelWorker::request`] sends one command and blocks until its reply
/// arrives, so at most one command is ever in flight.
pub struct KernelWorker {
    commands: Option<MTx<KernelCommand>>,
    replies: MRx<Reply>,
    handle: Option<JoinHandle<()>>,
}

impl KernelWorker {
    /// Moves `kernel` onto a new worker thread.
    pub fn spawn(kernel: Kernel) -> Result<Self> {
        detect_backoff_cfg();
        let (command_tx, command_rx) = mpmc::bounded_blocking(BUS_CAPACITY);
        let (reply_tx, reply_rx) = mpmc::bounded_blocking(BUS_CAPACITY);
        let handle = thread::Builder::new()
            .name("soilife-kernel".into())
            .spawn(move || run_worker(kernel, command_rx, reply_tx))
            .context("failed to spawn kernel worker thread")?;
        Ok(Self {
            commands: Some(command_tx),
            replies: reply_rx,
            handle: Some(handle),
        })
    }

    /// Sends `command` and waits for the kernel's reply.
    pub fn request(&self, command: KernelCommand) -> Result<KernelReply> {
        let commands = self
            .commands
            .as_ref()
            .context("kernel worker already shut down")?;
        commands
            .send(command)
            .map_err(|_| anyhow!("kernel worker disconnected"))?;
        let reply = self
            .replies
            .recv()
            .map_err(|_| anyhow!("kernel worker exited before replying"))?;
        Ok(reply?)
    }

    pub fn init(&self, width: u32, height: u32) -> Result<Frame> {
        match self.request(KernelCommand::Init { width, height })? {
            KernelReply::Frame(frame) => Ok(frame),
            other => Err(anyhow!("unexpected reply to init: {other:?}")),
        }
    }

    /// Advances one generation; `None` if the kernel is not initialized.
    pub fn step(&self) -> Result<Option<StepReport>> {
        match self.request(KernelCommand::Step)? {
            KernelReply::Stepped(report) => Ok(Some(report)),
            KernelReply::Ignored => Ok(None),
            other => Err(anyhow!("unexpected reply to step: {other:?}")),
        }
    }

    /// Sends a command whose reply is a frame (render, clear, reset, ...).
    pub fn frame(&self, command: KernelCommand) -> Result<Option<Frame>> {
        match self.request(command)? {
            KernelReply::Frame(frame) => Ok(Some(frame)),
            KernelReply::Ignored => Ok(None),
            other => Err(anyhow!("unexpected reply, expected a frame: {other:?}")),
        }
    }

    /// Closes the command bus and joins the worker thread.
    pub fn shutdown(mut self) -> Result<()> {
        self.close()
    }

    fn close(&mut self) -> Result<()> {
        self.commands.take();
        if let Some(handle) = self.handle.take() {
            handle
                .join()
                .map_err(|_| anyhow!("kernel worker thread panicked"))?;
        }
        Ok(())
    }
}

impl Drop for KernelWorker {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            warn!(%err, "kernel worker did not stop cleanly");
        }
    }
}

fn run_worker(mut kernel: Kernel, commands: MRx<KernelCommand>, replies: MTx<Reply>) {
    info!("kernel worker started");
    while let Ok(command) = commands.recv() {
        let reply = kernel.apply(command);
        match &reply {
            Ok(KernelReply::Ignored) => debug!("command ignored before init"),
            Err(err) => warn!(%err, "kernel command failed"),
            Ok(_) => {}
        }
        if replies.send(reply).is_err() {
            warn!("reply channel closed; stopping kernel worker");
            break;
        }
    }
    info!("kernel worker stopped");
}
