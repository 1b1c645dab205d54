//! Single-queue driver for a [`SessionEngine`].
//!
//! The engine lives on its own thread. User commands and timer ticks are
//! both delivered through one channel, so they are applied strictly one at
//! a time in arrival order. A tick schedule is armed only while the engine
//! is resting and is torn down as soon as it leaves that state.

use crate::clock::Clock;
use crate::engine::{Command, SessionEngine, SessionSnapshot, SessionState};
use crate::store::WorkoutLogStore;
use crate::timer::{TickHandle, TickSource};
use crate::{Error, Result};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

enum Message<S, C> {
    Command(Command, Sender<Result<SessionSnapshot>>),
    Snapshot(Sender<SessionSnapshot>),
    /// Tick for engine epoch `epoch` from schedule number `schedule`
    Tick { epoch: u64, schedule: u64 },
    Shutdown(Sender<SessionEngine<S, C>>),
}

/// Handle to an engine running on a background thread
pub struct RunnerHandle<S, C> {
    sender: Sender<Message<S, C>>,
    worker: Option<JoinHandle<()>>,
}

impl<S, C> RunnerHandle<S, C>
where
    S: WorkoutLogStore + Send + 'static,
    C: Clock + 'static,
{
    /// Move `engine` onto a worker thread, ticking every `every` while resting
    pub fn spawn<T>(engine: SessionEngine<S, C>, ticker: T, every: Duration) -> Self
    where
        T: TickSource + 'static,
    {
        let (sender, receiver) = mpsc::channel();
        let tick_sender = sender.clone();

        let worker = thread::spawn(move || {
            let mut runner = Runner {
                engine: Some(engine),
                ticker,
                every,
                tick_sender,
                ticks: None,
                schedule: 0,
            };
            runner.run(receiver);
        });

        Self {
            sender,
            worker: Some(worker),
        }
    }

    /// Apply a command and wait for its outcome
    pub fn send(&self, command: Command) -> Result<SessionSnapshot> {
        let (reply, response) = mpsc::channel();
        self.sender
            .send(Message::Command(command, reply))
            .map_err(|_| stopped())?;
        response.recv().map_err(|_| stopped())?
    }

    /// Current snapshot, taken after everything queued so far
    pub fn snapshot(&self) -> Result<SessionSnapshot> {
        let (reply, response) = mpsc::channel();
        self.sender
            .send(Message::Snapshot(reply))
            .map_err(|_| stopped())?;
        response.recv().map_err(|_| stopped())
    }

    /// Stop the worker and take the engine back
    pub fn shutdown(mut self) -> Result<SessionEngine<S, C>> {
        let (reply, response) = mpsc::channel();
        self.sender
            .send(Message::Shutdown(reply))
            .map_err(|_| stopped())?;
        let engine = response.recv().map_err(|_| stopped())?;
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
        Ok(engine)
    }
}

impl<S, C> Drop for RunnerHandle<S, C> {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.take() {
            let (reply, _response) = mpsc::channel();
            let _ = self.sender.send(Message::Shutdown(reply));
            if worker.join().is_err() {
                tracing::warn!("Session runner thread panicked");
            }
        }
    }
}

fn stopped() -> Error {
    Error::Other("session runner has stopped".into())
}

struct Runner<S, C, T> {
    engine: Option<SessionEngine<S, C>>,
    ticker: T,
    every: Duration,
    tick_sender: Sender<Message<S, C>>,
    ticks: Option<TickHandle>,
    schedule: u64,
}

impl<S, C, T> Runner<S, C, T>
where
    S: WorkoutLogStore + Send + 'static,
    C: Clock + 'static,
    T: TickSource,
{
    fn run(&mut self, receiver: Receiver<Message<S, C>>) {
        while let Ok(message) = receiver.recv() {
            let engine = match self.engine.as_mut() {
                Some(engine) => engine,
                None => break,
            };

            match message {
                Message::Command(command, reply) => {
                    let outcome = engine.apply(command);
                    if let Err(e) = &outcome {
                        tracing::debug!("Command rejected: {}", e);
                    }
                    // The schedule must match the new state before the caller hears back
                    self.sync_schedule();
                    let _ = reply.send(outcome);
                }
                Message::Snapshot(reply) => {
                    let _ = reply.send(engine.snapshot());
                }
                Message::Tick { epoch, schedule } => {
                    if schedule == self.schedule {
                        if let Err(e) = engine.tick(epoch) {
                            tracing::warn!("Tick failed: {}", e);
                        }
                        self.sync_schedule();
                    }
                }
                Message::Shutdown(reply) => {
                    self.disarm();
                    if let Some(engine) = self.engine.take() {
                        let _ = reply.send(engine);
                    }
                    break;
                }
            }
        }

        self.disarm();
    }

    /// Keep exactly one tick schedule alive while resting, none otherwise
    fn sync_schedule(&mut self) {
        let (state, epoch) = match &self.engine {
            Some(engine) => (engine.state(), engine.epoch()),
            None => return,
        };

        if state != SessionState::Resting {
            self.disarm();
            return;
        }
        if self.ticks.is_some() {
            return;
        }

        self.schedule += 1;
        let schedule = self.schedule;
        let sender = self.tick_sender.clone();
        tracing::trace!("Arming rest ticks (epoch {}, schedule {})", epoch, schedule);
        self.ticks = Some(self.ticker.schedule(
            self.every,
            Box::new(move || {
                let _ = sender.send(Message::Tick { epoch, schedule });
            }),
        ));
    }

    fn disarm(&mut self) {
        if let Some(mut ticks) = self.ticks.take() {
            ticks.cancel();
            // Ticks already queued from this schedule are dropped on arrival
            self.schedule += 1;
        }
    }
}
