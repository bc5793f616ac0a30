//! Mailbox, run loop and lifecycle hooks for a single actor.
//!
//! An actor is spawned in two steps: [`mailbox`] creates the sending handle and
//! the receiving half, then [`spawn`] moves the actor and the receiving half onto
//! a tokio task. Splitting the two lets the actor hold clones of its own handle.

use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

/// Marker trait for actor messages.
pub trait Message: Send + Debug + 'static {}

impl<T: Send + Debug + 'static> Message for T {}

/// State owned by one task and driven by its mailbox.
///
/// Messages are handled one at a time, so `handle` has exclusive access to the
/// actor's state for the duration of each call.
#[async_trait]
pub trait Actor: Send + 'static {
    type Message: Message;

    /// Actor name, used as the prefix of its id.
    fn name(&self) -> &str;

    /// Handle a single message. Returning `false` stops the actor.
    async fn handle(&mut self, msg: Self::Message, ctx: &mut ActorContext) -> bool;

    async fn on_start(&mut self, _ctx: &mut ActorContext) {}

    /// Runs once after the loop exits, whatever the reason.
    async fn on_stop(&mut self, _ctx: &mut ActorContext) {}
}

/// Per-task bookkeeping passed to every hook.
#[derive(Debug)]
pub struct ActorContext {
    pub actor_id: String,
    pub messages_processed: u64,
}

/// Failure to deliver a message.
#[derive(Debug, Error)]
pub enum ActorError {
    #[error("mailbox full")]
    MailboxFull,

    #[error("actor stopped")]
    ActorStopped,
}

/// Sending side of an actor mailbox.
pub struct ActorHandle<M: Message> {
    tx: mpsc::Sender<M>,
    actor_id: String,
}

impl<M: Message> Clone for ActorHandle<M> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            actor_id: self.actor_id.clone(),
        }
    }
}

impl<M: Message> ActorHandle<M> {
    /// Waits for mailbox capacity, then enqueues `msg`.
    pub async fn send(&self, msg: M) -> Result<(), ActorError> {
        self.tx
            .send(msg)
            .await
            .map_err(|_| ActorError::ActorStopped)
    }

    /// Enqueues `msg` only if the mailbox has room. Usable from `Drop`.
    pub fn try_send(&self, msg: M) -> Result<(), ActorError> {
        self.tx.try_send(msg).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => ActorError::MailboxFull,
            mpsc::error::TrySendError::Closed(_) => ActorError::ActorStopped,
        })
    }
}

impl<M: Message> Debug for ActorHandle<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActorHandle")
            .field("actor_id", &self.actor_id)
            .finish()
    }
}

/// Receiving half of an actor mailbox, consumed by [`spawn`].
pub struct Mailbox<M: Message> {
    rx: mpsc::Receiver<M>,
    actor_id: String,
}

/// Creates a mailbox holding up to `size` queued messages.
pub fn mailbox<M: Message>(name: &str, size: usize) -> (ActorHandle<M>, Mailbox<M>) {
    let actor_id = format!("{}_{}", name, ACTOR_IDS.fetch_add(1, Ordering::Relaxed));
    let (tx, rx) = mpsc::channel(size);
    (
        ActorHandle {
            tx,
            actor_id: actor_id.clone(),
        },
        Mailbox { rx, actor_id },
    )
}

static ACTOR_IDS: AtomicU64 = AtomicU64::new(0);

/// Owner's reference to a running actor task.
pub struct ActorRef {
    pub actor_id: String,
    task: tokio::task::JoinHandle<()>,
    shutdown_tx: watch::Sender<bool>,
}

impl ActorRef {
    /// Signal the actor to stop after the message it is handling.
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Signal stop and wait up to `grace` for the actor to finish, aborting it
    /// afterwards. Returns true if the actor stopped on its own.
    pub async fn stop_and_wait(&self, grace: Duration) -> bool {
        self.stop();

        let deadline = Instant::now() + grace;
        while Instant::now() < deadline {
            if !self.is_running() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        warn!(actor_id = %self.actor_id, "Force aborting actor");
        self.task.abort();
        false
    }
}

/// Moves `actor` onto a tokio task fed by `mailbox`.
pub fn spawn<A: Actor>(actor: A, mailbox: Mailbox<A::Message>) -> ActorRef {
    let Mailbox { rx, actor_id } = mailbox;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let ctx = ActorContext {
        actor_id: actor_id.clone(),
        messages_processed: 0,
    };
    let task = tokio::spawn(run(actor, rx, shutdown_rx, ctx));

    info!(actor_id = %actor_id, "Spawned actor");

    ActorRef {
        actor_id,
        task,
        shutdown_tx,
    }
}

async fn run<A: Actor>(
    mut actor: A,
    mut rx: mpsc::Receiver<A::Message>,
    mut shutdown: watch::Receiver<bool>,
    mut ctx: ActorContext,
) {
    actor.on_start(&mut ctx).await;
    debug!(actor_id = %ctx.actor_id, name = actor.name(), "Actor started");

    loop {
        tokio::select! {
            biased;

            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    info!(actor_id = %ctx.actor_id, "Actor received shutdown signal");
                    break;
                }
            }

            msg = rx.recv() => {
                let Some(msg) = msg else {
                    debug!(actor_id = %ctx.actor_id, "Actor mailbox closed");
                    break;
                };
                ctx.messages_processed += 1;
                if !actor.handle(msg, &mut ctx).await {
                    info!(actor_id = %ctx.actor_id, "Actor requested stop");
                    break;
                }
            }
        }
    }

    actor.on_stop(&mut ctx).await;

    info!(
        actor_id = %ctx.actor_id,
        messages_processed = ctx.messages_processed,
        "Actor stopped"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::oneshot;

    #[derive(Debug)]
    enum CounterMessage {
        Add(u64),
        Get(oneshot::Sender<u64>),
        Stop,
    }

    struct Counter {
        total: u64,
        stopped: Option<oneshot::Sender<(u64, u64)>>,
    }

    #[async_trait]
    impl Actor for Counter {
        type Message = CounterMessage;

        fn name(&self) -> &str {
            "counter"
        }

        async fn handle(&mut self, msg: CounterMessage, _ctx: &mut ActorContext) -> bool {
            match msg {
                CounterMessage::Add(n) => self.total += n,
                CounterMessage::Get(reply_to) => {
                    let _ = reply_to.send(self.total);
                }
                CounterMessage::Stop => return false,
            }
            true
        }

        async fn on_stop(&mut self, ctx: &mut ActorContext) {
            if let Some(tx) = self.stopped.take() {
                let _ = tx.send((self.total, ctx.messages_processed));
            }
        }
    }

    #[tokio::test]
    async fn test_actor_processes_messages_in_order() {
        let (handle, mailbox) = mailbox::<CounterMessage>("counter", 16);
        let actor_ref = spawn(
            Counter {
                total: 0,
                stopped: None,
            },
            mailbox,
        );

        handle.send(CounterMessage::Add(2)).await.unwrap();
        handle.send(CounterMessage::Add(3)).await.unwrap();

        let (tx, rx) = oneshot::channel();
        handle.send(CounterMessage::Get(tx)).await.unwrap();
        assert_eq!(rx.await.unwrap(), 5);

        assert!(actor_ref.stop_and_wait(Duration::from_secs(1)).await);
    }

    #[tokio::test]
    async fn test_actor_requested_stop_runs_on_stop() {
        let (handle, mailbox) = mailbox::<CounterMessage>("counter", 16);
        let (tx, rx) = oneshot::channel();
        let _actor_ref = spawn(
            Counter {
                total: 0,
                stopped: Some(tx),
            },
            mailbox,
        );

        handle.send(CounterMessage::Add(7)).await.unwrap();
        handle.send(CounterMessage::Stop).await.unwrap();

        assert_eq!(rx.await.unwrap(), (7, 2));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(matches!(
            handle.send(CounterMessage::Add(1)).await,
            Err(ActorError::ActorStopped)
        ));
    }

    #[tokio::test]
    async fn test_stop_runs_on_stop_with_queued_messages() {
        let (handle, mailbox) = mailbox::<CounterMessage>("counter", 16);
        let (tx, rx) = oneshot::channel();
        let actor_ref = spawn(
            Counter {
                total: 0,
                stopped: Some(tx),
            },
            mailbox,
        );

        handle.send(CounterMessage::Add(1)).await.unwrap();
        let (get_tx, get_rx) = oneshot::channel();
        handle.send(CounterMessage::Get(get_tx)).await.unwrap();
        assert_eq!(get_rx.await.unwrap(), 1);

        assert!(actor_ref.stop_and_wait(Duration::from_secs(1)).await);
        assert_eq!(rx.await.unwrap(), (1, 2));
    }

    #[tokio::test]
    async fn test_try_send_full_mailbox() {
        let (handle, _mailbox) = mailbox::<CounterMessage>("counter", 1);

        handle.try_send(CounterMessage::Add(1)).unwrap();
        assert!(matches!(
            handle.try_send(CounterMessage::Add(1)),
            Err(ActorError::MailboxFull)
        ));
    }

    #[tokio::test]
    async fn test_send_to_stopped_actor() {
        let (handle, mailbox) = mailbox::<CounterMessage>("counter", 4);
        drop(mailbox);

        assert!(matches!(
            handle.send(CounterMessage::Add(1)).await,
            Err(ActorError::ActorStopped)
        ));
    }

    #[test]
    fn test_mailbox_ids_are_unique() {
        let (_a, ma) = mailbox::<CounterMessage>("engine", 1);
        let (_b, mb) = mailbox::<CounterMessage>("engine", 1);
        assert_ne!(ma.actor_id, mb.actor_id);
        assert!(ma.actor_id.starts_with("engine_"));
    }
}
