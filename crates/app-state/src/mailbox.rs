//! Hand-off from worker threads to the store's owner thread.
//!
//! Workers never touch the store. They send a [`StoreCommand`] through a
//! cloneable [`MailboxSender`]; the owner thread drains the mailbox with
//! [`StoreMailbox::apply_pending`], typically once per UI tick.

use crossbeam::channel::{self, Receiver, Sender};
use ct_common::{CurveMetadata, Point};

use crate::error::{StoreError, StoreResult};
use crate::store::CurveStore;

/// A store mutation requested from another thread.
#[derive(Clone, Debug, PartialEq)]
pub enum StoreCommand {
    SetCurveData {
        name: String,
        points: Vec<Point>,
        metadata: Option<CurveMetadata>,
    },
    DeleteCurve(String),
    SetActiveCurve(Option<String>),
    SetCurrentFrame(i32),
    SetImageFiles(Vec<String>),
}

/// Worker-side handle. Cheap to clone and `Send`.
#[derive(Clone, Debug)]
pub struct MailboxSender {
    tx: Sender<StoreCommand>,
}

impl MailboxSender {
    /// Queue a command. Fails once the mailbox has been dropped.
    pub fn send(&self, command: StoreCommand) -> StoreResult<()> {
        self.tx.send(command).map_err(|_| {
            tracing::warn!("Store mailbox closed, dropping command");
            StoreError::MailboxClosed
        })
    }
}

/// Owner-side queue of pending commands.
pub struct StoreMailbox {
    tx: Sender<StoreCommand>,
    rx: Receiver<StoreCommand>,
}

impl Default for StoreMailbox {
    fn default() -> Self {
        Self::new()
    }
}

impl StoreMailbox {
    pub fn new() -> Self {
        let (tx, rx) = channel::unbounded();
        Self { tx, rx }
    }

    pub fn sender(&self) -> MailboxSender {
        MailboxSender { tx: self.tx.clone() }
    }

    pub fn pending(&self) -> usize {
        self.rx.len()
    }

    /// Apply every queued command to `store` inside one batch.
    ///
    /// Must run on the store's owner thread. A command the store rejects is
    /// logged and skipped; the return value counts the ones applied.
    pub fn apply_pending(&self, store: &CurveStore) -> StoreResult<usize> {
        store.owner().check("apply_pending")?;

        let commands: Vec<StoreCommand> = self.rx.try_iter().collect();
        if commands.is_empty() {
            return Ok(0);
        }

        let _batch = store.batch()?;
        let mut applied = 0;
        for command in commands {
            match apply(store, command) {
                Ok(()) => applied += 1,
                Err(e) => tracing::warn!(error = %e, "Mailbox command rejected"),
            }
        }
        tracing::debug!(applied, "Applied mailbox commands");
        Ok(applied)
    }
}

fn apply(store: &CurveStore, command: StoreCommand) -> StoreResult<()> {
    match command {
        StoreCommand::SetCurveData {
            name,
            points,
            metadata,
        } => store.set_curve_data(&name, &points, metadata),
        StoreCommand::DeleteCurve(name) => store.delete_curve(&name).map(|_| ()),
        StoreCommand::SetActiveCurve(name) => store.set_active_curve(name.as_deref()),
        StoreCommand::SetCurrentFrame(frame) => store.set_current_frame(frame),
        StoreCommand::SetImageFiles(files) => store.set_image_files(files),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    use parking_lot::Mutex;

    use crate::events::{EventKind, StoreEvent};

    #[test]
    fn worker_commands_apply_on_owner_thread() {
        let store = CurveStore::new();
        let mailbox = StoreMailbox::new();
        let sender = mailbox.sender();

        thread::spawn(move || {
            sender
                .send(StoreCommand::SetCurveData {
                    name: "loaded".into(),
                    points: vec![Point::new(1, 1.0, 2.0)],
                    metadata: None,
                })
                .unwrap();
            sender
                .send(StoreCommand::SetActiveCurve(Some("loaded".into())))
                .unwrap();
        })
        .join()
        .unwrap();

        assert_eq!(mailbox.pending(), 2);
        assert_eq!(mailbox.apply_pending(&store).unwrap(), 2);
        assert_eq!(store.active_curve().unwrap().as_deref(), Some("loaded"));
        assert_eq!(store.get_curve_data(None).unwrap(), vec![Point::new(1, 1.0, 2.0)]);
        assert_eq!(mailbox.apply_pending(&store).unwrap(), 0);
    }

    #[test]
    fn commands_flush_as_one_batch() {
        let store = CurveStore::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        store.subscribe_all(move |e: &StoreEvent| sink.lock().push(e.kind()));

        let mailbox = StoreMailbox::new();
        let sender = mailbox.sender();
        for frame in 2..6 {
            sender.send(StoreCommand::SetCurrentFrame(frame)).unwrap();
        }
        mailbox.apply_pending(&store).unwrap();

        assert_eq!(*seen.lock(), vec![EventKind::FrameChanged, EventKind::StateChanged]);
        assert_eq!(store.current_frame().unwrap(), 5);
    }

    #[test]
    fn rejected_command_is_skipped() {
        let store = CurveStore::new();
        let mailbox = StoreMailbox::new();
        let sender = mailbox.sender();
        sender
            .send(StoreCommand::SetImageFiles(vec![String::new()]))
            .unwrap();
        sender.send(StoreCommand::SetCurrentFrame(3)).unwrap();

        assert_eq!(mailbox.apply_pending(&store).unwrap(), 1);
        assert!(store.image_files().unwrap().is_empty());
    }

    #[test]
    fn send_after_drop_fails() {
        let mailbox = StoreMailbox::new();
        let sender = mailbox.sender();
        drop(mailbox);
        assert!(matches!(
            sender.send(StoreCommand::SetCurrentFrame(1)),
            Err(StoreError::MailboxClosed)
        ));
    }

    #[test]
    fn apply_from_worker_is_rejected() {
        let store = Arc::new(CurveStore::new());
        let mailbox = Arc::new(StoreMailbox::new());
        let (s, m) = (Arc::clone(&store), Arc::clone(&mailbox));
        let result = thread::spawn(move || m.apply_pending(&s)).join().unwrap();
        assert!(matches!(result, Err(StoreError::WrongThread { .. })));
    }
}
