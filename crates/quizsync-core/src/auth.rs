//! Identity-change notifications.

use tokio::sync::watch;

use crate::model::UserId;

/// Publishes sign-in and sign-out transitions.
///
/// Subscribers see the latest identity; intermediate values may be skipped if
/// they change faster than a subscriber reacts. Publishing the identity that
/// is already current is not a transition and wakes nobody.
#[derive(Debug)]
pub struct AuthObserver {
    sender: watch::Sender<Option<UserId>>,
}

impl AuthObserver {
    /// Start signed out.
    pub fn new() -> Self {
        let (sender, _) = watch::channel(None);
        Self { sender }
    }

    pub fn sign_in(&self, user: UserId) {
        self.publish(Some(user));
    }

    pub fn sign_out(&self) {
        self.publish(None);
    }

    /// The identity most recently published.
    pub fn current(&self) -> Option<UserId> {
        self.sender.borrow().clone()
    }

    /// Receiver for [`ResultStore::listen`](crate::store::ResultStore::listen).
    pub fn subscribe(&self) -> watch::Receiver<Option<UserId>> {
        self.sender.subscribe()
    }

    fn publish(&self, user: Option<UserId>) {
        self.sender.send_if_modified(|current| {
            if *current == user {
                false
            } else {
                *current = user;
                true
            }
        });
    }
}

impl Default for AuthObserver {
    fn default() -> Self {
        Self::new()
    }
}
