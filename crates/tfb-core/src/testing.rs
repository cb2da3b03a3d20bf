//! In-memory fakes for the messaging port.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::{
    domain::{ChatId, MessageId, MessageRef, UserId},
    errors::Error,
    messaging::{
        port::MessagingPort,
        types::{Destination, MemberRole, OutboundPayload},
    },
    Result,
};

#[derive(Default)]
pub struct FakeMessenger {
    next_id: Mutex<i32>,
    sent: Mutex<Vec<(Destination, OutboundPayload)>>,
    attempts: AtomicUsize,
    fail_sends: AtomicBool,
    admins: Mutex<HashSet<u64>>,
    fail_membership: AtomicBool,
    membership_queries: AtomicUsize,
}

impl FakeMessenger {
    pub fn with_admins(ids: &[u64]) -> Self {
        let fake = Self::default();
        fake.admins.lock().unwrap().extend(ids.iter().copied());
        fake
    }

    pub fn fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    pub fn fail_membership(&self, fail: bool) {
        self.fail_membership.store(fail, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<(Destination, OutboundPayload)> {
        self.sent.lock().unwrap().clone()
    }

    /// Text of every sent text payload, in order.
    pub fn sent_texts(&self) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter_map(|(_, p)| match p {
                OutboundPayload::Text { text, .. } => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn last_text(&self) -> Option<String> {
        self.sent_texts().pop()
    }

    pub fn send_attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn membership_queries(&self) -> usize {
        self.membership_queries.load(Ordering::SeqCst)
    }

    pub fn clear(&self) {
        self.sent.lock().unwrap().clear();
    }
}

#[async_trait]
impl MessagingPort for FakeMessenger {
    async fn send(&self, dest: Destination, payload: OutboundPayload) -> Result<MessageRef> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(Error::External("telegram error: send refused".to_string()));
        }
        self.sent.lock().unwrap().push((dest, payload));

        let mut guard = self.next_id.lock().unwrap();
        *guard += 1;
        Ok(MessageRef {
            chat_id: dest.chat_id,
            message_id: MessageId(*guard),
        })
    }

    async fn member_role(&self, _chat_id: ChatId, user_id: UserId) -> Result<MemberRole> {
        self.membership_queries.fetch_add(1, Ordering::SeqCst);
        if self.fail_membership.load(Ordering::SeqCst) {
            return Err(Error::External("telegram error: getChatMember failed".to_string()));
        }
        if self.admins.lock().unwrap().contains(&user_id.0) {
            Ok(MemberRole::Administrator)
        } else {
            Ok(MemberRole::Member)
        }
    }
}
