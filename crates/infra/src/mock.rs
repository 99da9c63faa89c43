//! # テスト用モックリポジトリ
//!
//! ユースケーステストで使用するインメモリモックリポジトリ。
//! `test-utils` feature を有効にすることで、他クレートからも利用可能。
//!
//! ```toml
//! [dev-dependencies]
//! warisin-infra = { workspace = true, features = ["test-utils"] }
//! ```
//!
//! 3 つのリポジトリは [`MockStore`] を共有する。期限到来の選択のように
//! テーブルをまたぐ条件も PostgreSQL 実装と同じ結果になる。
//! セーブポイントのロールバックは再現しない。

use std::sync::{
    Arc,
    Mutex,
    atomic::{AtomicU64, Ordering},
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use warisin_domain::{
    email::{EmailAddress, EmailReputation},
    message::{Message, MessageId, MessagePhase, MessageWithReceivers},
    receiver::Receiver,
    secret::Secret,
};

use crate::{
    db::{TransactionManager, TxContext},
    error::InfraError,
    repository::{EmailRepository, MessageRepository, ReceiverRepository},
    secret::SecretGenerator,
};

// ===== MockStore =====

#[derive(Debug, Default)]
struct Tables {
    messages:  Vec<Message>,
    receivers: Vec<Receiver>,
    emails:    Vec<EmailReputation>,
}

impl Tables {
    fn is_deliverable(&self, email: &EmailAddress) -> bool {
        self.emails
            .iter()
            .find(|e| e.email() == email)
            .is_none_or(EmailReputation::is_active)
    }

    fn visible_receivers(&self, id: &MessageId) -> Vec<Receiver> {
        let mut receivers: Vec<Receiver> = self
            .receivers
            .iter()
            .filter(|r| r.message_id() == id && !r.is_unsubscribed())
            .cloned()
            .collect();
        receivers.sort_by(|a, b| a.email_receiver().cmp(b.email_receiver()));
        receivers
    }

    /// `created_at`、`id` の順に並べたメッセージ
    fn sorted_messages(&self) -> Vec<&Message> {
        let mut messages: Vec<&Message> = self.messages.iter().collect();
        messages.sort_by(|a, b| {
            a.created_at()
                .cmp(&b.created_at())
                .then_with(|| a.id().as_uuid().cmp(b.id().as_uuid()))
        });
        messages
    }

    fn replace_message(&mut self, id: &MessageId, f: impl FnOnce(Message) -> Message) -> bool {
        match self.messages.iter().position(|m| m.id() == id) {
            Some(index) => {
                let message = self.messages.remove(index);
                self.messages.insert(index, f(message));
                true
            }
            None => false,
        }
    }
}

/// モックリポジトリが共有するインメモリのテーブル群
#[derive(Debug, Clone, Default)]
pub struct MockStore {
    tables: Arc<Mutex<Tables>>,
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_message(&self, message: Message) {
        self.tables.lock().unwrap().messages.push(message);
    }

    pub fn add_receiver(&self, receiver: Receiver) {
        self.tables.lock().unwrap().receivers.push(receiver);
    }

    pub fn add_email(&self, reputation: EmailReputation) {
        self.tables.lock().unwrap().emails.push(reputation);
    }

    pub fn message(&self, id: &MessageId) -> Option<Message> {
        self.tables
            .lock()
            .unwrap()
            .messages
            .iter()
            .find(|m| m.id() == id)
            .cloned()
    }

    pub fn messages(&self) -> Vec<Message> {
        self.tables.lock().unwrap().messages.clone()
    }

    pub fn receivers_of(&self, id: &MessageId) -> Vec<Receiver> {
        self.tables
            .lock()
            .unwrap()
            .receivers
            .iter()
            .filter(|r| r.message_id() == id)
            .cloned()
            .collect()
    }

    pub fn email(&self, email: &EmailAddress) -> Option<EmailReputation> {
        self.tables
            .lock()
            .unwrap()
            .emails
            .iter()
            .find(|e| e.email() == email)
            .cloned()
    }

    /// 受信者をアドレス指定で配信停止にする（テストの前提条件用）
    pub fn unsubscribe(&self, id: &MessageId, email: &EmailAddress) {
        let mut tables = self.tables.lock().unwrap();
        tables.receivers = std::mem::take(&mut tables.receivers)
            .into_iter()
            .map(|r| {
                if r.message_id() == id && r.email_receiver() == email {
                    r.unsubscribed()
                } else {
                    r
                }
            })
            .collect();
    }
}

// ===== MockTransactionManager =====

#[derive(Clone, Default)]
pub struct MockTransactionManager;

#[async_trait]
impl TransactionManager for MockTransactionManager {
    async fn begin(&self) -> Result<TxContext, InfraError> {
        Ok(TxContext::mock())
    }
}

// ===== MockMessageRepository =====

#[derive(Clone, Default)]
pub struct MockMessageRepository {
    store: MockStore,
}

impl MockMessageRepository {
    pub fn new(store: MockStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl MessageRepository for MockMessageRepository {
    async fn insert(&self, _tx: &mut TxContext, message: &Message) -> Result<(), InfraError> {
        self.store.add_message(message.clone());
        Ok(())
    }

    async fn find_by_id(
        &self,
        _tx: &mut TxContext,
        id: &MessageId,
    ) -> Result<Option<Message>, InfraError> {
        Ok(self.store.message(id))
    }

    async fn update(&self, _tx: &mut TxContext, message: &Message) -> Result<(), InfraError> {
        let updated = message.clone();
        self.store
            .tables
            .lock()
            .unwrap()
            .replace_message(message.id(), |_| updated);
        Ok(())
    }

    async fn delete_owned(
        &self,
        _tx: &mut TxContext,
        id: &MessageId,
        creator: &EmailAddress,
    ) -> Result<bool, InfraError> {
        let mut tables = self.store.tables.lock().unwrap();
        let before = tables.messages.len();
        tables
            .messages
            .retain(|m| !(m.id() == id && m.is_owned_by(creator)));
        let deleted = tables.messages.len() < before;
        if deleted {
            tables.receivers.retain(|r| r.message_id() != id);
        }
        Ok(deleted)
    }

    async fn find_by_creator_with_receivers(
        &self,
        _tx: &mut TxContext,
        creator: &EmailAddress,
    ) -> Result<Vec<MessageWithReceivers>, InfraError> {
        let tables = self.store.tables.lock().unwrap();
        Ok(tables
            .sorted_messages()
            .into_iter()
            .filter(|m| m.is_owned_by(creator))
            .map(|m| MessageWithReceivers {
                message:   m.clone(),
                receivers: tables.visible_receivers(m.id()),
            })
            .collect())
    }

    async fn count_visible_receivers_by_creator(
        &self,
        _tx: &mut TxContext,
        creator: &EmailAddress,
        excluding: Option<&MessageId>,
    ) -> Result<usize, InfraError> {
        let tables = self.store.tables.lock().unwrap();
        Ok(tables
            .messages
            .iter()
            .filter(|m| m.is_owned_by(creator) && Some(m.id()) != excluding)
            .map(|m| tables.visible_receivers(m.id()).len())
            .sum())
    }

    async fn find_due_for_reminder(
        &self,
        _tx: &mut TxContext,
        now: DateTime<Utc>,
    ) -> Result<Vec<MessageWithReceivers>, InfraError> {
        let tables = self.store.tables.lock().unwrap();
        Ok(tables
            .sorted_messages()
            .into_iter()
            .filter(|m| {
                m.phase(now) == MessagePhase::ReminderDue
                    && tables.is_deliverable(m.email_creator())
            })
            .map(|m| MessageWithReceivers {
                message:   m.clone(),
                receivers: tables.visible_receivers(m.id()),
            })
            .collect())
    }

    async fn find_due_for_delivery(
        &self,
        _tx: &mut TxContext,
        now: DateTime<Utc>,
    ) -> Result<Vec<MessageWithReceivers>, InfraError> {
        let tables = self.store.tables.lock().unwrap();
        Ok(tables
            .sorted_messages()
            .into_iter()
            .filter(|m| m.phase(now) == MessagePhase::DeliveryDue)
            .filter_map(|m| {
                let receivers: Vec<Receiver> = tables
                    .visible_receivers(m.id())
                    .into_iter()
                    .filter(|r| tables.is_deliverable(r.email_receiver()))
                    .collect();
                (!receivers.is_empty()).then(|| MessageWithReceivers {
                    message: m.clone(),
                    receivers,
                })
            })
            .collect())
    }

    async fn advance_reminder(
        &self,
        _tx: &mut TxContext,
        id: &MessageId,
    ) -> Result<bool, InfraError> {
        Ok(self
            .store
            .tables
            .lock()
            .unwrap()
            .replace_message(id, Message::reminder_sent))
    }

    async fn record_delivery(
        &self,
        _tx: &mut TxContext,
        id: &MessageId,
        deactivate: bool,
    ) -> Result<bool, InfraError> {
        Ok(self
            .store
            .tables
            .lock()
            .unwrap()
            .replace_message(id, |m| m.delivery_sent(deactivate)))
    }
}

// ===== MockReceiverRepository =====

#[derive(Clone, Default)]
pub struct MockReceiverRepository {
    store: MockStore,
}

impl MockReceiverRepository {
    pub fn new(store: MockStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ReceiverRepository for MockReceiverRepository {
    async fn insert(&self, _tx: &mut TxContext, receiver: &Receiver) -> Result<(), InfraError> {
        self.store.add_receiver(receiver.clone());
        Ok(())
    }

    async fn find_by_message(
        &self,
        _tx: &mut TxContext,
        message_id: &MessageId,
    ) -> Result<Vec<Receiver>, InfraError> {
        let mut receivers = self.store.receivers_of(message_id);
        receivers.sort_by(|a, b| a.email_receiver().cmp(b.email_receiver()));
        Ok(receivers)
    }

    async fn delete(
        &self,
        _tx: &mut TxContext,
        message_id: &MessageId,
        email: &EmailAddress,
    ) -> Result<(), InfraError> {
        self.store
            .tables
            .lock()
            .unwrap()
            .receivers
            .retain(|r| !(r.message_id() == message_id && r.email_receiver() == email));
        Ok(())
    }

    async fn unsubscribe(
        &self,
        _tx: &mut TxContext,
        message_id: &MessageId,
        secret: &Secret,
    ) -> Result<bool, InfraError> {
        let mut tables = self.store.tables.lock().unwrap();
        let mut found = false;
        tables.receivers = std::mem::take(&mut tables.receivers)
            .into_iter()
            .map(|r| {
                if r.message_id() == message_id && r.unsubscribe_secret() == secret {
                    found = true;
                    r.unsubscribed()
                } else {
                    r
                }
            })
            .collect();
        Ok(found)
    }
}

// ===== MockEmailRepository =====

#[derive(Clone, Default)]
pub struct MockEmailRepository {
    store: MockStore,
}

impl MockEmailRepository {
    pub fn new(store: MockStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl EmailRepository for MockEmailRepository {
    async fn insert_if_absent(
        &self,
        _tx: &mut TxContext,
        email: &EmailAddress,
        now: DateTime<Utc>,
    ) -> Result<(), InfraError> {
        let mut tables = self.store.tables.lock().unwrap();
        if !tables.emails.iter().any(|e| e.email() == email) {
            tables
                .emails
                .push(EmailReputation::first_seen(email.clone(), now));
        }
        Ok(())
    }

    async fn find(
        &self,
        _tx: &mut TxContext,
        email: &EmailAddress,
    ) -> Result<Option<EmailReputation>, InfraError> {
        Ok(self.store.email(email))
    }

    async fn find_many(
        &self,
        _tx: &mut TxContext,
        emails: &[EmailAddress],
    ) -> Result<Vec<EmailReputation>, InfraError> {
        let tables = self.store.tables.lock().unwrap();
        Ok(tables
            .emails
            .iter()
            .filter(|e| emails.contains(e.email()))
            .cloned()
            .collect())
    }

    async fn deactivate(
        &self,
        _tx: &mut TxContext,
        email: &EmailAddress,
        now: DateTime<Utc>,
    ) -> Result<(), InfraError> {
        let mut tables = self.store.tables.lock().unwrap();
        match tables.emails.iter().position(|e| e.email() == email) {
            Some(index) => {
                let reputation = tables.emails.remove(index);
                tables.emails.insert(index, reputation.downgraded());
            }
            None => tables
                .emails
                .push(EmailReputation::from_db(email.clone(), false, now)),
        }
        Ok(())
    }
}

// ===== SequentialSecretGenerator =====

/// 連番からシークレットを作る決定的な生成器
#[derive(Default)]
pub struct SequentialSecretGenerator {
    counter: AtomicU64,
}

impl SequentialSecretGenerator {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SecretGenerator for SequentialSecretGenerator {
    fn generate(&self) -> Secret {
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        Secret::from_db(format!("{n:069}"))
    }
}
