//! メッセージテストビルダー
//!
//! 固定時刻、共有の暗号器とシークレット生成器、インメモリのモックストアで
//! ユースケースを組み立て、前提となるメッセージを投入する。

use std::{sync::Arc, time::Duration as StdDuration};

use chrono::{DateTime, Duration, TimeZone, Utc};
use warisin_domain::{
    clock::{Clock, FixedClock, start_of_day},
    email::EmailAddress,
    mail::MailAddress,
    message::{
        Deadlines,
        InactivePeriodDays,
        Message,
        MessageId,
        NewMessage,
        ReminderIntervalDays,
    },
    policy::{DeliveryPolicy, ReceiverPolicy},
    receiver::Receiver,
};
use warisin_infra::{
    AesGcmCipher,
    ContentCipher,
    MailDispatcher,
    SecretGenerator,
    VendorSlot,
    mock::{
        MockEmailRepository,
        MockMessageRepository,
        MockReceiverRepository,
        MockStore,
        MockTransactionManager,
        SequentialSecretGenerator,
    },
};

use super::StubVendor;
use crate::{
    app_builder::build_app,
    handler::{MessageState, SchedulerState},
    middleware::StaticSecretState,
    usecase::{MailComposer, MessageUseCaseImpl, Repositories, SchedulerUseCaseImpl},
};

/// テスト用の暗号鍵
const TEST_KEY: [u8; 32] = [7; 32];

/// テスト用の公開 URL
pub const TEST_BASE_URL: &str = "https://warisin.test";

/// テスト用のスケジューラー呼び出しシークレット
pub const TEST_STATIC_SECRET: &str = "scheduler-secret-for-tests";

/// メッセージユースケースのセットアップ
pub struct MessageTestSetup {
    pub sut:   MessageUseCaseImpl,
    pub store: MockStore,
}

/// スケジューラユースケースのセットアップ
pub struct SchedulerTestSetup {
    pub sut:   SchedulerUseCaseImpl,
    pub store: MockStore,
}

/// ルーターのセットアップ
pub struct RouterTestSetup {
    pub router: axum::Router,
    pub store:  MockStore,
}

/// メッセージテストビルダー
///
/// クローンしたビルダーは暗号器とシークレット生成器を共有する。
/// 投入したメッセージの本文はユースケースから復号でき、シークレットは重複しない。
///
/// ```ignore
/// let builder = MessageTestBuilder::new();
/// let setup = builder.build_message_usecase();
/// let message = builder.seed_message(&setup.store, "creator@example.com", &["a@example.com"]);
/// ```
#[derive(Clone)]
pub struct MessageTestBuilder {
    now:             DateTime<Utc>,
    receiver_policy: ReceiverPolicy,
    delivery_policy: DeliveryPolicy,
    cipher:          Arc<AesGcmCipher>,
    secrets:         Arc<SequentialSecretGenerator>,
}

impl Default for MessageTestBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageTestBuilder {
    /// 投入するメッセージの本文
    pub const CONTENT: &str = "今までありがとう";

    pub fn new() -> Self {
        Self {
            now:             Utc.with_ymd_and_hms(2026, 3, 1, 9, 30, 0).unwrap(),
            receiver_policy: ReceiverPolicy::default(),
            delivery_policy: DeliveryPolicy::default(),
            cipher:          Arc::new(AesGcmCipher::new(&TEST_KEY).unwrap()),
            secrets:         Arc::new(SequentialSecretGenerator::new()),
        }
    }

    /// 現在時刻を指定
    pub fn with_now(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    pub fn with_receiver_policy(mut self, policy: ReceiverPolicy) -> Self {
        self.receiver_policy = policy;
        self
    }

    pub fn with_delivery_policy(mut self, policy: DeliveryPolicy) -> Self {
        self.delivery_policy = policy;
        self
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    /// UTC の当日 0 時
    pub fn today(&self) -> DateTime<Utc> {
        start_of_day(self.now)
    }

    pub fn cipher(&self) -> Arc<dyn ContentCipher> {
        self.cipher.clone()
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::new(FixedClock::new(self.now))
    }

    pub fn composer(&self) -> Arc<MailComposer> {
        Arc::new(
            MailComposer::new(
                MailAddress::new("noreply@warisin.test", "Warisin Service"),
                TEST_BASE_URL,
            )
            .unwrap(),
        )
    }

    /// モックストアを共有するリポジトリ群
    pub fn repositories(&self, store: &MockStore) -> Repositories {
        Repositories {
            tx_manager: Arc::new(MockTransactionManager),
            messages:   Arc::new(MockMessageRepository::new(store.clone())),
            receivers:  Arc::new(MockReceiverRepository::new(store.clone())),
            emails:     Arc::new(MockEmailRepository::new(store.clone())),
        }
    }

    pub fn build_message_usecase(&self) -> MessageTestSetup {
        self.build_message_usecase_with_store(MockStore::new())
    }

    pub fn build_message_usecase_with_store(&self, store: MockStore) -> MessageTestSetup {
        let sut = MessageUseCaseImpl::new(
            self.repositories(&store),
            self.cipher(),
            self.secrets.clone(),
            self.clock(),
            self.receiver_policy,
        );
        MessageTestSetup { sut, store }
    }

    /// ベンダー 1 つでスケジューラユースケースを組み立てる
    pub fn build_scheduler_usecase(&self, vendor: Arc<StubVendor>) -> SchedulerTestSetup {
        let store = MockStore::new();
        let sut = self.scheduler_usecase(
            self.repositories(&store),
            vec![VendorSlot::new(vendor, 100)],
        );
        SchedulerTestSetup { sut, store }
    }

    pub fn scheduler_usecase(
        &self,
        repos: Repositories,
        vendors: Vec<VendorSlot>,
    ) -> SchedulerUseCaseImpl {
        SchedulerUseCaseImpl::new(
            repos,
            self.cipher(),
            Arc::new(MailDispatcher::new(vendors, StdDuration::from_secs(5))),
            self.composer(),
            self.clock(),
            self.delivery_policy,
        )
    }

    /// モックストアを共有するメッセージ・スケジューラーでルーターを組み立てる
    pub fn build_router(&self, vendor: Arc<StubVendor>) -> RouterTestSetup {
        let store = MockStore::new();
        let message_state = Arc::new(MessageState {
            usecase: self.build_message_usecase_with_store(store.clone()).sut,
        });
        let scheduler_state = Arc::new(SchedulerState {
            usecase: self.scheduler_usecase(
                self.repositories(&store),
                vec![VendorSlot::new(vendor, 100)],
            ),
        });
        let router = build_app(
            message_state,
            scheduler_state,
            StaticSecretState::new(TEST_STATIC_SECRET),
        );
        RouterTestSetup { router, store }
    }

    // ===== 前提データの投入 =====

    /// 作成直後のメッセージ（期限は当日 0 時 + 30 日 / 15 日）
    pub fn seed_message<T: AsRef<str>>(
        &self,
        store: &MockStore,
        creator: &str,
        receivers: &[T],
    ) -> Message {
        let content = self.cipher.encrypt(Self::CONTENT).unwrap();
        self.seed(store, creator, receivers, content, None)
    }

    pub fn seed_message_with_deadlines<T: AsRef<str>>(
        &self,
        store: &MockStore,
        creator: &str,
        receivers: &[T],
        deadlines: Deadlines,
    ) -> Message {
        let content = self.cipher.encrypt(Self::CONTENT).unwrap();
        self.seed(store, creator, receivers, content, Some(deadlines))
    }

    /// 保存形式の本文をそのまま指定する
    pub fn seed_message_with_content<T: AsRef<str>>(
        &self,
        store: &MockStore,
        creator: &str,
        receivers: &[T],
        content_encrypted: &str,
    ) -> Message {
        self.seed(store, creator, receivers, content_encrypted.to_string(), None)
    }

    /// リマインダー待ちのメッセージ
    pub fn seed_reminder_due_message<T: AsRef<str>>(
        &self,
        store: &MockStore,
        creator: &str,
        receivers: &[T],
    ) -> Message {
        self.seed_message_with_deadlines(store, creator, receivers, self.reminder_due())
    }

    /// 配信期限を過ぎたメッセージ
    pub fn seed_overdue_message<T: AsRef<str>>(
        &self,
        store: &MockStore,
        creator: &str,
        receivers: &[T],
    ) -> Message {
        self.seed_message_with_deadlines(store, creator, receivers, self.overdue())
    }

    pub fn seed_overdue_message_with_content<T: AsRef<str>>(
        &self,
        store: &MockStore,
        creator: &str,
        receivers: &[T],
        content_encrypted: &str,
    ) -> Message {
        let deadlines = self.overdue();
        self.seed(
            store,
            creator,
            receivers,
            content_encrypted.to_string(),
            Some(deadlines),
        )
    }

    /// 受信者を配信停止にする
    pub fn unsubscribe(&self, store: &MockStore, message: &Message, address: &str) {
        store.unsubscribe(message.id(), &addr(address));
    }

    fn reminder_due(&self) -> Deadlines {
        Deadlines {
            inactive_at:      self.today() + Duration::days(10),
            next_reminder_at: self.today(),
        }
    }

    fn overdue(&self) -> Deadlines {
        Deadlines {
            inactive_at:      self.today() - Duration::days(1),
            next_reminder_at: self.today() - Duration::days(16),
        }
    }

    /// 台帳には登録しない
    fn seed<T: AsRef<str>>(
        &self,
        store: &MockStore,
        creator: &str,
        receivers: &[T],
        content_encrypted: String,
        deadlines: Option<Deadlines>,
    ) -> Message {
        let message = Message::new(NewMessage {
            id: MessageId::new(),
            email_creator: addr(creator),
            content_encrypted,
            inactive_period_days: InactivePeriodDays::new(30).unwrap(),
            reminder_interval_days: ReminderIntervalDays::new(15).unwrap(),
            extension_secret: self.secrets.generate(),
            deadlines,
            now: self.now,
        });
        store.add_message(message.clone());
        for receiver in receivers {
            store.add_receiver(Receiver::new(
                message.id().clone(),
                addr(receiver.as_ref()),
                self.secrets.generate(),
            ));
        }
        message
    }
}

/// テスト用のアドレス
pub fn addr(value: &str) -> EmailAddress {
    EmailAddress::new(value).unwrap()
}

pub fn addrs(values: &[&str]) -> Vec<EmailAddress> {
    values.iter().copied().map(addr).collect()
}
