//! # Testament Service サーバー
//!
//! 一定期間操作のない作成者に代わって、遺言メッセージを受信者に届けるサービス。
//!
//! ## 役割
//!
//! - **メッセージ管理**: 作成者による作成・更新・削除・一覧取得
//! - **ケイパビリティ操作**: メール内リンクからの延長・配信停止
//! - **スケジューラー**: 外部トリガーからのリマインダー・遺言の送信
//!
//! ## アーキテクチャ
//!
//! ```text
//! ┌──────────────┐     ┌───────────────────┐     ┌──────────────┐
//! │ Frontend /   │────▶│ Testament Service │────▶│  PostgreSQL  │
//! │ cron trigger │     │                   │     └──────────────┘
//! └──────────────┘     └───────────────────┘
//!                                │
//!                                ▼
//!                      ┌───────────────────┐
//!                      │ Mailjet / SendGrid│
//!                      │ / SMTP            │
//!                      └───────────────────┘
//! ```
//!
//! ## 環境変数
//!
//! | 変数名 | 必須 | 説明 |
//! |--------|------|------|
//! | `SERVICE_HOST` | No | バインドアドレス（デフォルト: `0.0.0.0`） |
//! | `SERVICE_PORT` | **Yes** | ポート番号 |
//! | `DATABASE_URL` | **Yes** | PostgreSQL 接続 URL |
//! | `ENCRYPTION_KEY` | **Yes** | 本文暗号化の鍵（32 バイト） |
//! | `STATIC_SECRET` | **Yes** | スケジューラー呼び出し用の共有シークレット |
//! | `MAIL_FROM_ADDRESS` | **Yes** | 送信元メールアドレス |
//! | `PUBLIC_BASE_URL` | **Yes** | メール内リンクのベース URL |
//! | `MAIL_NOOP` | No | `true` で送信せずログ出力のみ |
//!
//! ## 起動方法
//!
//! ```bash
//! cargo run -p warisin-testament-service
//! ```

use std::{net::SocketAddr, sync::Arc};

use anyhow::Context as _;
use tokio::net::TcpListener;
use warisin_domain::{clock::SystemClock, mail::MailAddress};
use warisin_infra::{
    AesGcmCipher,
    MailDispatcher,
    PgTransactionManager,
    RandomSecretGenerator,
    VendorSlot,
    db,
    mail::{MailjetVendor, NoopVendor, SendgridVendor, SmtpVendor},
    repository::{PostgresEmailRepository, PostgresMessageRepository, PostgresReceiverRepository},
};
use warisin_shared::observability::{TracingConfig, init_tracing};
use warisin_testament_service::{
    app_builder::build_app,
    config::{MailConfig, ServiceConfig},
    handler::{MessageState, SchedulerState},
    middleware::StaticSecretState,
    usecase::{MailComposer, MessageUseCaseImpl, Repositories, SchedulerUseCaseImpl},
};

/// Testament Service サーバーのエントリーポイント
///
/// 以下の順序で初期化を行う:
///
/// 1. 環境変数の読み込み（.env ファイル）
/// 2. トレーシングの初期化
/// 3. アプリケーション設定の読み込み
/// 4. データベース接続とマイグレーション
/// 5. 依存関係の組み立てとルーターの構築
/// 6. HTTP サーバーの起動
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env ファイルを読み込む（存在する場合）
    dotenvy::dotenv().ok();

    let tracing_config = TracingConfig::from_env("testament-service");
    init_tracing(tracing_config);
    let _tracing_guard = tracing::info_span!("app", service = "testament-service").entered();

    let config = ServiceConfig::from_env().context("設定の読み込みに失敗しました")?;

    tracing::info!(
        "Testament Service サーバーを起動します: {}:{}",
        config.host,
        config.port
    );

    let pool = db::create_pool(&config.database_url)
        .await
        .context("データベースへの接続に失敗しました")?;
    db::run_migrations(&pool)
        .await
        .context("マイグレーションの実行に失敗しました")?;

    let repos = Repositories {
        tx_manager: Arc::new(PgTransactionManager::new(pool)),
        messages:   Arc::new(PostgresMessageRepository::new()),
        receivers:  Arc::new(PostgresReceiverRepository::new()),
        emails:     Arc::new(PostgresEmailRepository::new()),
    };
    let cipher = Arc::new(
        AesGcmCipher::new(config.encryption_key.as_bytes())
            .context("暗号化鍵の読み込みに失敗しました")?,
    );
    let clock = Arc::new(SystemClock);

    let dispatcher = Arc::new(MailDispatcher::new(
        vendor_slots(&config.mail),
        config.mail.vendor_timeout,
    ));
    if !dispatcher.has_available_vendor() {
        tracing::warn!("認証情報を持つメールベンダーがありません。送信はすべて失敗します");
    }
    let composer = Arc::new(
        MailComposer::new(
            MailAddress::new(&config.mail.from_address, &config.mail.from_name),
            &config.mail.public_base_url,
        )
        .context("メールテンプレートの読み込みに失敗しました")?,
    );

    let message_state = Arc::new(MessageState {
        usecase: MessageUseCaseImpl::new(
            repos.clone(),
            cipher.clone(),
            Arc::new(RandomSecretGenerator),
            clock.clone(),
            config.receiver_policy,
        ),
    });
    let scheduler_state = Arc::new(SchedulerState {
        usecase: SchedulerUseCaseImpl::new(
            repos,
            cipher,
            dispatcher,
            composer,
            clock,
            config.delivery_policy,
        ),
    });

    let app = build_app(
        message_state,
        scheduler_state,
        StaticSecretState::new(config.static_secret.as_str()),
    );

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("バインドアドレスが不正です")?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("{addr} へのバインドに失敗しました"))?;
    tracing::info!("Testament Service サーバーが起動しました: {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// 設定からベンダーの配分枠を組み立てる
///
/// `MAIL_NOOP=true` の場合は Noop ベンダーだけを使う。
fn vendor_slots(mail: &MailConfig) -> Vec<VendorSlot> {
    if mail.noop {
        tracing::warn!("MAIL_NOOP が有効です。メールは送信されません");
        return vec![VendorSlot::new(Arc::new(NoopVendor), u32::MAX)];
    }

    let mut slots = vec![
        VendorSlot::new(
            Arc::new(MailjetVendor::new(
                &mail.mailjet_api_key,
                &mail.mailjet_secret_key,
                mail.sandbox_mode,
            )),
            mail.mailjet_daily_limit,
        ),
        VendorSlot::new(
            Arc::new(SendgridVendor::new(&mail.sendgrid_api_key, mail.sandbox_mode)),
            mail.sendgrid_daily_limit,
        ),
    ];
    if let Some(host) = &mail.smtp_host {
        slots.push(VendorSlot::new(
            Arc::new(SmtpVendor::new(host, mail.smtp_port)),
            mail.smtp_daily_limit,
        ));
    }
    slots
}
