//! # テストユーティリティ
//!
//! ユースケーステストとルーターテストで共有するビルダーとスタブ。

mod message_test_builder;
mod stub_vendor;

pub use message_test_builder::{
    MessageTestBuilder,
    MessageTestSetup,
    RouterTestSetup,
    SchedulerTestSetup,
    TEST_BASE_URL,
    TEST_STATIC_SECRET,
    addr,
    addrs,
};
pub use stub_vendor::StubVendor;
