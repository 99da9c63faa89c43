//! # Testament Service ライブラリ
//!
//! 遺言メッセージの保存と、期限到来時のリマインダー・遺言配信を提供する。
//! ルーターテスト用に内部モジュールへのアクセスを提供する。

pub mod app_builder;
pub mod config;
pub mod error;
pub mod handler;
pub mod middleware;
pub mod usecase;

// テストユーティリティ（内部実装、ドキュメントからは隠す）
#[cfg(any(test, feature = "test-utils"))]
#[doc(hidden)]
pub mod test_utils;
