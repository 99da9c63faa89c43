//! # ミドルウェア
//!
//! Testament Service 用のミドルウェアを提供する。

mod static_secret;

pub use static_secret::{STATIC_SECRET_HEADER, StaticSecretState, require_static_secret};
