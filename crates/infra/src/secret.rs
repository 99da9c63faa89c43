//! # ケイパビリティトークンの生成
//!
//! 延長用・配信停止用シークレットを生成する。
//! メール内のリンクにそのまま埋め込むため、URL セーフな文字だけを使う。

use rand::Rng;
use warisin_domain::secret::{SECRET_LENGTH, Secret};

/// URL セーフな文字集合
const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-_";

/// シークレット生成 trait
///
/// テストでは決定的な実装に差し替える。
pub trait SecretGenerator: Send + Sync {
    fn generate(&self) -> Secret;
}

/// OS の乱数源を使う実装
pub struct RandomSecretGenerator;

impl SecretGenerator for RandomSecretGenerator {
    fn generate(&self) -> Secret {
        let mut rng = rand::rng();
        let value: String = (0..SECRET_LENGTH)
            .map(|_| {
                let idx = rng.random_range(0..CHARSET.len());
                CHARSET[idx] as char
            })
            .collect();
        Secret::from_db(value)
    }
}
