//! # メッセージ本文の暗号化
//!
//! AES-256-GCM で本文を暗号化して保存する。
//!
//! ## 保存形式
//!
//! ```text
//! hex(nonce) "." base64(ciphertext || tag)
//! ```
//!
//! `aes.utf8:` で始まる本文はクライアント側で暗号化済みのため、
//! 暗号化・復号のどちらでもそのまま通す。

use aes_gcm::{
    Aes256Gcm,
    Nonce,
    aead::{Aead, KeyInit, OsRng, rand_core::RngCore},
};
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use warisin_domain::message::CLIENT_ENCRYPTED_MARKER;

use crate::error::InfraError;

/// 鍵長（AES-256）
pub const KEY_SIZE: usize = 32;

/// AES-GCM の nonce 長（96 bit）
const NONCE_SIZE: usize = 12;

/// 本文の暗号化・復号
///
/// ユースケース層は `Arc<dyn ContentCipher>` として保持する。
pub trait ContentCipher: Send + Sync {
    /// 平文を保存形式に変換する
    fn encrypt(&self, plaintext: &str) -> Result<String, InfraError>;

    /// 保存形式を平文に戻す
    fn decrypt(&self, stored: &str) -> Result<String, InfraError>;
}

/// AES-256-GCM による実装
pub struct AesGcmCipher {
    cipher: Aes256Gcm,
}

impl AesGcmCipher {
    /// 32 バイトの鍵から作成する
    ///
    /// # エラー
    ///
    /// 鍵長が 32 バイトでない場合は `InfraErrorKind::Encryption` を返す。
    pub fn new(key: &[u8]) -> Result<Self, InfraError> {
        if key.len() != KEY_SIZE {
            return Err(InfraError::encryption(format!(
                "暗号鍵は {KEY_SIZE} バイトである必要があります（{} バイト）",
                key.len()
            )));
        }
        let cipher = Aes256Gcm::new_from_slice(key)
            .map_err(|e| InfraError::encryption(format!("暗号鍵が不正です: {e}")))?;
        Ok(Self { cipher })
    }
}

impl ContentCipher for AesGcmCipher {
    fn encrypt(&self, plaintext: &str) -> Result<String, InfraError> {
        if plaintext.starts_with(CLIENT_ENCRYPTED_MARKER) {
            return Ok(plaintext.to_string());
        }

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|e| InfraError::encryption(format!("AES-GCM 暗号化に失敗: {e}")))?;

        Ok(format!(
            "{}.{}",
            hex::encode(nonce_bytes),
            BASE64.encode(ciphertext)
        ))
    }

    fn decrypt(&self, stored: &str) -> Result<String, InfraError> {
        if stored.starts_with(CLIENT_ENCRYPTED_MARKER) {
            return Ok(stored.to_string());
        }

        let Some((nonce_hex, ciphertext_b64)) = stored.split_once('.') else {
            return Err(InfraError::encryption(
                "保存形式が不正です（区切り文字がありません）",
            ));
        };

        let nonce_bytes = hex::decode(nonce_hex)
            .map_err(|e| InfraError::encryption(format!("nonce の hex が不正です: {e}")))?;
        if nonce_bytes.len() != NONCE_SIZE {
            return Err(InfraError::encryption(format!(
                "nonce 長が不正です: {} バイト",
                nonce_bytes.len()
            )));
        }
        let ciphertext = BASE64
            .decode(ciphertext_b64)
            .map_err(|e| InfraError::encryption(format!("暗号文の base64 が不正です: {e}")))?;

        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(&nonce_bytes), ciphertext.as_slice())
            .map_err(|e| {
                InfraError::encryption(format!("AES-GCM 復号に失敗（鍵の不一致か改ざん）: {e}"))
            })?;

        String::from_utf8(plaintext)
            .map_err(|e| InfraError::encryption(format!("復号結果が UTF-8 ではありません: {e}")))
    }
}
