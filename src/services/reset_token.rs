use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use time::OffsetDateTime;

use crate::error::AppError;

type HmacSha256 = Hmac<Sha256>;

/// 署名シークレットの最小長（バイト）。128ビット未満の鍵は拒否する
const MIN_SECRET_LEN: usize = 16;

/// トークンに埋め込むクレーム
///
/// ペイロードはこの構造体のJSONバイト列そのもので、HMACはその
/// バイト列全体を対象に計算する。
#[derive(Debug, Serialize, Deserialize)]
struct ResetTokenClaims {
    /// 対象ユーザーID
    sub: i64,
    /// 発行時刻（unix秒）
    iat: i64,
}

/// パスワードリセットトークンサービス
///
/// `issue` / `verify` はどちらも純粋な計算のみで、I/Oも共有可変状態も
/// 持たない。シークレットと有効期間は構築時に固定される。
///
/// # Security
/// - トークンはステートレス。サーバー側で失効させる仕組みはないため、
///   有効期限内のトークンは何度でも検証に成功する
/// - 検証失敗の理由（形式不正・署名不一致・期限切れ）は区別せず、
///   すべて `AppError::TokenInvalid` として返す
/// - このモジュールはログを出力しない（トークンは資格情報のため）
#[derive(Clone)]
pub struct ResetTokenService {
    secret: Vec<u8>,
    max_age_secs: i64,
}

impl ResetTokenService {
    /// 新しい ResetTokenService を作成
    ///
    /// # Arguments
    /// * `secret` - HMAC署名用シークレット（16バイト以上）
    /// * `max_age_secs` - トークンの有効期間（秒、正の値）
    pub fn new(secret: &str, max_age_secs: i64) -> Result<Self, AppError> {
        if secret.len() < MIN_SECRET_LEN {
            return Err(AppError::Internal(anyhow::anyhow!(
                "reset token secret must be at least {} bytes",
                MIN_SECRET_LEN
            )));
        }
        if max_age_secs <= 0 {
            return Err(AppError::Internal(anyhow::anyhow!(
                "reset token max age must be positive"
            )));
        }

        Ok(Self {
            secret: secret.as_bytes().to_vec(),
            max_age_secs,
        })
    }

    /// トークンを発行（現在時刻基準）
    pub fn issue(&self, subject_id: i64) -> Result<String, AppError> {
        self.issue_at(subject_id, OffsetDateTime::now_utc().unix_timestamp())
    }

    /// 発行時刻を指定してトークンを発行
    ///
    /// フォーマット: `base64url(payload) "." base64url(hmac_sha256_tag)`
    /// （パディングなし。URLに埋め込める文字のみ）
    pub fn issue_at(&self, subject_id: i64, issued_at: i64) -> Result<String, AppError> {
        let payload = serde_json::to_vec(&ResetTokenClaims {
            sub: subject_id,
            iat: issued_at,
        })?;
        let tag = self.sign(&payload)?;

        Ok(format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(&payload),
            URL_SAFE_NO_PAD.encode(tag)
        ))
    }

    /// トークンを検証し、対象ユーザーIDを返す（現在時刻基準）
    pub fn verify(&self, token: &str) -> Result<i64, AppError> {
        self.verify_at(token, OffsetDateTime::now_utc().unix_timestamp())
    }

    /// 検証時刻を指定してトークンを検証
    ///
    /// 署名検証を通過し、かつ `iat <= now <= iat + max_age` の範囲内で
    /// あれば対象ユーザーIDを返す。入力は攻撃者が自由に与えられる前提で、
    /// どのような文字列に対してもpanicしない。
    pub fn verify_at(&self, token: &str, now: i64) -> Result<i64, AppError> {
        self.decode(token, now).ok_or(AppError::TokenInvalid)
    }

    /// 検証の実体。失敗理由は呼び出し側に区別させない
    fn decode(&self, token: &str, now: i64) -> Option<i64> {
        let (payload_b64, tag_b64) = token.split_once('.')?;
        let payload = URL_SAFE_NO_PAD.decode(payload_b64).ok()?;
        let tag = URL_SAFE_NO_PAD.decode(tag_b64).ok()?;

        // 署名検証（verify_slice は定数時間比較）。ペイロードの解釈は
        // 署名検証を通過してから行う
        let mut mac = HmacSha256::new_from_slice(&self.secret).ok()?;
        mac.update(&payload);
        mac.verify_slice(&tag).ok()?;

        let claims: ResetTokenClaims = serde_json::from_slice(&payload).ok()?;

        // 有効期間チェック: [iat, iat + max_age]
        if claims.iat > now {
            return None;
        }
        // 極端な iat で減算がオーバーフローするケースも無効扱い
        let age = now.checked_sub(claims.iat)?;
        if age > self.max_age_secs {
            return None;
        }

        Some(claims.sub)
    }

    /// ペイロードのHMAC-SHA256タグを計算
    fn sign(&self, payload: &[u8]) -> Result<Vec<u8>, AppError> {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|_| AppError::Internal(anyhow::anyhow!("invalid hmac key length")))?;
        mac.update(payload);
        Ok(mac.finalize().into_bytes().to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    const NOW: i64 = 1_700_000_000;
    const SECRET: &str = "test-secret-key-please-32-bytes!";
    const MAX_AGE: i64 = 1800;

    fn service() -> ResetTokenService {
        ResetTokenService::new(SECRET, MAX_AGE).expect("valid config")
    }

    #[test]
    fn test_issue_and_verify_roundtrip() {
        let service = service();
        let token = service.issue_at(42, NOW).expect("issue");
        assert_eq!(service.verify_at(&token, NOW).expect("verify"), 42);
    }

    #[test]
    fn test_verify_rejects_other_secret() {
        let service = service();
        let other = ResetTokenService::new("another-secret-key-32-bytes-long", MAX_AGE)
            .expect("valid config");
        let token = service.issue_at(42, NOW).expect("issue");
        assert!(matches!(
            other.verify_at(&token, NOW),
            Err(AppError::TokenInvalid)
        ));
    }

    #[test]
    fn test_verify_time_window() {
        let service = service();
        let token = service.issue_at(42, NOW).expect("issue");

        // 発行直後と期限直前は有効
        assert_eq!(service.verify_at(&token, NOW).expect("verify"), 42);
        assert_eq!(
            service.verify_at(&token, NOW + MAX_AGE - 1).expect("verify"),
            42
        );
        // 期限ちょうどは有効（閉区間）
        assert_eq!(
            service.verify_at(&token, NOW + MAX_AGE).expect("verify"),
            42
        );
        // 期限超過は無効
        assert!(matches!(
            service.verify_at(&token, NOW + MAX_AGE + 1),
            Err(AppError::TokenInvalid)
        ));
    }

    #[test]
    fn test_verify_rejects_future_issued_at() {
        let service = service();
        let token = service.issue_at(42, NOW + 60).expect("issue");
        assert!(matches!(
            service.verify_at(&token, NOW),
            Err(AppError::TokenInvalid)
        ));
    }

    #[test]
    fn test_verify_rejects_malformed_input() {
        let service = service();
        let token = service.issue_at(42, NOW).expect("issue");

        let truncated = &token[..token.len() / 2];
        let cases = [
            "",
            "garbage",
            "not.base64url.at-all",
            "カタカナ.トークン",
            truncated,
            ".",
            "..",
        ];
        for case in cases {
            assert!(
                matches!(service.verify_at(case, NOW), Err(AppError::TokenInvalid)),
                "expected TokenInvalid for {case:?}"
            );
        }
    }

    #[test]
    fn test_verify_rejects_signature_bit_flips() {
        let service = service();
        let token = service.issue_at(42, NOW).expect("issue");
        let (payload_b64, tag_b64) = token.split_once('.').expect("separator");
        let tag = URL_SAFE_NO_PAD.decode(tag_b64).expect("tag decodes");

        let mut rng = rand::thread_rng();
        for _ in 0..10_000 {
            let mut mutated = tag.clone();
            let byte = rng.gen_range(0..mutated.len());
            let bit = rng.gen_range(0..8u8);
            mutated[byte] ^= 1u8 << bit;

            let forged = format!("{}.{}", payload_b64, URL_SAFE_NO_PAD.encode(&mutated));
            assert!(matches!(
                service.verify_at(&forged, NOW),
                Err(AppError::TokenInvalid)
            ));
        }
    }

    #[test]
    fn test_verify_rejects_tampered_payload() {
        let service = service();
        let token = service.issue_at(42, NOW).expect("issue");
        let (_, tag_b64) = token.split_once('.').expect("separator");

        // 別ユーザーのペイロードに正規の署名を付け替えても通らない
        let forged_payload = serde_json::to_vec(&ResetTokenClaims { sub: 43, iat: NOW })
            .expect("serialize");
        let forged = format!("{}.{}", URL_SAFE_NO_PAD.encode(&forged_payload), tag_b64);
        assert!(matches!(
            service.verify_at(&forged, NOW),
            Err(AppError::TokenInvalid)
        ));
    }

    #[test]
    fn test_token_is_url_safe() {
        let service = service();
        let token = service.issue_at(i64::MAX, NOW).expect("issue");
        assert!(
            token
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        );
    }

    #[test]
    fn test_fixed_scenario() {
        // subject 42 / 有効期間 1800秒 / 発行時刻 1700000000
        let service = service();
        let token = service.issue_at(42, 1_700_000_000).expect("issue");

        assert_eq!(
            service.verify_at(&token, 1_700_000_000).expect("verify"),
            42
        );
        assert!(matches!(
            service.verify_at(&token, 1_700_001_801),
            Err(AppError::TokenInvalid)
        ));
    }

    #[test]
    fn test_verify_rejects_extreme_issued_at() {
        let service = service();
        let token = service.issue_at(42, i64::MIN).expect("issue");
        assert!(matches!(
            service.verify_at(&token, NOW),
            Err(AppError::TokenInvalid)
        ));
    }

    #[test]
    fn test_new_rejects_short_secret() {
        let result = ResetTokenService::new("short", MAX_AGE);
        assert!(result.is_err());
    }

    #[test]
    fn test_new_rejects_nonpositive_max_age() {
        assert!(ResetTokenService::new(SECRET, 0).is_err());
        assert!(ResetTokenService::new(SECRET, -1).is_err());
    }
}
