//! Field-level encryption for values stored at rest.
//!
//! Tokens use the Fernet format: `0x80 || timestamp || iv || ciphertext ||
//! hmac`, URL-safe base64 encoded. The 32-byte key splits into an HMAC-SHA256
//! signing half and an AES-128-CBC encryption half, so values written by any
//! Fernet implementation under the same key read back here. Every decrypt
//! failure (wrong key, truncated token, tampering) surfaces as
//! [`CipherError::Forbidden`].

use aes::Aes128;
use base64::{
    engine::general_purpose::{STANDARD, URL_SAFE},
    Engine as _,
};
use cbc::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use hmac::{Hmac, Mac};
use rand::{rngs::OsRng, RngCore};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;
type Aes128CbcEnc = cbc::Encryptor<Aes128>;
type Aes128CbcDec = cbc::Decryptor<Aes128>;

const KEY_LEN: usize = 32;
const HALF_KEY_LEN: usize = 16;
const VERSION: u8 = 0x80;
const IV_LEN: usize = 16;
/// Version byte, big-endian timestamp, IV.
const HEADER_LEN: usize = 1 + 8 + IV_LEN;
const BLOCK_LEN: usize = 16;
const TAG_LEN: usize = 32;

/// Error type for field encryption.
#[derive(Debug, thiserror::Error)]
pub enum CipherError {
    #[error("Encryption key must be 32 bytes of base64, got {0} bytes")]
    InvalidKey(usize),
    #[error("Encryption key is not valid base64")]
    KeyEncoding,
    #[error("Encryption failed")]
    Encrypt,
    /// The token could not be authenticated under this key.
    #[error("Forbidden")]
    Forbidden,
    #[error("Decrypted value is not a valid {0}")]
    InvalidValue(&'static str),
}

/// Result type for field encryption.
pub type CipherResult<T> = Result<T, CipherError>;

/// Symmetric cipher for individual record fields.
pub struct FieldCipher {
    signing_key: [u8; HALF_KEY_LEN],
    encryption_key: [u8; HALF_KEY_LEN],
}

impl FieldCipher {
    /// Build a cipher from raw key material.
    pub fn new(key: &[u8]) -> CipherResult<Self> {
        if key.len() != KEY_LEN {
            return Err(CipherError::InvalidKey(key.len()));
        }
        let (signing, encryption) = key.split_at(HALF_KEY_LEN);
        Ok(Self {
            signing_key: signing.try_into().map_err(|_| CipherError::InvalidKey(key.len()))?,
            encryption_key: encryption
                .try_into()
                .map_err(|_| CipherError::InvalidKey(key.len()))?,
        })
    }

    /// Build a cipher from a base64 key, as stored in `ENCRYPTION_KEY`.
    /// Fernet keys are URL-safe; the standard alphabet is accepted too.
    pub fn from_base64_key(key: &str) -> CipherResult<Self> {
        let key = key.trim();
        let raw = URL_SAFE
            .decode(key)
            .or_else(|_| STANDARD.decode(key))
            .map_err(|_| CipherError::KeyEncoding)?;
        Self::new(&raw)
    }

    /// Generate a fresh random key, URL-safe base64 encoded.
    pub fn generate_key() -> String {
        let mut key = [0u8; KEY_LEN];
        OsRng.fill_bytes(&mut key);
        URL_SAFE.encode(key)
    }

    fn mac(&self, data: &[u8]) -> CipherResult<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(&self.signing_key).map_err(|_| CipherError::Encrypt)?;
        mac.update(data);
        Ok(mac)
    }

    fn seal(&self, plaintext: &[u8], timestamp: u64, iv: &[u8; IV_LEN]) -> CipherResult<String> {
        let ciphertext = Aes128CbcEnc::new_from_slices(&self.encryption_key, iv)
            .map_err(|_| CipherError::Encrypt)?
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext);

        let mut token = Vec::with_capacity(HEADER_LEN + ciphertext.len() + TAG_LEN);
        token.push(VERSION);
        token.extend_from_slice(&timestamp.to_be_bytes());
        token.extend_from_slice(iv);
        token.extend_from_slice(&ciphertext);

        let tag = self.mac(&token)?.finalize().into_bytes();
        token.extend_from_slice(&tag);
        Ok(URL_SAFE.encode(token))
    }

    /// Encrypt a string.
    pub fn encrypt_str(&self, data: &str) -> CipherResult<String> {
        let mut iv = [0u8; IV_LEN];
        OsRng.fill_bytes(&mut iv);
        let timestamp = u64::try_from(Utc::now().timestamp()).unwrap_or(0);
        self.seal(data.as_bytes(), timestamp, &iv)
    }

    /// Decrypt a string. Token age is not checked.
    pub fn decrypt_str(&self, token: &str) -> CipherResult<String> {
        let token = URL_SAFE
            .decode(token.as_bytes())
            .map_err(|_| CipherError::Forbidden)?;
        if token.len() < HEADER_LEN + BLOCK_LEN + TAG_LEN || token[0] != VERSION {
            return Err(CipherError::Forbidden);
        }

        let (signed, tag) = token.split_at(token.len() - TAG_LEN);
        self.mac(signed)?
            .verify_slice(tag)
            .map_err(|_| CipherError::Forbidden)?;

        let iv = &signed[1 + 8..HEADER_LEN];
        let ciphertext = &signed[HEADER_LEN..];
        if ciphertext.len() % BLOCK_LEN != 0 {
            return Err(CipherError::Forbidden);
        }

        let plaintext = Aes128CbcDec::new_from_slices(&self.encryption_key, iv)
            .map_err(|_| CipherError::Forbidden)?
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
            .map_err(|_| CipherError::Forbidden)?;

        String::from_utf8(plaintext).map_err(|_| CipherError::InvalidValue("string"))
    }

    /// Encrypt a boolean as `"True"` or `"False"`.
    pub fn encrypt_bool(&self, data: bool) -> CipherResult<String> {
        self.encrypt_str(if data { "True" } else { "False" })
    }

    /// Decrypt a boolean. Anything other than `"True"` reads as false.
    pub fn decrypt_bool(&self, token: &str) -> CipherResult<bool> {
        Ok(self.decrypt_str(token)? == "True")
    }

    /// Encrypt a timestamp in RFC 3339 form.
    pub fn encrypt_datetime(&self, dt: &DateTime<Utc>) -> CipherResult<String> {
        self.encrypt_str(&dt.to_rfc3339())
    }

    /// Decrypt a timestamp. Offset-less values are read as UTC.
    pub fn decrypt_datetime(&self, token: &str) -> CipherResult<DateTime<Utc>> {
        let text = self.decrypt_str(token)?;
        if let Ok(dt) = DateTime::parse_from_rfc3339(&text) {
            return Ok(dt.with_timezone(&Utc));
        }
        text.parse::<NaiveDateTime>()
            .map(|naive| Utc.from_utc_datetime(&naive))
            .map_err(|_| CipherError::InvalidValue("datetime"))
    }

    /// Encrypt a calendar date as `YYYY-MM-DD`.
    pub fn encrypt_date(&self, date: &NaiveDate) -> CipherResult<String> {
        self.encrypt_str(&date.format("%Y-%m-%d").to_string())
    }

    pub fn decrypt_date(&self, token: &str) -> CipherResult<NaiveDate> {
        self.decrypt_str(token)?
            .parse::<NaiveDate>()
            .map_err(|_| CipherError::InvalidValue("date"))
    }

    /// Encrypt a wall-clock time as `HH:MM:SS[.fraction]`.
    pub fn encrypt_time(&self, time: &NaiveTime) -> CipherResult<String> {
        self.encrypt_str(&time.to_string())
    }

    pub fn decrypt_time(&self, token: &str) -> CipherResult<NaiveTime> {
        self.decrypt_str(token)?
            .parse::<NaiveTime>()
            .map_err(|_| CipherError::InvalidValue("time"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Reference Fernet token for "hello", written at 1985-10-26T08:20:00Z
    /// with IV 0x00..0x0f.
    const REFERENCE_KEY: &str = "cw_0x689RpI-jtRR7oE8h_eQsKImvJapLeSbXpwF4e4=";
    const REFERENCE_TOKEN: &str = "gAAAAAAdwJ6wAAECAwQFBgcICQoLDA0ODy021cpGVWKZ_eEwCGM4BLLF_5CV9dOPmrhuVUPgJobwOz7JcbmrR64jVmpU4IwqDA==";
    const REFERENCE_TIMESTAMP: u64 = 499_162_800;

    fn cipher() -> FieldCipher {
        FieldCipher::from_base64_key(&FieldCipher::generate_key()).unwrap()
    }

    fn reference_iv() -> [u8; IV_LEN] {
        std::array::from_fn(|i| i as u8)
    }

    #[test]
    fn reads_tokens_from_other_fernet_implementations() {
        let cipher = FieldCipher::from_base64_key(REFERENCE_KEY).unwrap();
        assert_eq!(cipher.decrypt_str(REFERENCE_TOKEN).unwrap(), "hello");

        let token = "gAAAAABlU_EA8Ch77mWNc2rSkxjp_y9tq8TGrXiBNk8_FMCC4HHtZ_hLsWjZ6yNqHsa-bI0h4TYOQefsOnnDQPCaP67SCL6Lkg==";
        let cipher = FieldCipher::from_base64_key("q-Jh0x_3s1xkV8bWq4n0m7zZr5yT2uL6pA9eC1dF-g8=").unwrap();
        assert!(cipher.decrypt_bool(token).unwrap());
    }

    #[test]
    fn writes_the_reference_token_layout() {
        let cipher = FieldCipher::from_base64_key(REFERENCE_KEY).unwrap();
        let token = cipher
            .seal(b"hello", REFERENCE_TIMESTAMP, &reference_iv())
            .unwrap();
        assert_eq!(token, REFERENCE_TOKEN);
    }

    #[test]
    fn generated_keys_are_url_safe() {
        for _ in 0..32 {
            let key = FieldCipher::generate_key();
            assert_eq!(key.len(), 44);
            assert!(!key.contains('+') && !key.contains('/'));
            FieldCipher::from_base64_key(&key).unwrap();
        }
    }

    #[test]
    fn standard_alphabet_keys_are_accepted() {
        let key = STANDARD.encode([0xfbu8; KEY_LEN]);
        assert!(key.contains('+') || key.contains('/'));
        FieldCipher::from_base64_key(&key).unwrap();
    }

    #[test]
    fn string_survives_encryption() {
        let cipher = cipher();
        let token = cipher.encrypt_str("Lagos, Ikeja").unwrap();

        assert_ne!(token, "Lagos, Ikeja");
        assert!(token.starts_with("gAAAAA"));
        assert_eq!(cipher.decrypt_str(&token).unwrap(), "Lagos, Ikeja");
    }

    #[test]
    fn same_plaintext_yields_distinct_tokens() {
        let cipher = cipher();
        let a = cipher.encrypt_str("alias").unwrap();
        let b = cipher.encrypt_str("alias").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn foreign_key_is_forbidden() {
        let token = cipher().encrypt_str("secret").unwrap();
        let err = cipher().decrypt_str(&token).unwrap_err();
        assert!(matches!(err, CipherError::Forbidden));
    }

    #[test]
    fn tampered_or_garbage_tokens_are_forbidden() {
        let cipher = cipher();
        let token = cipher.encrypt_str("secret").unwrap();

        let mut raw = URL_SAFE.decode(&token).unwrap();
        raw[HEADER_LEN] ^= 0x01;
        let tampered = URL_SAFE.encode(&raw);

        raw[HEADER_LEN] ^= 0x01;
        raw[0] = 0x81;
        let wrong_version = URL_SAFE.encode(&raw);

        assert!(matches!(cipher.decrypt_str(&tampered), Err(CipherError::Forbidden)));
        assert!(matches!(cipher.decrypt_str(&wrong_version), Err(CipherError::Forbidden)));
        assert!(matches!(cipher.decrypt_str("not base64!"), Err(CipherError::Forbidden)));
        assert!(matches!(cipher.decrypt_str("AAAA"), Err(CipherError::Forbidden)));
    }

    #[test]
    fn booleans_use_capitalized_text() {
        let cipher = cipher();
        let yes = cipher.encrypt_bool(true).unwrap();
        let no = cipher.encrypt_bool(false).unwrap();

        assert_eq!(cipher.decrypt_str(&yes).unwrap(), "True");
        assert!(cipher.decrypt_bool(&yes).unwrap());
        assert!(!cipher.decrypt_bool(&no).unwrap());

        let other = cipher.encrypt_str("true").unwrap();
        assert!(!cipher.decrypt_bool(&other).unwrap());
    }

    #[test]
    fn temporal_values_decrypt_to_the_same_instant() {
        let cipher = cipher();

        let dt = Utc.with_ymd_and_hms(2024, 2, 29, 13, 45, 10).unwrap();
        let token = cipher.encrypt_datetime(&dt).unwrap();
        assert_eq!(cipher.decrypt_datetime(&token).unwrap(), dt);

        let date = NaiveDate::from_ymd_opt(1990, 7, 14).unwrap();
        let token = cipher.encrypt_date(&date).unwrap();
        assert_eq!(cipher.decrypt_str(&token).unwrap(), "1990-07-14");
        assert_eq!(cipher.decrypt_date(&token).unwrap(), date);

        let time = NaiveTime::from_hms_opt(8, 30, 0).unwrap();
        let token = cipher.encrypt_time(&time).unwrap();
        assert_eq!(cipher.decrypt_time(&token).unwrap(), time);
    }

    #[test]
    fn naive_datetime_text_reads_as_utc() {
        let cipher = cipher();
        let token = cipher.encrypt_str("2023-11-05T09:00:00").unwrap();
        let expected = Utc.with_ymd_and_hms(2023, 11, 5, 9, 0, 0).unwrap();
        assert_eq!(cipher.decrypt_datetime(&token).unwrap(), expected);
    }

    #[test]
    fn unparseable_payload_is_an_invalid_value() {
        let cipher = cipher();
        let token = cipher.encrypt_str("yesterday").unwrap();
        assert!(matches!(
            cipher.decrypt_date(&token),
            Err(CipherError::InvalidValue("date"))
        ));
    }

    #[test]
    fn rejects_short_keys() {
        let short = URL_SAFE.encode([7u8; 16]);
        assert!(matches!(
            FieldCipher::from_base64_key(&short),
            Err(CipherError::InvalidKey(16))
        ));
        assert!(matches!(
            FieldCipher::from_base64_key("%%%"),
            Err(CipherError::KeyEncoding)
        ));
    }
}
