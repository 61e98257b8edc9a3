//! QR token claims and wire encoding.

use alloy::signers::Signature;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::settlement::MonthId;

/// Type tag carried in every QR token.
pub const TOKEN_TYPE: &str = "qr-session";

/// Capability required to pass the scope gate at verification.
pub const VERIFY_SCOPE: &str = "verify:gec";

/// Errors from token encoding, decoding, and signature handling.
#[derive(Debug, Error)]
pub enum TokenError {
    /// Claims could not be serialized or deserialized.
    #[error("token serialization: {0}")]
    Serialize(#[from] serde_json::Error),

    /// The wire form is not valid base64.
    #[error("token is not valid base64")]
    Base64,

    /// The signature bytes are malformed.
    #[error("malformed token signature")]
    SignatureFormat,
}

/// Lookup references carried by a token.
///
/// These identify WHAT to verify, never prove it: the consumption fact
/// is re-derived on-chain at verification time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRefs {
    #[serde(rename = "consumerId")]
    pub consumer_id: String,
    /// Hex of the ERC-1155 unit token id for the month.
    #[serde(rename = "tokenId")]
    pub token_id: String,
    #[serde(rename = "monthId")]
    pub month_id: MonthId,
    /// Last settlement/anchor transaction reference, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx: Option<String>,
}

/// Claims of a QR verification token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QrToken {
    /// Issuer identity.
    pub iss: String,
    /// Intended audience (the verifying gateway).
    pub aud: String,
    /// Type tag, always [`TOKEN_TYPE`].
    pub typ: String,
    /// Single-use random value, hex with 0x prefix.
    pub nonce: String,
    /// Expiry, unix seconds.
    pub exp: u64,
    /// Granted capabilities.
    pub scope: Vec<String>,
    /// Lookup references.
    pub refs: TokenRefs,
    /// Display path for the client, e.g. "/verify?qr=...".
    pub redirect: String,
}

impl QrToken {
    /// Canonical bytes covered by the issuer signature.
    pub fn signing_bytes(&self) -> Result<Vec<u8>, TokenError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn is_expired(&self, now: u64) -> bool {
        self.exp <= now
    }

    pub fn has_scope(&self, capability: &str) -> bool {
        self.scope.iter().any(|s| s == capability)
    }
}

/// A token plus its issuer signature, as carried inside the QR code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedToken {
    pub claims: QrToken,
    /// 65-byte secp256k1 signature over the claims JSON, hex encoded.
    pub sig: String,
}

impl SignedToken {
    /// Encode for QR transport: base64 of the signed-token JSON.
    pub fn encode(&self) -> Result<String, TokenError> {
        let json = serde_json::to_vec(self)?;
        Ok(URL_SAFE_NO_PAD.encode(json))
    }

    /// Decode the QR wire form.
    pub fn decode(encoded: &str) -> Result<Self, TokenError> {
        let json = URL_SAFE_NO_PAD
            .decode(encoded.trim())
            .map_err(|_| TokenError::Base64)?;
        Ok(serde_json::from_slice(&json)?)
    }

    /// Parse the signature bytes.
    pub fn signature(&self) -> Result<Signature, TokenError> {
        let hex_str = self.sig.strip_prefix("0x").unwrap_or(&self.sig);
        let bytes = hex::decode(hex_str).map_err(|_| TokenError::SignatureFormat)?;
        Signature::try_from(bytes.as_slice()).map_err(|_| TokenError::SignatureFormat)
    }
}
