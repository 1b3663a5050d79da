//! Authentication context consumed by the catalog client
//!
//! Credential *acquisition* (the interactive browser login) lives outside
//! this crate; callers hand in a cookie set, a `p_skey`, and an account
//! number, and the request-signing token is derived here. A missing or
//! incomplete context fails fast with [`Error::Authentication`] before any
//! network call is made.

use crate::error::{Error, Result};

/// Browser user agent presented to the remote service
pub(crate) const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

/// Opaque credential context for the remote service
#[derive(Clone, Debug)]
pub struct AuthContext {
    cookies: String,
    uin: String,
    g_tk: u32,
}

impl AuthContext {
    /// Build a context from its raw parts, deriving the signing token
    ///
    /// Fails with [`Error::Authentication`] when any part is empty.
    pub fn new(
        cookies: impl Into<String>,
        p_skey: impl Into<String>,
        uin: impl Into<String>,
    ) -> Result<Self> {
        let cookies = cookies.into();
        let p_skey = p_skey.into();
        let uin = uin.into();
        if cookies.is_empty() || p_skey.is_empty() || uin.is_empty() {
            return Err(Error::Authentication(
                "cookies, p_skey and uin are all required".into(),
            ));
        }
        Ok(Self {
            cookies,
            uin,
            g_tk: derive_g_tk(&p_skey),
        })
    }

    /// Build a context from the `QQ_COOKIES`, `QQ_P_SKEY` and `QQ_UIN`
    /// environment variables
    pub fn from_env() -> Result<Self> {
        let get = |key: &str| {
            std::env::var(key)
                .map_err(|_| Error::Authentication(format!("environment variable {key} not set")))
        };
        Self::new(get("QQ_COOKIES")?, get("QQ_P_SKEY")?, get("QQ_UIN")?)
    }

    /// The request-signing token sent as the `g_tk` parameter
    pub fn g_tk(&self) -> u32 {
        self.g_tk
    }

    /// The account number the credentials belong to
    pub fn uin(&self) -> &str {
        &self.uin
    }

    /// Header set the remote service expects on every request
    pub fn headers(&self) -> Vec<(&'static str, String)> {
        vec![
            ("Cookie", self.cookies.clone()),
            ("User-Agent", USER_AGENT.to_string()),
            ("Referer", "https://h5.qzone.qq.com/".to_string()),
            (
                "Accept",
                "application/json, text/javascript, */*; q=0.01".to_string(),
            ),
        ]
    }
}

/// Derive the `g_tk` signing token from a `p_skey`
///
/// The service's web client hashes the key with a DJB-style loop over
/// 32-bit integers; the arithmetic here wraps at 32 bits to match it.
fn derive_g_tk(p_skey: &str) -> u32 {
    let mut hash: u32 = 5381;
    for byte in p_skey.bytes() {
        hash = hash
            .wrapping_add(hash.wrapping_shl(5))
            .wrapping_add(u32::from(byte));
    }
    hash & 0x7fff_ffff
}
