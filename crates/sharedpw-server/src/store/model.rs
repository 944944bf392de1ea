use std::time::{SystemTime, UNIX_EPOCH};

use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};
use zeroize::ZeroizeOnDrop;

use super::gateway::StoreGateway;
use crate::error::{Result, ShareError};

/// Upper bound on a caller-requested lifetime.
pub const MAX_LIFETIME_HOURS: i64 = 72;
/// Lifetime given to a freshly created record.
pub const DEFAULT_LIFETIME_HOURS: i64 = 72;
/// Fallback applied by `save` when no expiry was ever set.
pub const SAVE_FALLBACK_HOURS: i64 = 24;
/// Identifiers are this many random bytes, hex-encoded.
pub const ID_BYTES: usize = 8;

const SECONDS_PER_HOUR: i64 = 3600;

/// A deposited secret as it lives in the store.
///
/// `payload` is already encrypted and base64-encoded by the caller. `tag`,
/// `iv`, `pw_tag` and `pw_iv` belong to that encryption and are carried
/// through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ZeroizeOnDrop)]
#[serde(rename_all = "camelCase")]
pub struct Secret {
    /// Partition key.
    pub id: String,
    /// Unix timestamp (seconds) after which the store drops the record.
    pub expire_at: i64,
    /// Hours accepted by the last `set_timeout`, 0 if never called.
    pub lifetime_hours: i64,
    pub payload: String,
    /// When non-empty, only this requester address may read the record.
    pub origin_ip: String,
    pub has_password: bool,
    pub hint: String,
    pub tag: String,
    pub iv: String,
    pub pw_tag: String,
    pub pw_iv: String,
}

impl Secret {
    /// A new record with a fresh identifier, expiring 72 hours from now.
    pub fn new() -> Result<Self> {
        Self::new_with_rng(&mut OsRng)
    }

    pub fn new_with_rng<R: RngCore + ?Sized>(rng: &mut R) -> Result<Self> {
        Ok(Self {
            id: generate_id(rng)?,
            expire_at: now() + DEFAULT_LIFETIME_HOURS * SECONDS_PER_HOUR,
            lifetime_hours: 0,
            payload: String::new(),
            origin_ip: String::new(),
            has_password: false,
            hint: String::new(),
            tag: String::new(),
            iv: String::new(),
            pw_tag: String::new(),
            pw_iv: String::new(),
        })
    }

    /// Replace the identifier. On failure the old identifier is kept.
    pub fn new_id(&mut self) -> Result<()> {
        self.new_id_with_rng(&mut OsRng)
    }

    pub fn new_id_with_rng<R: RngCore + ?Sized>(&mut self, rng: &mut R) -> Result<()> {
        self.id = generate_id(rng)?;
        Ok(())
    }

    /// Set the expiry to `hours` from now. Accepts 1 through 72.
    pub fn set_timeout(&mut self, hours: i64) -> Result<()> {
        if !(1..=MAX_LIFETIME_HOURS).contains(&hours) {
            return Err(ShareError::InvalidDuration(hours));
        }
        self.lifetime_hours = hours;
        self.expire_at = now() + hours * SECONDS_PER_HOUR;
        Ok(())
    }

    /// Indented JSON of the whole record, for logs and debugging only.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Returns true once `expire_at` has been reached.
    pub fn is_expired(&self, now: i64) -> bool {
        now >= self.expire_at
    }

    /// Attach the encoded payload and persist the record with a single `put`.
    ///
    /// A record whose `expire_at` is still zero gets 24 hours. Records built
    /// with [`Secret::new`] already carry 72 hours and keep them.
    pub fn save(
        &mut self,
        gateway: &dyn StoreGateway,
        encoded_payload: impl Into<String>,
    ) -> Result<()> {
        if self.expire_at == 0 {
            self.expire_at = now() + SAVE_FALLBACK_HOURS * SECONDS_PER_HOUR;
        }
        self.payload = encoded_payload.into();

        if let Err(e) = gateway.put(self) {
            error!(error = %e, "save secret");
            return Err(e.into());
        }
        debug!(
            expire_at = self.expire_at,
            bound = !self.origin_ip.is_empty(),
            "stored secret"
        );
        Ok(())
    }
}

/// Draw `ID_BYTES` from `rng` and hex-encode them.
pub fn generate_id<R: RngCore + ?Sized>(rng: &mut R) -> Result<String> {
    let mut bytes = [0u8; ID_BYTES];
    rng.try_fill_bytes(&mut bytes)?;
    Ok(hex::encode(bytes))
}

pub(crate) fn now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}
