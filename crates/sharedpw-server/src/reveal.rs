//! Retrieval of deposited secrets.
//!
//! A reveal either probes for existence (`consume = false`) or hands the
//! payload out and destroys the record (`consume = true`). The payload is only
//! returned after the store confirms the record was removed by this call.

use std::net::IpAddr;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::error::{Result, ShareError};
use crate::store::StoreGateway;

/// Length of every identifier handed out by the record manager.
pub const ID_LEN: usize = 16;

/// What a reveal hands back to the caller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Revealed {
    /// Base64 payload. Empty unless the secret was consumed.
    pub secret: String,
    pub exists: bool,
    pub has_password: bool,
    pub hint: String,
    pub tag: String,
    pub iv: String,
    pub pw_tag: String,
    pub pw_iv: String,
}

/// Reject identifiers that cannot have come from the generator, before any
/// store round trip.
pub fn validate_id(id: &str) -> Result<()> {
    if id.len() != ID_LEN || id.chars().any(disallowed) {
        return Err(ShareError::InvalidIdentifier);
    }
    Ok(())
}

// Non-alphanumerics, g-z, and every uppercase letter.
fn disallowed(c: char) -> bool {
    !c.is_ascii_alphanumeric() || matches!(c, 'g'..='z' | 'A'..='Z')
}

/// Look up `id` on behalf of `requester`.
///
/// With `consume` unset this only reports whether the secret exists. With
/// `consume` set the payload is decoded, the record is removed, and only then
/// is the payload returned.
pub fn reveal(
    gateway: &dyn StoreGateway,
    id: &str,
    requester: IpAddr,
    consume: bool,
) -> Result<Revealed> {
    validate_id(id)?;

    let found = gateway.query(id)?;
    let Some(secret) = found.into_iter().next() else {
        return Err(ShareError::NotFound);
    };

    if !secret.origin_ip.is_empty() && secret.origin_ip != requester.to_string() {
        debug!(%requester, "origin mismatch");
        return Err(ShareError::NotFound);
    }

    if !consume {
        return Ok(Revealed {
            exists: secret.id == id,
            ..Revealed::default()
        });
    }

    let decoded = STANDARD
        .decode(secret.payload.as_bytes())
        .map_err(|e| ShareError::Decode(e.to_string()))?;
    if decoded.is_empty() {
        return Err(ShareError::Decode("payload decoded to zero bytes".into()));
    }

    // Nothing is disclosed unless this call is the one that removed the record.
    let taken = match gateway.take(id) {
        Ok(Some(taken)) => taken,
        Ok(None) => {
            debug!("secret consumed by a concurrent reveal");
            return Err(ShareError::NotFound);
        }
        Err(e) => {
            error!(error = %e, "delete revealed secret");
            return Err(e.into());
        }
    };

    Ok(Revealed {
        secret: taken.payload.clone(),
        exists: true,
        has_password: taken.has_password,
        hint: taken.hint.clone(),
        tag: taken.tag.clone(),
        iv: taken.iv.clone(),
        pw_tag: taken.pw_tag.clone(),
        pw_iv: taken.pw_iv.clone(),
    })
}
