//! Core commands: `ping`, `info`, `login`, `logout`.

use std::time::Duration;

use bson::spec::BinarySubtype;
use bson::{doc, Binary, Bson, Document};

use crate::error::{Error, Result};
use crate::SERVER_VERSION;

use super::{opt_i64, CommandContext};

/// Liveness probe; succeeds for any auth including null.
pub async fn ping(_ctx: &mut CommandContext<'_, '_>) -> Result<Document> {
    Ok(Document::new())
}

/// Server metadata: name, version, drives and session policy.
pub async fn info(ctx: &mut CommandContext<'_, '_>) -> Result<Document> {
    let config = ctx.server.config().read().await;
    let drives: Vec<Bson> = ctx
        .server
        .drive_names()
        .await
        .into_iter()
        .map(Bson::String)
        .collect();
    Ok(doc! {
        "name": config.name.clone(),
        "version": SERVER_VERSION,
        "drives": drives,
        "sessionexpiration": config.default_session_expiration.as_secs() as i64,
        "allowchangesessionexpiration": config.allow_change_session_expiration,
        "allownonexpiringsessions": config.allow_non_expiring_sessions,
    })
}

/// Mints a session for the authenticated user and returns its 16-byte ID.
///
/// The requested `sessionexpiration` (seconds; zero = non-expiring) is
/// honored only when the configuration allows changing it; a zero
/// expiration is rejected when non-expiring sessions are disallowed.
pub async fn login(ctx: &mut CommandContext<'_, '_>) -> Result<Document> {
    let (default_expiration, allow_change, allow_non_expiring, cap) = {
        let config = ctx.server.config().read().await;
        (
            config.default_session_expiration,
            config.allow_change_session_expiration,
            config.allow_non_expiring_sessions,
            config.per_user_session_limit as usize,
        )
    };

    let expire_after = match opt_i64(&ctx.args, "sessionexpiration")? {
        Some(secs) if allow_change => {
            if secs < 0 {
                return Err(Error::MalformedRequest("negative session expiration".into()));
            }
            Duration::from_secs(secs as u64)
        }
        _ => default_expiration,
    };
    if expire_after.is_zero() && !allow_non_expiring {
        return Err(Error::NonExpiringSessionDisallowed);
    }

    let session = ctx
        .server
        .sessions()
        .create(&ctx.principal.username, expire_after, cap)
        .await?;
    let id = session.id().await;
    Ok(doc! {
        "id": Bson::Binary(Binary {
            subtype: BinarySubtype::Generic,
            bytes: id.as_bytes().to_vec(),
        }),
    })
}

/// Removes the authenticated session.
pub async fn logout(ctx: &mut CommandContext<'_, '_>) -> Result<Document> {
    let id = ctx.principal.session_id.ok_or(Error::InvalidAuth)?;
    ctx.server.sessions().remove(id).await?;
    Ok(Document::new())
}
