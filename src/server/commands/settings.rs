//! Access-settings commands on a named path.

use bson::{doc, Document};

use crate::error::Result;

use super::{
    require_node_access, require_node_modify, require_root_access, require_root_modify,
    resolve_drive, resolve_node, want_str, want_str_list, want_u8, CommandContext,
};

pub async fn get_settings(ctx: &mut CommandContext<'_, '_>) -> Result<Document> {
    let drive = resolve_drive(ctx).await?;
    require_root_access(&drive, &ctx.principal).await?;
    let path = want_str(&ctx.args, "path")?;
    require_node_access(&drive, &path, &ctx.principal).await?;
    let node = resolve_node(&drive, &path).await?;
    Ok(doc! { "settings": node.settings().await.to_document() })
}

pub async fn set_settings(ctx: &mut CommandContext<'_, '_>) -> Result<Document> {
    let drive = resolve_drive(ctx).await?;
    require_root_modify(&drive, &ctx.principal).await?;
    let path = want_str(&ctx.args, "path")?;
    require_node_modify(&drive, &path, &ctx.principal).await?;
    let settings_doc = ctx
        .args
        .get_document("settings")
        .map_err(|_| crate::error::Error::MalformedRequest("missing settings".into()))?;
    let settings = crate::access::AccessSettings::from_document(settings_doc)?;

    let node = resolve_node(&drive, &path).await?;
    node.mutate_settings(&ctx.principal.username, |current| {
        *current = settings;
        Ok(())
    })
    .await?;
    drive.set_dirty(true).await;
    Ok(Document::new())
}

pub async fn set_clearances(ctx: &mut CommandContext<'_, '_>) -> Result<Document> {
    let drive = resolve_drive(ctx).await?;
    require_root_modify(&drive, &ctx.principal).await?;
    let path = want_str(&ctx.args, "path")?;
    require_node_modify(&drive, &path, &ctx.principal).await?;
    let access = want_u8(&ctx.args, "access")?;
    let modify = want_u8(&ctx.args, "modify")?;

    let node = resolve_node(&drive, &path).await?;
    node.mutate_settings(&ctx.principal.username, |settings| {
        settings.set_clearances(access, modify)
    })
    .await?;
    drive.set_dirty(true).await;
    Ok(Document::new())
}

/// Which of the four lists a list-mutation command targets.
#[derive(Copy, Clone)]
pub enum ListTarget {
    AccessWhitelist,
    AccessBlacklist,
    ModifyWhitelist,
    ModifyBlacklist,
}

/// Shared body of the eight `addto*`/`removefrom*` commands.
pub async fn mutate_list(
    ctx: &mut CommandContext<'_, '_>,
    target: ListTarget,
    add: bool,
) -> Result<Document> {
    let drive = resolve_drive(ctx).await?;
    require_root_modify(&drive, &ctx.principal).await?;
    let path = want_str(&ctx.args, "path")?;
    require_node_modify(&drive, &path, &ctx.principal).await?;
    let users = want_str_list(&ctx.args, "users")?;

    let node = resolve_node(&drive, &path).await?;
    node.mutate_settings(&ctx.principal.username, |settings| {
        match (target, add) {
            (ListTarget::AccessWhitelist, true) => settings.add_users_access_whitelist(&users),
            (ListTarget::AccessWhitelist, false) => {
                settings.remove_users_access_whitelist(&users)
            }
            (ListTarget::AccessBlacklist, true) => settings.add_users_access_blacklist(&users),
            (ListTarget::AccessBlacklist, false) => {
                settings.remove_users_access_blacklist(&users)
            }
            (ListTarget::ModifyWhitelist, true) => settings.add_users_modify_whitelist(&users),
            (ListTarget::ModifyWhitelist, false) => {
                settings.remove_users_modify_whitelist(&users)
            }
            (ListTarget::ModifyBlacklist, true) => settings.add_users_modify_blacklist(&users),
            (ListTarget::ModifyBlacklist, false) => {
                settings.remove_users_modify_blacklist(&users)
            }
        }
        Ok(())
    })
    .await?;
    drive.set_dirty(true).await;
    Ok(Document::new())
}
