//! Administrator commands. The dispatcher has already verified the
//! principal's clearance before any of these run.

use std::sync::Arc;

use bson::{doc, Bson, Document};

use crate::access::AccessSettings;
use crate::auth::user::User;
use crate::drive::node::Directory;
use crate::drive::Drive;
use crate::error::{Error, Result};
use crate::server::config::Config;

use super::{want_str, want_u8, CommandContext};

pub async fn add_user(ctx: &mut CommandContext<'_, '_>) -> Result<Document> {
    let username = want_str(&ctx.args, "username")?;
    let password = want_str(&ctx.args, "password")?;
    let clearance = want_u8(&ctx.args, "clearance")?;
    let user = User::new(&username, &password, clearance)?;
    ctx.server.users().add(user).await?;
    Ok(Document::new())
}

pub async fn remove_user(ctx: &mut CommandContext<'_, '_>) -> Result<Document> {
    let username = want_str(&ctx.args, "username")?;
    ctx.server.users().remove(&username).await?;
    Ok(Document::new())
}

pub async fn list_users(ctx: &mut CommandContext<'_, '_>) -> Result<Document> {
    let mut users = Vec::new();
    for username in ctx.server.users().usernames().await {
        let user = ctx.server.users().get(&username).await?;
        users.push(Bson::Document(doc! {
            "username": username,
            "clearance": user.clearance().await as i32,
        }));
    }
    Ok(doc! { "users": users })
}

/// Registers a new empty drive: in-memory, in the config and as a drive
/// file on disk.
pub async fn add_drive(ctx: &mut CommandContext<'_, '_>) -> Result<Document> {
    let name = want_str(&ctx.args, "name")?;
    let host_path = want_str(&ctx.args, "hostpath")?;
    let drive_file = want_str(&ctx.args, "drivefile")?;
    Config::validate_drive_file_path(&drive_file)?;
    if !std::path::Path::new(&host_path).is_absolute() {
        return Err(Error::InvalidDriveFilePath(host_path));
    }

    let settings = AccessSettings::new(1, 1)?;
    let root = Directory::new_root(settings, &ctx.principal.username);
    let drive = Arc::new(Drive::new(name.clone(), host_path, root));
    drive.set_dirty(true).await;
    ctx.server.insert_drive(&name, drive, &drive_file).await?;
    ctx.server.save_drive(&name).await?;
    Ok(Document::new())
}

pub async fn remove_drive(ctx: &mut CommandContext<'_, '_>) -> Result<Document> {
    let name = want_str(&ctx.args, "name")?;
    ctx.server.remove_drive(&name).await?;
    Ok(Document::new())
}

pub async fn rename_drive(ctx: &mut CommandContext<'_, '_>) -> Result<Document> {
    let old_name = want_str(&ctx.args, "name")?;
    let new_name = want_str(&ctx.args, "newname")?;
    ctx.server.rename_drive(&old_name, &new_name).await?;
    Ok(Document::new())
}

pub async fn set_config(ctx: &mut CommandContext<'_, '_>) -> Result<Document> {
    let key = want_str(&ctx.args, "key")?;
    let value = want_str(&ctx.args, "value")?;
    ctx.server.config().write().await.set_key(&key, &value)?;
    Ok(Document::new())
}

pub async fn get_config(ctx: &mut CommandContext<'_, '_>) -> Result<Document> {
    let key = want_str(&ctx.args, "key")?;
    let value = ctx.server.config().read().await.get_key(&key)?;
    Ok(doc! { "value": value })
}
