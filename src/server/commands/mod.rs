//! Command implementations and their shared helpers.
//!
//! Every command receives a [`CommandContext`]: the server handle, the
//! resolved principal, the BSON argument map and the connection's chunk
//! handler. Commands return the response data map; failures surface as
//! [`crate::error::Error`] and become the response status.

pub mod admin;
pub mod core;
pub mod fs;
pub mod settings;
pub mod transfer;

use std::sync::Arc;

use bson::{Bson, Document};

use crate::access::AccessSettings;
use crate::auth::Principal;
use crate::drive::node::{Directory, File};
use crate::drive::Drive;
use crate::error::{Error, Result};
use crate::path::{clean_path, split_parent};
use crate::server::Server;
use crate::wire::chunk::ChunkHandler;

/// Everything a command body needs.
pub struct CommandContext<'a, 'b> {
    pub server: Arc<Server>,
    pub principal: Principal,
    pub args: Document,
    pub chunks: &'a mut ChunkHandler<'b>,
}

fn missing(key: &str) -> Error {
    Error::MalformedRequest(format!("missing or invalid argument {key:?}"))
}

pub(crate) fn want_str(args: &Document, key: &str) -> Result<String> {
    args.get_str(key).map(str::to_owned).map_err(|_| missing(key))
}

pub(crate) fn want_str_list(args: &Document, key: &str) -> Result<Vec<String>> {
    let array = args.get_array(key).map_err(|_| missing(key))?;
    array
        .iter()
        .map(|item| match item {
            Bson::String(s) => Ok(s.clone()),
            _ => Err(missing(key)),
        })
        .collect()
}

pub(crate) fn want_i64_list(args: &Document, key: &str) -> Result<Vec<i64>> {
    let array = args.get_array(key).map_err(|_| missing(key))?;
    array
        .iter()
        .map(|item| match item {
            Bson::Int32(n) => Ok(*n as i64),
            Bson::Int64(n) => Ok(*n),
            _ => Err(missing(key)),
        })
        .collect()
}

pub(crate) fn want_bool_list(args: &Document, key: &str) -> Result<Vec<bool>> {
    let array = args.get_array(key).map_err(|_| missing(key))?;
    array
        .iter()
        .map(|item| match item {
            Bson::Boolean(b) => Ok(*b),
            _ => Err(missing(key)),
        })
        .collect()
}

pub(crate) fn opt_bool(args: &Document, key: &str, default: bool) -> Result<bool> {
    match args.get(key) {
        None => Ok(default),
        Some(Bson::Boolean(b)) => Ok(*b),
        Some(_) => Err(missing(key)),
    }
}

pub(crate) fn opt_i64(args: &Document, key: &str) -> Result<Option<i64>> {
    match args.get(key) {
        None => Ok(None),
        Some(Bson::Int32(n)) => Ok(Some(*n as i64)),
        Some(Bson::Int64(n)) => Ok(Some(*n)),
        Some(_) => Err(missing(key)),
    }
}

pub(crate) fn want_u8(args: &Document, key: &str) -> Result<u8> {
    match args.get(key) {
        Some(Bson::Int32(n)) => u8::try_from(*n).map_err(|_| missing(key)),
        Some(Bson::Int64(n)) => u8::try_from(*n).map_err(|_| missing(key)),
        _ => Err(missing(key)),
    }
}

pub(crate) fn opt_settings(args: &Document, key: &str) -> Result<Option<AccessSettings>> {
    match args.get(key) {
        None => Ok(None),
        Some(Bson::Document(doc)) => Ok(Some(AccessSettings::from_document(doc)?)),
        Some(_) => Err(missing(key)),
    }
}

pub(crate) fn opt_settings_list(
    args: &Document,
    key: &str,
) -> Result<Option<Vec<AccessSettings>>> {
    match args.get(key) {
        None => Ok(None),
        Some(Bson::Array(items)) => {
            let mut list = Vec::with_capacity(items.len());
            for item in items {
                match item {
                    Bson::Document(doc) => list.push(AccessSettings::from_document(doc)?),
                    _ => return Err(missing(key)),
                }
            }
            Ok(Some(list))
        }
        Some(_) => Err(missing(key)),
    }
}

/// Resolves the drive named by the request's `drive` argument.
pub(crate) async fn resolve_drive(ctx: &CommandContext<'_, '_>) -> Result<Arc<Drive>> {
    let name = want_str(&ctx.args, "drive")?;
    ctx.server.get_drive(&name).await
}

/// A resolved tree node of either kind.
pub(crate) enum NodeRef {
    Dir(Arc<Directory>),
    File(Arc<File>),
}

/// Resolves a path to its node; directories win name collisions the tree
/// itself forbids.
pub(crate) async fn resolve_node(drive: &Drive, path: &str) -> Result<NodeRef> {
    match drive.dir_by_path(path).await {
        Ok(dir) => Ok(NodeRef::Dir(dir)),
        Err(Error::PathNotFound(_)) => Ok(NodeRef::File(drive.file_by_path(path).await?)),
        Err(err) => Err(err),
    }
}

impl NodeRef {
    pub(crate) async fn settings(&self) -> AccessSettings {
        match self {
            NodeRef::Dir(dir) => dir.settings().await,
            NodeRef::File(file) => file.settings().await,
        }
    }

    /// Mutates the node's settings under its write lock, annotating the
    /// editor.
    pub(crate) async fn mutate_settings(
        &self,
        editor: &str,
        apply: impl FnOnce(&mut AccessSettings) -> Result<()>,
    ) -> Result<()> {
        match self {
            NodeRef::Dir(dir) => {
                let mut guard = dir.write().await;
                apply(guard.settings_mut())?;
                guard.touch(editor);
            }
            NodeRef::File(file) => {
                let mut guard = file.write().await;
                apply(guard.settings_mut())?;
                guard.touch(editor);
            }
        }
        Ok(())
    }
}

pub(crate) async fn require_root_access(drive: &Drive, principal: &Principal) -> Result<()> {
    let settings = drive.root().settings().await;
    if !settings.can_access(&principal.username, principal.clearance) {
        return Err(Error::InsufficientClearance);
    }
    Ok(())
}

pub(crate) async fn require_root_modify(drive: &Drive, principal: &Principal) -> Result<()> {
    let settings = drive.root().settings().await;
    if !settings.can_modify(&principal.username, principal.clearance) {
        return Err(Error::InsufficientClearance);
    }
    Ok(())
}

pub(crate) async fn require_node_access(
    drive: &Drive,
    path: &str,
    principal: &Principal,
) -> Result<()> {
    let node = resolve_node(drive, path).await?;
    if !node.settings().await.can_access(&principal.username, principal.clearance) {
        return Err(Error::InsufficientClearance);
    }
    Ok(())
}

pub(crate) async fn require_node_modify(
    drive: &Drive,
    path: &str,
    principal: &Principal,
) -> Result<()> {
    let node = resolve_node(drive, path).await?;
    if !node.settings().await.can_modify(&principal.username, principal.clearance) {
        return Err(Error::InsufficientClearance);
    }
    Ok(())
}

/// Modify check on the immediate parent of a path about to be created.
pub(crate) async fn require_parent_modify(
    drive: &Drive,
    path: &str,
    principal: &Principal,
) -> Result<()> {
    let cleaned = clean_path(path)?;
    if cleaned.is_empty() {
        return Err(Error::EmptyPath);
    }
    let (parent_path, _) = split_parent(&cleaned);
    let parent = drive.dir_by_path(&parent_path).await?;
    if !parent.settings().await.can_modify(&principal.username, principal.clearance) {
        return Err(Error::InsufficientClearance);
    }
    Ok(())
}
