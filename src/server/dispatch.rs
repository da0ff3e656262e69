//! The command registry and dispatcher.
//!
//! Every command documents its accepted auth modes and whether it is
//! admin-only; the dispatcher enforces both before the body runs. Drive
//! resolution and per-node access checks happen inside the command
//! bodies, which know which paths they touch.

use bson::Document;
use tracing::debug;

use crate::auth::AuthKind;
use crate::error::{Error, Result};
use crate::server::commands::settings::ListTarget;
use crate::server::commands::{admin, core, fs, settings, transfer, CommandContext};

/// Which authentication modes a command accepts.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AuthMode {
    /// Any request, including null auth.
    Any,
    /// User or session auth.
    Authenticated,
    /// User (password) auth only.
    UserOnly,
    /// Session auth only.
    SessionOnly,
}

/// Registry entry for one command.
#[derive(Debug, Copy, Clone)]
pub struct CommandSpec {
    pub auth: AuthMode,
    pub admin: bool,
}

const fn spec(auth: AuthMode, admin: bool) -> CommandSpec {
    CommandSpec { auth, admin }
}

/// Looks up a command's registry entry.
pub fn lookup(name: &str) -> Option<CommandSpec> {
    let entry = match name {
        "ping" => spec(AuthMode::Any, false),
        "info" => spec(AuthMode::Authenticated, false),
        "login" => spec(AuthMode::UserOnly, false),
        "logout" => spec(AuthMode::SessionOnly, false),

        "createdirs" | "createfiles" | "createdirstree" | "renamedirs" | "renamefiles"
        | "movedirs" | "movefiles" | "deletedirs" | "deletefiles" | "list" | "stat"
        | "readfiles" | "writefiles" | "rehash" | "verifyhashes" => {
            spec(AuthMode::Authenticated, false)
        }

        "getsettings" | "setsettings" | "setclearances" | "addtoaccesswhitelist"
        | "addtoaccessblacklist" | "addtomodifywhitelist" | "addtomodifyblacklist"
        | "removefromaccesswhitelist" | "removefromaccessblacklist"
        | "removefrommodifywhitelist" | "removefrommodifyblacklist" => {
            spec(AuthMode::Authenticated, false)
        }

        "adduser" | "removeuser" | "listusers" | "adddrive" | "removedrive"
        | "renamedrive" | "setconfig" | "getconfig" => spec(AuthMode::Authenticated, true),

        _ => return None,
    };
    Some(entry)
}

/// Checks the principal against the command's registry entry, then runs
/// the body.
pub async fn dispatch(ctx: &mut CommandContext<'_, '_>, name: &str) -> Result<Document> {
    let spec = lookup(name).ok_or_else(|| Error::UnknownCommand(name.to_owned()))?;

    let kind = ctx.principal.kind;
    let allowed = match spec.auth {
        AuthMode::Any => true,
        AuthMode::Authenticated => kind != AuthKind::Null,
        AuthMode::UserOnly => kind == AuthKind::User,
        AuthMode::SessionOnly => kind == AuthKind::Session,
    };
    if !allowed {
        return Err(Error::InvalidAuth);
    }
    if spec.admin && !ctx.principal.is_admin() {
        return Err(Error::InsufficientClearance);
    }

    debug!(command = name, principal = %ctx.principal.username, "dispatching");
    match name {
        "ping" => core::ping(ctx).await,
        "info" => core::info(ctx).await,
        "login" => core::login(ctx).await,
        "logout" => core::logout(ctx).await,

        "createdirs" => fs::create_dirs(ctx).await,
        "createfiles" => fs::create_files(ctx).await,
        "createdirstree" => fs::create_dirs_tree(ctx).await,
        "renamedirs" => fs::rename_dirs(ctx).await,
        "renamefiles" => fs::rename_files(ctx).await,
        "movedirs" => fs::move_dirs(ctx).await,
        "movefiles" => fs::move_files(ctx).await,
        "deletedirs" => fs::delete_dirs(ctx).await,
        "deletefiles" => fs::delete_files(ctx).await,
        "list" => fs::list(ctx).await,
        "stat" => fs::stat(ctx).await,
        "rehash" => fs::rehash(ctx).await,
        "verifyhashes" => fs::verify_hashes(ctx).await,

        "readfiles" => transfer::read_files(ctx).await,
        "writefiles" => transfer::write_files(ctx).await,

        "getsettings" => settings::get_settings(ctx).await,
        "setsettings" => settings::set_settings(ctx).await,
        "setclearances" => settings::set_clearances(ctx).await,
        "addtoaccesswhitelist" => {
            settings::mutate_list(ctx, ListTarget::AccessWhitelist, true).await
        }
        "addtoaccessblacklist" => {
            settings::mutate_list(ctx, ListTarget::AccessBlacklist, true).await
        }
        "addtomodifywhitelist" => {
            settings::mutate_list(ctx, ListTarget::ModifyWhitelist, true).await
        }
        "addtomodifyblacklist" => {
            settings::mutate_list(ctx, ListTarget::ModifyBlacklist, true).await
        }
        "removefromaccesswhitelist" => {
            settings::mutate_list(ctx, ListTarget::AccessWhitelist, false).await
        }
        "removefromaccessblacklist" => {
            settings::mutate_list(ctx, ListTarget::AccessBlacklist, false).await
        }
        "removefrommodifywhitelist" => {
            settings::mutate_list(ctx, ListTarget::ModifyWhitelist, false).await
        }
        "removefrommodifyblacklist" => {
            settings::mutate_list(ctx, ListTarget::ModifyBlacklist, false).await
        }

        "adduser" => admin::add_user(ctx).await,
        "removeuser" => admin::remove_user(ctx).await,
        "listusers" => admin::list_users(ctx).await,
        "adddrive" => admin::add_drive(ctx).await,
        "removedrive" => admin::remove_drive(ctx).await,
        "renamedrive" => admin::rename_drive(ctx).await,
        "setconfig" => admin::set_config(ctx).await,
        "getconfig" => admin::get_config(ctx).await,

        other => Err(Error::UnknownCommand(other.to_owned())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_entries() {
        assert_eq!(lookup("ping").unwrap().auth, AuthMode::Any);
        assert_eq!(lookup("login").unwrap().auth, AuthMode::UserOnly);
        assert_eq!(lookup("logout").unwrap().auth, AuthMode::SessionOnly);
        assert!(lookup("adduser").unwrap().admin);
        assert!(!lookup("createdirs").unwrap().admin);
        assert!(lookup("teleport").is_none());
    }
}
