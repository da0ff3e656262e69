//! Filesystem commands delegating to the drive operations.

use bson::{doc, Bson, Document};

use crate::drive::ops;
use crate::error::Result;

use super::{
    opt_bool, opt_settings, opt_settings_list, require_node_access, require_node_modify,
    require_parent_modify, require_root_access, require_root_modify, resolve_drive,
    want_str, want_str_list, CommandContext,
};

pub async fn create_dirs(ctx: &mut CommandContext<'_, '_>) -> Result<Document> {
    let drive = resolve_drive(ctx).await?;
    require_root_modify(&drive, &ctx.principal).await?;
    let paths = want_str_list(&ctx.args, "paths")?;
    let settings = opt_settings_list(&ctx.args, "settings")?;
    let use_parent = opt_bool(&ctx.args, "useparentsettings", false)?;
    let grouped = opt_bool(&ctx.args, "grouped", false)?;
    for path in &paths {
        require_parent_modify(&drive, path, &ctx.principal).await?;
    }
    ops::create_dirs(
        &drive,
        &paths,
        settings.as_deref(),
        use_parent,
        &ctx.principal.username,
        grouped,
    )
    .await?;
    Ok(Document::new())
}

pub async fn create_files(ctx: &mut CommandContext<'_, '_>) -> Result<Document> {
    let drive = resolve_drive(ctx).await?;
    require_root_modify(&drive, &ctx.principal).await?;
    let paths = want_str_list(&ctx.args, "paths")?;
    let settings = opt_settings_list(&ctx.args, "settings")?;
    let use_parent = opt_bool(&ctx.args, "useparentsettings", false)?;
    let grouped = opt_bool(&ctx.args, "grouped", false)?;
    for path in &paths {
        require_parent_modify(&drive, path, &ctx.principal).await?;
    }
    ops::create_files(
        &drive,
        &paths,
        settings.as_deref(),
        use_parent,
        &ctx.principal.username,
        grouped,
    )
    .await?;
    Ok(Document::new())
}

pub async fn create_dirs_tree(ctx: &mut CommandContext<'_, '_>) -> Result<Document> {
    let drive = resolve_drive(ctx).await?;
    require_root_modify(&drive, &ctx.principal).await?;
    let parent = want_str(&ctx.args, "parent")?;
    let descendants = want_str_list(&ctx.args, "descendants")?;
    let parent_settings = opt_settings(&ctx.args, "parentsettings")?;
    let descendant_settings = opt_settings_list(&ctx.args, "settings")?;
    let use_parent = opt_bool(&ctx.args, "useparentsettings", false)?;
    require_parent_modify(&drive, &parent, &ctx.principal).await?;
    ops::create_dirs_tree(
        &drive,
        &parent,
        &descendants,
        parent_settings,
        descendant_settings.as_deref(),
        use_parent,
        &ctx.principal.username,
    )
    .await?;
    Ok(Document::new())
}

pub async fn rename_dirs(ctx: &mut CommandContext<'_, '_>) -> Result<Document> {
    let drive = resolve_drive(ctx).await?;
    require_root_modify(&drive, &ctx.principal).await?;
    let paths = want_str_list(&ctx.args, "paths")?;
    let new_names = want_str_list(&ctx.args, "newnames")?;
    let grouped = opt_bool(&ctx.args, "grouped", false)?;
    for path in &paths {
        require_node_modify(&drive, path, &ctx.principal).await?;
    }
    ops::rename_dirs(&drive, &paths, &new_names, &ctx.principal.username, grouped).await?;
    Ok(Document::new())
}

pub async fn rename_files(ctx: &mut CommandContext<'_, '_>) -> Result<Document> {
    let drive = resolve_drive(ctx).await?;
    require_root_modify(&drive, &ctx.principal).await?;
    let paths = want_str_list(&ctx.args, "paths")?;
    let new_names = want_str_list(&ctx.args, "newnames")?;
    let grouped = opt_bool(&ctx.args, "grouped", false)?;
    for path in &paths {
        require_node_modify(&drive, path, &ctx.principal).await?;
    }
    ops::rename_files(&drive, &paths, &new_names, &ctx.principal.username, grouped).await?;
    Ok(Document::new())
}

pub async fn move_dirs(ctx: &mut CommandContext<'_, '_>) -> Result<Document> {
    let drive = resolve_drive(ctx).await?;
    require_root_modify(&drive, &ctx.principal).await?;
    let sources = want_str_list(&ctx.args, "paths")?;
    let destinations = want_str_list(&ctx.args, "dests")?;
    for source in &sources {
        require_node_modify(&drive, source, &ctx.principal).await?;
    }
    for destination in &destinations {
        require_parent_modify(&drive, destination, &ctx.principal).await?;
    }
    ops::move_dirs(&drive, &sources, &destinations, &ctx.principal.username).await?;
    Ok(Document::new())
}

pub async fn move_files(ctx: &mut CommandContext<'_, '_>) -> Result<Document> {
    let drive = resolve_drive(ctx).await?;
    require_root_modify(&drive, &ctx.principal).await?;
    let sources = want_str_list(&ctx.args, "paths")?;
    let destinations = want_str_list(&ctx.args, "dests")?;
    for source in &sources {
        require_node_modify(&drive, source, &ctx.principal).await?;
    }
    for destination in &destinations {
        require_parent_modify(&drive, destination, &ctx.principal).await?;
    }
    ops::move_files(&drive, &sources, &destinations, &ctx.principal.username).await?;
    Ok(Document::new())
}

pub async fn delete_dirs(ctx: &mut CommandContext<'_, '_>) -> Result<Document> {
    let drive = resolve_drive(ctx).await?;
    require_root_modify(&drive, &ctx.principal).await?;
    let paths = want_str_list(&ctx.args, "paths")?;
    let grouped = opt_bool(&ctx.args, "grouped", false)?;
    for path in &paths {
        require_node_modify(&drive, path, &ctx.principal).await?;
    }
    ops::delete_dirs(&drive, &paths, grouped).await?;
    Ok(Document::new())
}

pub async fn delete_files(ctx: &mut CommandContext<'_, '_>) -> Result<Document> {
    let drive = resolve_drive(ctx).await?;
    require_root_modify(&drive, &ctx.principal).await?;
    let paths = want_str_list(&ctx.args, "paths")?;
    let grouped = opt_bool(&ctx.args, "grouped", false)?;
    for path in &paths {
        require_node_modify(&drive, path, &ctx.principal).await?;
    }
    ops::delete_files(&drive, &paths, grouped).await?;
    Ok(Document::new())
}

pub async fn list(ctx: &mut CommandContext<'_, '_>) -> Result<Document> {
    let drive = resolve_drive(ctx).await?;
    require_root_access(&drive, &ctx.principal).await?;
    let path = want_str(&ctx.args, "path")?;
    require_node_access(&drive, &path, &ctx.principal).await?;
    let entries = ops::list_dir(&drive, &path).await?;
    let entries: Vec<Bson> = entries
        .into_iter()
        .map(|entry| {
            Bson::Document(doc! {
                "name": entry.name,
                "isfile": entry.is_file,
                "lasteditor": entry.last_editor,
            })
        })
        .collect();
    Ok(doc! { "entries": entries })
}

pub async fn stat(ctx: &mut CommandContext<'_, '_>) -> Result<Document> {
    let drive = resolve_drive(ctx).await?;
    require_root_access(&drive, &ctx.principal).await?;
    let paths = want_str_list(&ctx.args, "paths")?;
    let stats = ops::stat_paths(&drive, &paths).await?;
    let stats: Vec<Bson> = stats
        .into_iter()
        .map(|stat| {
            Bson::Document(doc! {
                "path": stat.path,
                "exists": stat.exists,
                "name": stat.name,
                "isfile": stat.is_file,
                "lasteditor": stat.last_editor,
            })
        })
        .collect();
    Ok(doc! { "stats": stats })
}

pub async fn rehash(ctx: &mut CommandContext<'_, '_>) -> Result<Document> {
    let drive = resolve_drive(ctx).await?;
    require_root_modify(&drive, &ctx.principal).await?;
    let paths = want_str_list(&ctx.args, "paths")?;
    for path in &paths {
        require_node_modify(&drive, path, &ctx.principal).await?;
    }
    ops::rehash(&drive, &paths, &ctx.principal.username).await?;
    Ok(Document::new())
}

pub async fn verify_hashes(ctx: &mut CommandContext<'_, '_>) -> Result<Document> {
    let drive = resolve_drive(ctx).await?;
    require_root_access(&drive, &ctx.principal).await?;
    let paths = want_str_list(&ctx.args, "paths")?;
    for path in &paths {
        require_node_access(&drive, path, &ctx.principal).await?;
    }
    let results = ops::verify_hashes(&drive, &paths).await?;
    let mut results_doc = Document::new();
    for (path, matched) in results {
        results_doc.insert(path, matched);
    }
    Ok(doc! { "results": results_doc })
}
