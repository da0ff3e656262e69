//! Streaming transfer commands: `readfiles` and `writefiles`.

use bson::Document;

use crate::drive::ops;
use crate::error::Result;

use super::{
    require_node_access, require_node_modify, require_root_access, require_root_modify,
    resolve_drive, want_bool_list, want_i64_list, want_str_list, CommandContext,
};

/// Default per-chunk byte budget when the client does not name one.
pub const DEFAULT_CHUNK_SIZE: u64 = 64 * 1024;

pub async fn read_files(ctx: &mut CommandContext<'_, '_>) -> Result<Document> {
    let drive = resolve_drive(ctx).await?;
    require_root_access(&drive, &ctx.principal).await?;
    let paths = want_str_list(&ctx.args, "paths")?;
    let starts = want_i64_list(&ctx.args, "starts")?;
    let ends = want_i64_list(&ctx.args, "ends")?;
    let chunk_size = match super::opt_i64(&ctx.args, "chunksize")? {
        Some(size) if size > 0 => size as u64,
        Some(_) => return Err(crate::error::Error::InvalidChunkSize),
        None => DEFAULT_CHUNK_SIZE,
    };
    for path in &paths {
        require_node_access(&drive, path, &ctx.principal).await?;
    }
    ops::read_files(&drive, &paths, &starts, &ends, chunk_size, ctx.chunks).await?;
    Ok(Document::new())
}

pub async fn write_files(ctx: &mut CommandContext<'_, '_>) -> Result<Document> {
    let drive = resolve_drive(ctx).await?;
    require_root_modify(&drive, &ctx.principal).await?;
    let paths = want_str_list(&ctx.args, "paths")?;
    let starts = want_i64_list(&ctx.args, "starts")?;
    let clears = want_bool_list(&ctx.args, "clears")?;
    for path in &paths {
        require_node_modify(&drive, path, &ctx.principal).await?;
    }
    ops::write_files(
        &drive,
        &paths,
        &starts,
        &clears,
        &ctx.principal.username,
        ctx.chunks,
    )
    .await?;
    Ok(Document::new())
}
