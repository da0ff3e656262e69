//! One-shot request/response connection handling.
//!
//! Each accepted TLS connection carries exactly one request. The handler
//! reads the opening header and body, resolves the principal, dispatches
//! the command, preserves chunk-envelope framing on both directions and
//! writes the response. Failures before the response preamble produce a
//! connection-error frame; failures after it ride in the normal status
//! block.

use std::io::Cursor;
use std::sync::Arc;

use tracing::{debug, warn};
use uuid::Uuid;

use crate::auth::Principal;
use crate::error::{Error, Result};
use crate::server::commands::CommandContext;
use crate::server::{dispatch, Server};
use crate::wire::chunk::ChunkHandler;
use crate::wire::request::{self, AuthRequest};
use crate::wire::response::{self, Status};
use crate::wire::stream::DataStream;
use crate::wire::{FOOTER, PROTOCOL_VERSION};

/// Serves one request on `stream`, reporting errors to the client where
/// the protocol still allows it.
pub async fn handle(server: Arc<Server>, stream: &mut dyn DataStream) {
    match process(server, stream).await {
        Ok(()) => {}
        Err(err) => {
            debug!(error = %err, "request failed before response frame");
            let status = Status::from_error(&err);
            if let Err(write_err) = write_error_frame(stream, &status).await {
                debug!(error = %write_err, "connection dropped while reporting error");
            }
        }
    }
}

/// Runs the request cycle. Errors returned from here have not yet
/// written any response bytes.
async fn process(server: Arc<Server>, stream: &mut dyn DataStream) -> Result<()> {
    let mut header_bytes = [0u8; 7];
    stream.read_exact(&mut header_bytes).await?;
    let header = request::parse_header(&mut Cursor::new(header_bytes.to_vec()))?;
    if header.version != PROTOCOL_VERSION {
        return Err(Error::IncompatibleVersion(header.version as char));
    }

    let mut body = vec![0u8; header.body_length as usize];
    stream.read_exact(&mut body).await?;
    let mut cursor = Cursor::new(body);
    let auth = request::parse_auth(&mut cursor)?;
    let command = request::parse_command(&mut cursor)?;
    let principal = resolve_principal(&server, &auth).await?;

    // the response preamble goes out before dispatch so streaming
    // commands can emit chunks; failures past this point ride in the
    // status block
    let mut preamble = Vec::new();
    response::write_preamble(&mut preamble)?;
    stream.write_all(&preamble).await?;

    let outcome = {
        let mut chunks = ChunkHandler::new(&mut *stream);
        let mut ctx = CommandContext {
            server: Arc::clone(&server),
            principal,
            args: command.args.clone(),
            chunks: &mut chunks,
        };
        let outcome = dispatch::dispatch(&mut ctx, &command.name).await;

        // preserve framing whether or not the command streamed
        if !chunks.did_read() {
            if let Err(err) = chunks.drain_all().await {
                warn!(error = %err, "failed draining request chunk envelope");
                return Ok(());
            }
        }
        if !chunks.did_write() {
            chunks.write_empty().await?;
        }
        outcome
    };

    let status = match outcome {
        Ok(data) => Status::ok(data),
        Err(err) => {
            debug!(command = %command.name, error = %err, "command failed");
            Status::from_error(&err)
        }
    };
    let mut status_bytes = Vec::new();
    if response::write_status(&mut status_bytes, &status).is_err() {
        // a data map too large for its length prefix; fall back to a
        // bare error status so the frame stays parseable
        status_bytes.clear();
        let fallback = Status::from_error(&Error::InvalidSliceLength);
        response::write_status(&mut status_bytes, &fallback)?;
    }
    stream.write_all(&status_bytes).await?;
    stream.flush().await
}

/// Resolves the request's auth block to a principal.
pub async fn resolve_principal(server: &Server, auth: &AuthRequest) -> Result<Principal> {
    match auth {
        AuthRequest::Null => Ok(Principal::null()),
        AuthRequest::User { username, password } => {
            let user = server.users().get(username).await?;
            user.verify_password(password).await?;
            Ok(Principal::user(username.clone(), user.clearance().await))
        }
        AuthRequest::Session { username, id } => {
            let id = Uuid::from_bytes(*id);
            let session = server.sessions().get(id).await?;
            if &session.username().await != username {
                return Err(Error::InvalidAuth);
            }
            session.authenticate().await?;
            let clearance = server.users().get(username).await?.clearance().await;
            Ok(Principal::session(username.clone(), clearance, id))
        }
    }
}

/// Writes a complete response frame (preamble, empty chunk envelope,
/// status) for a request that failed before dispatch.
pub async fn write_error_frame(stream: &mut dyn DataStream, status: &Status) -> Result<()> {
    let mut frame = Vec::new();
    response::write_preamble(&mut frame)?;
    frame.extend_from_slice(&0u16.to_le_bytes());
    frame.extend_from_slice(FOOTER);
    response::write_status(&mut frame, status)?;
    stream.write_all(&frame).await?;
    stream.flush().await
}
