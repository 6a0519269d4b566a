use crate::common::Dispatcher;
use crate::dispatch::{CannedResponse, RouteTable};
use crate::http::{HttpCodec, MockConfig, ResponseFrame};
use crate::record::RequestRecorder;
use crate::Result;
use bytes::BytesMut;
use std::net::SocketAddr;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_util::codec::{Decoder, Encoder};
use tracing::{info, warn};

/// State shared by every connection task of one server
pub(crate) struct ConnectionContext {
    pub(crate) config: MockConfig,
    pub(crate) routes: Arc<RwLock<RouteTable>>,
    pub(crate) recorder: RequestRecorder,
}

/// Serves requests on one connection until it closes
///
/// Each well-formed request is recorded, then dispatched, then answered.
/// A request that cannot be decoded gets an error-class response and the
/// connection is closed.
pub(crate) async fn handle_connection(
    mut stream: TcpStream,
    addr: SocketAddr,
    ctx: Arc<ConnectionContext>,
) -> Result<()> {
    let config = &ctx.config;
    let mut codec = HttpCodec::new(config.max_request_size, config.server_name.as_deref());
    let mut read_buf = BytesMut::with_capacity(config.buffer_size);

    loop {
        let request = match codec.decode(&mut read_buf) {
            Ok(Some(request)) => request,
            Ok(None) => {
                let read_result = timeout(config.read_timeout, stream.read_buf(&mut read_buf)).await;
                match read_result {
                    Ok(Ok(0)) => {
                        if read_buf.is_empty() && !codec.has_pending() {
                            info!(%addr, "Client closed connection");
                        } else {
                            warn!(%addr, buffered = read_buf.len(), "Client closed connection mid-request");
                            let frame = ResponseFrame {
                                response: CannedResponse::bad_request(),
                                omit_body: false,
                                close: true,
                            };
                            write_frame(&mut stream, &mut codec, frame, &ctx).await?;
                        }
                        break;
                    }
                    Ok(Ok(_)) => continue,
                    Ok(Err(e)) => return Err(e.into()),
                    Err(_) => {
                        warn!(%addr, "Read timeout");
                        break;
                    }
                }
            }
            Err(e) => {
                let response = e.response();
                warn!(%addr, error = %e, status = response.status.as_u16(), "Rejecting malformed request");
                let frame = ResponseFrame {
                    response,
                    omit_body: false,
                    close: true,
                };
                write_frame(&mut stream, &mut codec, frame, &ctx).await?;
                break;
            }
        };

        let keep_alive = request.keep_alive;
        let omit_body = request.method == "HEAD";

        // Recorded before the response is written
        let record = ctx.recorder.record(request.into_record());
        let response = {
            let routes = ctx.routes.read().unwrap_or_else(PoisonError::into_inner);
            routes.dispatch(&record)
        };

        info!(
            %addr,
            sequence = record.sequence,
            method = %record.method,
            path = %record.path,
            status = response.status.as_u16(),
            "Dispatched request"
        );

        let frame = ResponseFrame {
            response,
            omit_body,
            close: !keep_alive,
        };
        let written = write_frame(&mut stream, &mut codec, frame, &ctx).await?;

        if !keep_alive || !written {
            break;
        }
    }

    Ok(())
}

/// Encodes and writes one response
///
/// Returns `false` when the write timed out part way; the connection must
/// not be used for another response after that.
async fn write_frame(
    stream: &mut TcpStream,
    codec: &mut HttpCodec,
    frame: ResponseFrame,
    ctx: &ConnectionContext,
) -> Result<bool> {
    let close = frame.close;
    let mut out = BytesMut::new();
    codec.encode(frame, &mut out)?;

    match timeout(ctx.config.write_timeout, stream.write_all(&out)).await {
        Ok(result) => result?,
        Err(_) => {
            warn!(size = out.len(), "Write timeout");
            return Ok(false);
        }
    }
    stream.flush().await?;
    if close {
        stream.shutdown().await?;
    }
    Ok(true)
}

/// Answers a connection over the connection cap with `503` and closes it
///
/// The request itself is never read or recorded. After the response the
/// write side is shut down and whatever the client sent is drained, so the
/// close is a FIN rather than a reset.
pub(crate) async fn reject_connection(
    mut stream: TcpStream,
    addr: SocketAddr,
    ctx: Arc<ConnectionContext>,
) -> Result<()> {
    let mut codec = HttpCodec::new(ctx.config.max_request_size, ctx.config.server_name.as_deref());
    let frame = ResponseFrame {
        response: CannedResponse::service_unavailable(),
        omit_body: false,
        close: true,
    };
    if !write_frame(&mut stream, &mut codec, frame, &ctx).await? {
        return Ok(());
    }

    let mut drain = [0u8; 1024];
    loop {
        match timeout(ctx.config.write_timeout, stream.read(&mut drain)).await {
            Ok(Ok(0)) | Ok(Err(_)) | Err(_) => break,
            Ok(Ok(_)) => continue,
        }
    }
    info!(%addr, "Rejected connection closed");
    Ok(())
}
