//! FastCGI responder: serves one gateway connection.
//!
//! # Responsibilities
//! - Answer management records (GET_VALUES, unknown types)
//! - Turn BEGIN_REQUEST + PARAMS into a request for the shared router
//! - Stream STDIN into the request body while the handler runs
//! - Write the CGI-style response and END_REQUEST
//!
//! # Design Decisions
//! - Reading STDIN and running the handler happen concurrently on the same
//!   task; the bounded body channel provides backpressure
//! - If the handler stops reading early (e.g. rejected method), remaining
//!   STDIN is drained so the connection stays in sync

use std::convert::Infallible;
use std::io;

use axum::body::Body;
use axum::response::{IntoResponse, Response};
use axum::Router;
use bytes::{Bytes, BytesMut};
use futures_util::{stream, SinkExt, StreamExt};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::UnixStream;
use tokio::sync::{broadcast, mpsc};
use tokio_util::codec::{FramedRead, FramedWrite};
use tower::ServiceExt;

use crate::gateway::params::{decode_pairs, encode_pair, GatewayParams};
use crate::gateway::record::{
    BeginRequest, ProtocolStatus, Record, RecordCodec, RecordType, Role, MANAGEMENT_REQUEST_ID,
    MAX_CONTENT_LEN,
};
use crate::gateway::GatewayError;
use crate::http::response::IngestResponse;

type RecordReader = FramedRead<OwnedReadHalf, RecordCodec>;
type RecordWriter = FramedWrite<OwnedWriteHalf, RecordCodec>;

/// Body chunks buffered between the socket and the handler.
const BODY_CHANNEL_DEPTH: usize = 8;

/// Upper bound on the encoded PARAMS stream of one request.
const MAX_PARAMS_LEN: usize = 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StdinEnd {
    Complete,
    Aborted,
    Disconnected,
}

enum ParamsEnd {
    Complete(BytesMut),
    Aborted,
    Disconnected,
}

/// Serves FastCGI connections by dispatching requests into a router.
#[derive(Debug, Clone)]
pub struct Responder {
    router: Router,
    max_connections: usize,
}

impl Responder {
    /// `max_connections` is advertised through GET_VALUES.
    pub fn new(router: Router, max_connections: usize) -> Self {
        Self {
            router,
            max_connections,
        }
    }

    /// Serve requests on `stream` until the peer closes it, a request
    /// without KEEP_CONN completes, or shutdown is signalled between requests.
    pub async fn serve(
        &self,
        stream: UnixStream,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), GatewayError> {
        let (read_half, write_half) = stream.into_split();
        let mut reader = FramedRead::new(read_half, RecordCodec);
        let mut writer = FramedWrite::new(write_half, RecordCodec);

        loop {
            let record = tokio::select! {
                record = reader.next() => match record {
                    Some(record) => record?,
                    None => return Ok(()),
                },
                _ = shutdown.recv() => {
                    tracing::debug!("Closing idle gateway connection");
                    return Ok(());
                }
            };

            match record.kind {
                RecordType::BeginRequest => {
                    let begin = BeginRequest::parse(&record.content)?;
                    let request_id = record.request_id;

                    let keep_open = if begin.role == Role::Responder {
                        let usable = self
                            .handle_request(request_id, &mut reader, &mut writer)
                            .await?;
                        usable && begin.keep_conn
                    } else {
                        tracing::warn!(role = ?begin.role, "Refusing gateway role");
                        writer
                            .send(Record::end_request(request_id, 0, ProtocolStatus::UnknownRole))
                            .await?;
                        begin.keep_conn
                    };

                    if !keep_open {
                        return Ok(());
                    }
                }
                RecordType::GetValues => self.answer_get_values(&record, &mut writer).await?,
                kind if record.request_id == MANAGEMENT_REQUEST_ID => {
                    writer.send(Record::unknown_type(kind.as_u8())).await?;
                }
                kind => tracing::debug!(
                    kind = ?kind,
                    request_id = record.request_id,
                    "Ignoring record outside a request"
                ),
            }
        }
    }

    /// Run one request. Returns whether the connection is still usable.
    async fn handle_request(
        &self,
        request_id: u16,
        reader: &mut RecordReader,
        writer: &mut RecordWriter,
    ) -> Result<bool, GatewayError> {
        let mut rejected = Vec::new();

        let raw_params = match read_params(reader, request_id, &mut rejected).await? {
            ParamsEnd::Complete(raw) => raw,
            ParamsEnd::Aborted => {
                writer
                    .send(Record::end_request(request_id, 0, ProtocolStatus::RequestComplete))
                    .await?;
                return Ok(true);
            }
            ParamsEnd::Disconnected => return Ok(false),
        };

        let (body_tx, body_rx) = mpsc::channel::<io::Result<Bytes>>(BODY_CHANNEL_DEPTH);
        let body = Body::from_stream(stream::unfold(body_rx, |mut rx| async move {
            rx.recv().await.map(|chunk| (chunk, rx))
        }));
        let request = GatewayParams::decode(&raw_params).and_then(|p| p.into_request(body));

        let respond = async {
            match request {
                Ok(request) => self
                    .router
                    .clone()
                    .oneshot(request)
                    .await
                    .unwrap_or_else(|never: Infallible| match never {}),
                Err(e) => {
                    tracing::warn!(error = %e, "Unusable gateway request");
                    IngestResponse::BadRequest.into_response()
                }
            }
        };

        let (response, stdin) = tokio::join!(
            respond,
            pump_stdin(reader, request_id, body_tx, &mut rejected)
        );
        let stdin = stdin?;

        if stdin != StdinEnd::Disconnected {
            write_response(writer, request_id, response).await?;
            for other in rejected {
                writer
                    .send(Record::end_request(other, 0, ProtocolStatus::CantMultiplex))
                    .await?;
            }
        }

        Ok(stdin != StdinEnd::Disconnected)
    }

    async fn answer_get_values(
        &self,
        record: &Record,
        writer: &mut RecordWriter,
    ) -> Result<(), GatewayError> {
        let mut reply = BytesMut::new();
        for (name, _) in decode_pairs(&record.content)? {
            let value = match name.as_str() {
                "FCGI_MAX_CONNS" | "FCGI_MAX_REQS" => self.max_connections.to_string(),
                "FCGI_MPXS_CONNS" => "0".to_string(),
                _ => continue,
            };
            encode_pair(&mut reply, name.as_bytes(), value.as_bytes());
        }

        writer
            .send(Record::new(
                RecordType::GetValuesResult,
                MANAGEMENT_REQUEST_ID,
                reply.freeze(),
            ))
            .await
    }
}

/// Collect the PARAMS stream of `request_id`.
async fn read_params(
    reader: &mut RecordReader,
    request_id: u16,
    rejected: &mut Vec<u16>,
) -> Result<ParamsEnd, GatewayError> {
    let mut raw = BytesMut::new();
    loop {
        let Some(record) = reader.next().await.transpose()? else {
            return Ok(ParamsEnd::Disconnected);
        };

        match record.kind {
            RecordType::Params if record.request_id == request_id => {
                if record.is_end_of_stream() {
                    return Ok(ParamsEnd::Complete(raw));
                }
                if raw.len() + record.content.len() > MAX_PARAMS_LEN {
                    return Err(GatewayError::Protocol("PARAMS stream too large".into()));
                }
                raw.extend_from_slice(&record.content);
            }
            RecordType::AbortRequest if record.request_id == request_id => {
                return Ok(ParamsEnd::Aborted);
            }
            RecordType::BeginRequest => rejected.push(record.request_id),
            kind => tracing::trace!(kind = ?kind, "Ignoring record while reading params"),
        }
    }
}

/// Forward STDIN of `request_id` into the body channel until end of stream.
///
/// Abort and connection loss are delivered to the body as read errors.
async fn pump_stdin(
    reader: &mut RecordReader,
    request_id: u16,
    body_tx: mpsc::Sender<io::Result<Bytes>>,
    rejected: &mut Vec<u16>,
) -> Result<StdinEnd, GatewayError> {
    let mut body = Some(body_tx);
    loop {
        let record = match reader.next().await {
            Some(Ok(record)) => record,
            Some(Err(e)) => {
                fail_body(&mut body, io::ErrorKind::InvalidData, "malformed gateway record").await;
                return Err(e);
            }
            None => {
                fail_body(
                    &mut body,
                    io::ErrorKind::UnexpectedEof,
                    "gateway connection closed mid-body",
                )
                .await;
                return Ok(StdinEnd::Disconnected);
            }
        };

        match record.kind {
            RecordType::Stdin if record.request_id == request_id => {
                if record.is_end_of_stream() {
                    return Ok(StdinEnd::Complete);
                }
                if let Some(sender) = &body {
                    if sender.send(Ok(record.content)).await.is_err() {
                        // Handler is done with the body; keep draining.
                        body = None;
                    }
                }
            }
            RecordType::AbortRequest if record.request_id == request_id => {
                fail_body(&mut body, io::ErrorKind::ConnectionAborted, "request aborted by gateway")
                    .await;
                return Ok(StdinEnd::Aborted);
            }
            RecordType::BeginRequest => rejected.push(record.request_id),
            kind => tracing::trace!(kind = ?kind, "Ignoring record while reading body"),
        }
    }
}

async fn fail_body(
    body: &mut Option<mpsc::Sender<io::Result<Bytes>>>,
    kind: io::ErrorKind,
    message: &'static str,
) {
    if let Some(sender) = body.take() {
        let _ = sender.send(Err(io::Error::new(kind, message))).await;
    }
}

/// Serialize `response` CGI-style onto STDOUT and end the request.
async fn write_response(
    writer: &mut RecordWriter,
    request_id: u16,
    response: Response,
) -> Result<(), GatewayError> {
    let (parts, body) = response.into_parts();

    let mut head = BytesMut::new();
    head.extend_from_slice(
        format!(
            "Status: {} {}\r\n",
            parts.status.as_u16(),
            parts.status.canonical_reason().unwrap_or_default()
        )
        .as_bytes(),
    );
    for (name, value) in &parts.headers {
        head.extend_from_slice(name.as_str().as_bytes());
        head.extend_from_slice(b": ");
        head.extend_from_slice(value.as_bytes());
        head.extend_from_slice(b"\r\n");
    }
    head.extend_from_slice(b"\r\n");
    feed_stdout(writer, request_id, head.freeze()).await?;

    let mut data = body.into_data_stream();
    while let Some(chunk) = data.next().await {
        let chunk = chunk.map_err(|e| GatewayError::Io(io::Error::other(e)))?;
        feed_stdout(writer, request_id, chunk).await?;
    }

    writer.feed(Record::stdout(request_id, Bytes::new())).await?;
    writer
        .send(Record::end_request(request_id, 0, ProtocolStatus::RequestComplete))
        .await
}

/// Queue `data` as STDOUT records of at most `MAX_CONTENT_LEN` bytes.
async fn feed_stdout(
    writer: &mut RecordWriter,
    request_id: u16,
    mut data: Bytes,
) -> Result<(), GatewayError> {
    while !data.is_empty() {
        let piece = data.split_to(data.len().min(MAX_CONTENT_LEN));
        writer.feed(Record::stdout(request_id, piece)).await?;
    }
    Ok(())
}
