//! A worker owns exactly one client socket at a time and serves requests
//! against it with blocking I/O (§4.7). Grounded on `bitz::Worker::run` in
//! the original daemon: accept, serve requests until `max_requests` or
//! `Connection: close`, then exit so the manager can respawn a fresh process.

use std::net::TcpListener;
use std::time::Duration;

use slog::Logger;

use crate::error::{IcapError, IcapResult};
use crate::handlers::{options, reqmod, respmod, PreviewDecision};
use crate::log::{ConnectionEvent, WorkerEvent};
use crate::modules::{AdaptationRequest, AdaptationResponse, ModifierRegistry};
use crate::protocol::chunked::ChunkedParser;
use crate::protocol::common::status;
use crate::protocol::parser::parse_request_header;
use crate::protocol::serializer::serialize_response;
use crate::protocol::{EncapsulatedEntry, IcapMethod, Payload, RequestHeader, ResponseHeader, SectionName};
use crate::socket::Connection;
use crate::stats::IcapStats;

const MAX_HEADER_SIZE: usize = 8192;

pub struct WorkerConfig {
    pub read_timeout: Duration,
    pub max_requests: u64,
}

/// Accept connections from `listener` and serve them until `max_requests`
/// total requests have been handled by this process, then return so the
/// manager can respawn a replacement.
pub fn run(
    listener: &TcpListener,
    registry: &ModifierRegistry,
    config: &WorkerConfig,
    stats: &IcapStats,
    logger: &Logger,
) -> IcapResult<()> {
    let mut served: u64 = 0;
    loop {
        let (stream, peer) = listener.accept().map_err(IcapError::Io)?;
        stats.increment_connections();
        let conn_logger = crate::log::connection_logger(logger, std::process::id(), peer);
        ConnectionEvent::Accepted.log(&conn_logger, "accepted connection");

        let mut conn = Connection::new(stream);
        let _ = conn.set_read_timeout(Some(config.read_timeout));

        loop {
            match serve_one(&mut conn, registry, stats, &conn_logger) {
                Ok(keep_alive) => {
                    served += 1;
                    if !keep_alive {
                        break;
                    }
                }
                Err(err) => {
                    WorkerEvent::Error.log(logger, &err.to_string());
                    break;
                }
            }
            if served >= config.max_requests {
                break;
            }
        }
        conn.shutdown();
        ConnectionEvent::Closed.log(&conn_logger, "connection closed");

        if served >= config.max_requests {
            WorkerEvent::RequestLimitReached.log(logger, "max_requests reached, exiting worker");
            return Ok(());
        }
    }
}

/// Serve one request on `conn`. Returns whether the connection should stay
/// open for another request.
fn serve_one(
    conn: &mut Connection,
    registry: &ModifierRegistry,
    stats: &IcapStats,
    logger: &Logger,
) -> IcapResult<bool> {
    let block = match conn.read_header_block(MAX_HEADER_SIZE) {
        Ok(block) => block,
        Err(err) => {
            let _ = respond_error(conn, &err);
            return Err(err);
        }
    };
    stats.increment_requests();

    let header = match parse_request_header(&block) {
        Ok(header) => header,
        Err(err) => {
            respond_error(conn, &err)?;
            return Ok(false);
        }
    };
    ConnectionEvent::RequestReceived.log(logger, &format!("{} {}", header.method.as_str(), header.uri));

    let keep_alive = !header.connection_close();

    let result = match &header.method {
        IcapMethod::Options => {
            let uri_path = header.uri_path();
            let method = if uri_path.contains("respmod") { "RESPMOD" } else { "REQMOD" };
            Ok(options::response(method))
        }
        IcapMethod::Reqmod => serve_adaptation(conn, header, registry, true),
        IcapMethod::Respmod => serve_adaptation(conn, header, registry, false),
        IcapMethod::Other(name) => Err(IcapError::route(405, format!("unsupported method: {name}"))),
    };

    match result {
        Ok(response) => {
            write_response(conn, &response)?;
            stats.increment_responses();
            ConnectionEvent::ResponseSent.log(logger, &format!("{}", response.header.status));
            Ok(keep_alive)
        }
        Err(err) => {
            stats.increment_errors();
            respond_error(conn, &err)?;
            Ok(keep_alive && err.keeps_connection_open())
        }
    }
}

/// Read the encapsulated payload, run the preview/modify handshake against
/// `registry`'s chain for the relevant method, and return the final response.
fn serve_adaptation(
    conn: &mut Connection,
    header: RequestHeader,
    registry: &ModifierRegistry,
    is_reqmod: bool,
) -> IcapResult<AdaptationResponse> {
    let (payload, body_complete) = read_payload(conn, &header)?;
    let mut request = AdaptationRequest { header, payload };

    if request.header.preview.is_some() {
        let decision = if is_reqmod {
            reqmod::preview(registry, &request)?
        } else {
            respmod::preview(registry, &request)?
        };
        match decision {
            PreviewDecision::Final(response) => return Ok(response),
            PreviewDecision::NeedsBody => {
                // `body_complete` means the preview's terminal chunk carried
                // `ieof` (RFC 3507 §4.6 scenario 4): the whole entity already
                // arrived, so there's nothing left to pull with `100
                // Continue` even though a modifier still asked for the body.
                if !body_complete {
                    conn.write_all(b"ICAP/1.0 100 Continue\r\n\r\n")?;
                    let rest = read_remaining_body(conn)?;
                    append_body(&mut request, rest);
                }
            }
        }
    }

    if is_reqmod {
        reqmod::modify(registry, &request)
    } else {
        respmod::modify(registry, &request)
    }
}

/// Read the header sections and the terminal body section named by
/// `header.encapsulated`, honoring `Preview` if present.
///
/// An empty `encapsulated` list means no body at all (e.g. a malformed but
/// otherwise acceptable request); callers still get a `Payload::default()`.
///
/// Returns whether the body is already complete: true for `null-body`, for
/// any body read without a `Preview` limit, and for a preview whose
/// terminal chunk carried `ieof` (RFC 3507 §4.6 scenario 4 — the whole
/// entity arrived within the preview window, so no `100 Continue`
/// round-trip is needed).
fn read_payload(conn: &mut Connection, header: &RequestHeader) -> IcapResult<(Payload, bool)> {
    let mut payload = Payload::default();
    let entries = &header.encapsulated;
    if entries.is_empty() {
        return Ok((payload, true));
    }

    let mut body_complete = true;
    for (i, entry) in entries.iter().enumerate() {
        let is_last = i + 1 == entries.len();
        if !is_last {
            let len = entries[i + 1].offset - entry.offset;
            let bytes = conn.read_exact(len)?;
            assign_header_section(&mut payload, entry.section, bytes);
            continue;
        }

        match entry.section {
            SectionName::NullBody => {}
            SectionName::ReqBody | SectionName::ResBody | SectionName::OptBody => {
                let mut parser = ChunkedParser::new();
                let mut body = Vec::new();
                while !parser.is_complete() {
                    body.extend(conn.read_chunked_step(&mut parser)?);
                }
                // A preview terminated by a plain `0\r\n\r\n` (no `ieof`) only
                // ends the preview window, not the entity; the rest follows
                // after a `100 Continue`.
                if header.preview.is_some() && !parser.is_ieof() {
                    body_complete = false;
                }
                assign_body_section(&mut payload, entry.section, bytes::Bytes::from(body));
            }
            SectionName::ReqHdr | SectionName::ResHdr => {
                return Err(IcapError::protocol(
                    400,
                    "Encapsulated list must terminate in a body section",
                ));
            }
        }
    }

    Ok((payload, body_complete))
}

fn read_remaining_body(conn: &mut Connection) -> IcapResult<Vec<u8>> {
    let mut parser = ChunkedParser::new();
    let mut body = Vec::new();
    while !parser.is_complete() {
        body.extend(conn.read_chunked_step(&mut parser)?);
    }
    Ok(body)
}

fn append_body(request: &mut AdaptationRequest, mut rest: Vec<u8>) {
    let target = if !request.payload.req_body.is_empty() || request.header.encapsulated.iter().any(|e| e.section == SectionName::ReqBody) {
        &mut request.payload.req_body
    } else {
        &mut request.payload.res_body
    };
    let mut combined = target.to_vec();
    combined.append(&mut rest);
    *target = bytes::Bytes::from(combined);
}

fn assign_header_section(payload: &mut Payload, section: SectionName, bytes: bytes::Bytes) {
    match section {
        SectionName::ReqHdr => payload.req_header = bytes,
        SectionName::ResHdr => payload.res_header = bytes,
        _ => {}
    }
}

fn assign_body_section(payload: &mut Payload, section: SectionName, bytes: bytes::Bytes) {
    match section {
        SectionName::ReqBody => payload.req_body = bytes,
        SectionName::ResBody => payload.res_body = bytes,
        SectionName::OptBody => payload.res_body = bytes,
        _ => {}
    }
}

fn write_response(conn: &mut Connection, response: &AdaptationResponse) -> IcapResult<()> {
    let bytes = serialize_response(&response.header, &response.payload);
    conn.write_all(&bytes)
}

/// Write a minimal error response for errors that carry an ICAP status
/// (§7); errors with no response (`Io`, `Fatal`, `Config`) are silently
/// swallowed here — the connection is already gone or about to be.
fn respond_error(conn: &mut Connection, err: &IcapError) -> IcapResult<()> {
    let Some(code) = err.icap_status() else {
        return Ok(());
    };
    let mut header = ResponseHeader::new(code);
    header.encapsulated = vec![EncapsulatedEntry {
        section: SectionName::NullBody,
        offset: 0,
    }];
    let response = AdaptationResponse {
        header,
        payload: Payload::default(),
    };
    write_response(conn, &response)
}
