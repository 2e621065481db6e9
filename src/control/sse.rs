// src/control/sse.rs

//! Server-sent-event streaming for `/events`.
//!
//! tiny_http buffers chunked bodies, so the stream bypasses `Response` and
//! writes the status line, headers and frames to the raw connection,
//! flushing after every frame. The body is delimited by connection close.

use std::io::{self, Write};
use std::time::Duration;

use crossbeam::channel::RecvTimeoutError;
use tiny_http::Request;
use tracing::debug;

use crate::broadcast::frame::{comment_frame, data_frame};
use crate::broadcast::Subscriber;

const PREAMBLE: &str = "HTTP/1.1 200 OK\r\n\
Content-Type: text/event-stream\r\n\
Cache-Control: no-cache\r\n\
Connection: keep-alive\r\n\
Access-Control-Allow-Origin: *\r\n\
\r\n";

/// Serve one viewer until it disconnects or is evicted. Blocks the calling
/// thread. Dropping `subscriber` on return unsubscribes it.
pub fn serve_events(request: Request, subscriber: Subscriber, keep_alive: Duration) {
    let id = subscriber.id();
    let mut writer = request.into_writer();
    match stream_events(&mut writer, &subscriber, keep_alive) {
        Ok(()) => debug!(subscriber = id, "event stream closed by broadcaster"),
        Err(e) => debug!(subscriber = id, error = %e, "viewer disconnected"),
    }
}

/// Write the SSE preamble, then frames as lines arrive, with a keep-alive
/// comment after every `keep_alive` of silence.
///
/// Returns `Ok` when the subscriber has been evicted and drained, `Err` on
/// the first failed write.
pub fn stream_events<W: Write + ?Sized>(
    writer: &mut W,
    subscriber: &Subscriber,
    keep_alive: Duration,
) -> io::Result<()> {
    writer.write_all(PREAMBLE.as_bytes())?;
    send(writer, &comment_frame("connected"))?;

    loop {
        let frame = match subscriber.recv_timeout(keep_alive) {
            Ok(line) => data_frame(&line),
            Err(RecvTimeoutError::Timeout) => comment_frame("keep-alive"),
            Err(RecvTimeoutError::Disconnected) => return Ok(()),
        };
        send(writer, &frame)?;
    }
}

fn send<W: Write + ?Sized>(writer: &mut W, frame: &str) -> io::Result<()> {
    writer.write_all(frame.as_bytes())?;
    writer.flush()
}
