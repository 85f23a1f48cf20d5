//! Response body buffering
//!
//! Bodies are streams and cannot be cloned. The body is read once into
//! memory; whenever reading stops early, the chunks already taken are put back
//! in front of the rest of the stream so the client receives exactly what the
//! wrapped service produced.

use axum::body::Body;
use bytes::{Bytes, BytesMut};
use futures::{stream, StreamExt};

/// Outcome of reading a response body
pub(crate) enum Buffered {
    /// The whole body, ready for conversion
    Complete(Bytes),
    /// The body exceeded the limit; replays the original bytes
    TooLarge(Body),
    /// The stream failed; replays the bytes read so far and then fails again
    Failed { body: Body, error: axum::Error },
}

/// Read a body into memory, stopping once it grows past `limit` bytes
pub(crate) async fn buffer_body(body: Body, limit: usize) -> Buffered {
    let mut chunks: Vec<Bytes> = Vec::new();
    let mut size = 0usize;
    let mut data = body.into_data_stream();

    while let Some(chunk) = data.next().await {
        match chunk {
            Ok(bytes) => {
                size = size.saturating_add(bytes.len());
                chunks.push(bytes);
                if size > limit {
                    let replay = stream::iter(chunks.into_iter().map(Ok::<_, axum::Error>));
                    return Buffered::TooLarge(Body::from_stream(replay.chain(data)));
                }
            }
            Err(error) => {
                let message = error.to_string();
                let failure = stream::once(async move { Err(std::io::Error::other(message)) });
                let replay = stream::iter(chunks.into_iter().map(Ok::<_, std::io::Error>));
                return Buffered::Failed {
                    body: Body::from_stream(replay.chain(failure)),
                    error,
                };
            }
        }
    }

    Buffered::Complete(concat(chunks, size))
}

fn concat(mut chunks: Vec<Bytes>, size: usize) -> Bytes {
    if chunks.len() == 1 {
        return chunks.pop().unwrap_or_default();
    }
    let mut buf = BytesMut::with_capacity(size);
    for chunk in chunks {
        buf.extend_from_slice(&chunk);
    }
    buf.freeze()
}
