//! Per-connection read and write tasks
//!
//! Each accepted socket splits into a reader task (length-prefixed frame,
//! decode, forward to the dispatcher) and a writer task draining a FIFO
//! queue of pre-encoded frames. The dispatcher never touches the socket;
//! it only holds the channel handles, so a slow or dead peer can never
//! stall the event loop.

use crate::server::Event;
use log::{debug, warn};
use shared::{decode_body, encode_frame, Message, MAX_FRAME_SIZE};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Cloneable handle queueing outbound messages for one session, in order.
#[derive(Clone, Debug)]
pub struct Writer {
    tx: mpsc::UnboundedSender<Vec<u8>>,
}

impl Writer {
    /// Encodes and queues one message. A send failure means the writer task
    /// is gone; the disconnect event cleans the session up, so it is safe
    /// to drop the message here.
    pub fn send(&self, msg: &Message) {
        match encode_frame(msg) {
            Ok(frame) => {
                let _ = self.tx.send(frame);
            }
            Err(err) => warn!("dropping unencodable message: {}", err),
        }
    }
}

/// Handles to one session's I/O tasks.
#[derive(Debug)]
pub struct Connection {
    pub writer: Writer,
    reader_task: JoinHandle<()>,
}

impl Connection {
    /// Stops reading immediately. Queued outbound frames (a farewell QUIT,
    /// usually) still drain: the writer task exits on its own once the
    /// last `Writer` clone is dropped.
    pub fn shutdown(&self) {
        self.reader_task.abort();
    }
}

/// Splits the socket into reader and writer tasks tied to session `id`.
pub fn spawn(stream: TcpStream, id: u16, events: mpsc::UnboundedSender<Event>) -> Connection {
    let (mut read_half, mut write_half) = stream.into_split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Vec<u8>>();

    let reader_task = tokio::spawn(async move {
        loop {
            let mut prefix = [0u8; 4];
            if read_half.read_exact(&mut prefix).await.is_err() {
                break;
            }
            let len = u32::from_be_bytes(prefix) as usize;
            if len > MAX_FRAME_SIZE {
                warn!("session {}: oversized frame of {} bytes", id, len);
                break;
            }
            let mut body = vec![0u8; len];
            if read_half.read_exact(&mut body).await.is_err() {
                break;
            }
            match decode_body(&body) {
                Ok(msg) => {
                    debug!("session {}: received {:?}", id, msg);
                    if events.send(Event::Received { id, msg }).is_err() {
                        return;
                    }
                }
                Err(err) => {
                    warn!("session {}: invalid frame: {}", id, err);
                    break;
                }
            }
        }
        let _ = events.send(Event::Disconnected { id });
    });

    tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if let Err(err) = write_half.write_all(&frame).await {
                debug!("session {}: write failed: {}", id, err);
                break;
            }
        }
        let _ = write_half.shutdown().await;
    });

    Connection {
        writer: Writer { tx },
        reader_task,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    async fn pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).await.unwrap();
        let (server, _) = listener.accept().await.unwrap();
        (client, server)
    }

    #[tokio::test]
    async fn valid_frame_becomes_an_event() {
        let (mut client, server) = pair().await;
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _conn = spawn(server, 7, tx);

        let frame = encode_frame(&Message::Resign).unwrap();
        client.write_all(&frame).await.unwrap();

        match rx.recv().await.unwrap() {
            Event::Received { id, msg } => {
                assert_eq!(id, 7);
                assert!(matches!(msg, Message::Resign));
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn oversized_prefix_disconnects() {
        let (mut client, server) = pair().await;
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _conn = spawn(server, 3, tx);

        let huge = ((MAX_FRAME_SIZE + 1) as u32).to_be_bytes();
        client.write_all(&huge).await.unwrap();

        match rx.recv().await.unwrap() {
            Event::Disconnected { id } => assert_eq!(id, 3),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn garbage_body_disconnects() {
        let (mut client, server) = pair().await;
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _conn = spawn(server, 5, tx);

        client.write_all(&4u32.to_be_bytes()).await.unwrap();
        client.write_all(&[0xff, 0xff, 0xff, 0xff]).await.unwrap();

        match rx.recv().await.unwrap() {
            Event::Disconnected { id } => assert_eq!(id, 5),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn peer_close_disconnects() {
        let (client, server) = pair().await;
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _conn = spawn(server, 9, tx);

        drop(client);
        match rx.recv().await.unwrap() {
            Event::Disconnected { id } => assert_eq!(id, 9),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn writer_queue_preserves_order() {
        let (mut client, server) = pair().await;
        let (tx, _rx) = mpsc::unbounded_channel();
        let conn = spawn(server, 1, tx);

        conn.writer.send(&Message::BadMove);
        conn.writer.send(&Message::Ok);

        for expect_ok in [false, true] {
            let mut prefix = [0u8; 4];
            client.read_exact(&mut prefix).await.unwrap();
            let len = u32::from_be_bytes(prefix) as usize;
            let mut body = vec![0u8; len];
            client.read_exact(&mut body).await.unwrap();
            let msg = decode_body(&body).unwrap();
            if expect_ok {
                assert!(matches!(msg, Message::Ok));
            } else {
                assert!(matches!(msg, Message::BadMove));
            }
        }
    }
}
