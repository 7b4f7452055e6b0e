//! Outbound queueing and non-blocking socket I/O.
//!
//! Requests are queued as `(bytes, fds)` and written in FIFO order by
//! [`Transport::flush`]. Incoming bytes accumulate in an inbound buffer and
//! incoming descriptors in a separate queue, both drained by the decoder.

use crate::socket::Socket;
use std::collections::VecDeque;
use std::io;
use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use waylink_protocol::EncodedMessage;

/// A queued request.
#[derive(Debug)]
struct Outbound {
    bytes: Vec<u8>,
    /// Descriptors still to be attached; emptied once the kernel takes them.
    fds: Vec<OwnedFd>,
    /// Bytes already accepted by the socket.
    sent: usize,
}

/// Owns the socket and both directions of buffering.
pub struct Transport {
    socket: Box<dyn Socket>,
    outbound: VecDeque<Outbound>,
    pub(crate) inbound: Vec<u8>,
    pub(crate) incoming_fds: VecDeque<OwnedFd>,
    scratch: Vec<u8>,
}

impl Transport {
    /// Wrap a socket, reading at most `chunk_size` bytes per receive.
    pub fn new(socket: Box<dyn Socket>, chunk_size: usize) -> Self {
        Self {
            socket,
            outbound: VecDeque::new(),
            inbound: Vec::new(),
            incoming_fds: VecDeque::new(),
            scratch: vec![0; chunk_size.max(1)],
        }
    }

    /// Queue an encoded request for the next flush.
    pub fn queue(&mut self, message: EncodedMessage) {
        self.outbound.push_back(Outbound {
            bytes: message.bytes,
            fds: message.fds,
            sent: 0,
        });
    }

    /// Number of requests not yet fully written.
    #[must_use]
    pub fn pending_requests(&self) -> usize {
        self.outbound.len()
    }

    /// Write queued requests until the queue is empty or the socket is full.
    ///
    /// Returns `true` when everything was written. A request whose first
    /// bytes would block stays at the head of the queue untouched; a request
    /// that was partly written keeps its remainder at the head and its
    /// descriptors are never sent again.
    pub fn flush(&mut self) -> io::Result<bool> {
        while let Some(head) = self.outbound.front_mut() {
            while head.sent < head.bytes.len() {
                let remaining = &head.bytes[head.sent..];
                let result = if head.fds.is_empty() {
                    self.socket.send(remaining)
                } else {
                    let raw: Vec<RawFd> = head.fds.iter().map(AsRawFd::as_raw_fd).collect();
                    self.socket.send_with_fds(remaining, &raw)
                };

                match result {
                    Ok(0) => {
                        return Err(io::Error::new(
                            io::ErrorKind::WriteZero,
                            "socket accepted zero bytes",
                        ));
                    }
                    Ok(n) => {
                        head.sent += n;
                        // The kernel holds its own references now
                        head.fds.clear();
                    }
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(false),
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => return Err(e),
                }
            }

            tracing::trace!(bytes = head.bytes.len(), "request written");
            self.outbound.pop_front();
        }
        Ok(true)
    }

    /// Perform one receive, appending bytes and descriptors to the inbound buffers.
    ///
    /// Returns `None` when no data was ready.
    pub fn receive(&mut self) -> io::Result<Option<usize>> {
        match self
            .socket
            .recv_with_fds(&mut self.scratch, &mut self.incoming_fds)
        {
            Ok(0) => Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "display server closed the connection",
            )),
            Ok(n) => {
                self.inbound.extend_from_slice(&self.scratch[..n]);
                Ok(Some(n))
            }
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
                ) =>
            {
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Block until the socket can make progress.
    pub fn wait(&mut self) -> io::Result<()> {
        let writable = !self.outbound.is_empty();
        self.socket.wait(writable)
    }

    /// Shut the socket down and drop anything still queued.
    pub fn shutdown(&mut self) {
        self.socket.shutdown();
        self.outbound.clear();
        self.incoming_fds.clear();
    }

    /// Underlying descriptor, if the socket has one.
    #[must_use]
    pub fn raw_fd(&self) -> Option<RawFd> {
        self.socket.raw_fd()
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{MockSocket, SendStep, SentChunk};
    use super::*;
    use std::os::unix::net::UnixStream;

    fn message(tag: u8, len: usize) -> EncodedMessage {
        EncodedMessage {
            bytes: vec![tag; len],
            fds: Vec::new(),
        }
    }

    fn transport(mock: &MockSocket) -> Transport {
        Transport::new(Box::new(mock.clone()), 64)
    }

    #[test]
    fn test_flush_writes_in_order() {
        let mock = MockSocket::new();
        let mut transport = transport(&mock);
        transport.queue(message(b'a', 8));
        transport.queue(message(b'b', 8));

        assert!(transport.flush().unwrap());
        assert_eq!(transport.pending_requests(), 0);
        assert_eq!(mock.sent_bytes(), [vec![b'a'; 8], vec![b'b'; 8]].concat());
    }

    #[test]
    fn test_would_block_keeps_head_and_order() {
        let mock = MockSocket::new();
        mock.script(&[SendStep::Block]);
        let mut transport = transport(&mock);
        transport.queue(message(b'a', 8));
        transport.queue(message(b'b', 8));

        assert!(!transport.flush().unwrap());
        assert_eq!(transport.pending_requests(), 2);
        assert!(mock.sent_bytes().is_empty());

        assert!(transport.flush().unwrap());
        assert_eq!(mock.sent_bytes(), [vec![b'a'; 8], vec![b'b'; 8]].concat());
    }

    #[test]
    fn test_partial_send_attaches_fds_once() {
        let mock = MockSocket::new();
        mock.script(&[SendStep::Accept(4), SendStep::Accept(2)]);
        let mut transport = transport(&mock);

        let (fd, _peer) = UnixStream::pair().unwrap();
        transport.queue(EncodedMessage {
            bytes: vec![7; 12],
            fds: vec![fd.into()],
        });
        transport.queue(message(b'z', 8));

        assert!(transport.flush().unwrap());
        let sent = mock.state.borrow().sent.clone();
        assert_eq!(
            sent,
            vec![
                SentChunk {
                    bytes: vec![7; 4],
                    fd_count: 1
                },
                SentChunk {
                    bytes: vec![7; 2],
                    fd_count: 0
                },
                SentChunk {
                    bytes: vec![7; 6],
                    fd_count: 0
                },
                SentChunk {
                    bytes: vec![b'z'; 8],
                    fd_count: 0
                },
            ]
        );
    }

    #[test]
    fn test_block_mid_message_keeps_remainder_first() {
        let mock = MockSocket::new();
        mock.script(&[SendStep::Accept(4), SendStep::Block]);
        let mut transport = transport(&mock);

        let (fd, _peer) = UnixStream::pair().unwrap();
        transport.queue(EncodedMessage {
            bytes: vec![1; 8],
            fds: vec![fd.into()],
        });
        transport.queue(message(2, 8));

        assert!(!transport.flush().unwrap());
        assert_eq!(transport.pending_requests(), 2);

        assert!(transport.flush().unwrap());
        let sent = mock.state.borrow().sent.clone();
        assert_eq!(sent.len(), 3);
        assert_eq!(sent[1], SentChunk { bytes: vec![1; 4], fd_count: 0 });
        assert_eq!(sent[2].bytes, vec![2; 8]);
    }

    #[test]
    fn test_send_error_is_fatal() {
        let mock = MockSocket::new();
        mock.script(&[SendStep::Fail(io::ErrorKind::BrokenPipe)]);
        let mut transport = transport(&mock);
        transport.queue(message(0, 8));

        let err = transport.flush().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }

    #[test]
    fn test_receive_collects_bytes_and_fds() {
        let mock = MockSocket::new();
        let (fd, _peer) = UnixStream::pair().unwrap();
        mock.push_inbound_with_fds(vec![1, 2, 3], vec![fd.into()]);
        let mut transport = transport(&mock);

        assert_eq!(transport.receive().unwrap(), Some(3));
        assert_eq!(transport.inbound, vec![1, 2, 3]);
        assert_eq!(transport.incoming_fds.len(), 1);

        // Nothing ready is not an error.
        assert_eq!(transport.receive().unwrap(), None);
    }

    #[test]
    fn test_receive_eof_is_fatal() {
        let mock = MockSocket::new();
        mock.state.borrow_mut().closed = true;
        let mut transport = transport(&mock);

        let err = transport.receive().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }
}
