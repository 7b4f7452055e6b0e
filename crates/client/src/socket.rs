//! Socket I/O with file-descriptor passing.
//!
//! [`Socket`] is the seam between the transport and the operating system.
//! The [`UnixStream`] implementation uses `sendmsg`/`recvmsg` with
//! `SCM_RIGHTS` control messages.

use std::collections::VecDeque;
use std::io;
use std::mem;
use std::net::Shutdown;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::os::unix::net::UnixStream;
use std::ptr;

/// Most descriptors accepted by a single receive call.
pub const MAX_FDS_PER_RECV: usize = 28;

#[cfg(any(target_os = "linux", target_os = "android"))]
const SEND_FLAGS: libc::c_int = libc::MSG_NOSIGNAL;
#[cfg(not(any(target_os = "linux", target_os = "android")))]
const SEND_FLAGS: libc::c_int = 0;

#[cfg(any(target_os = "linux", target_os = "android"))]
const RECV_FLAGS: libc::c_int = libc::MSG_CMSG_CLOEXEC;
#[cfg(not(any(target_os = "linux", target_os = "android")))]
const RECV_FLAGS: libc::c_int = 0;

/// Byte stream that can carry file descriptors alongside its payload.
///
/// All calls are non-blocking except [`Socket::wait`]; an operation that
/// cannot make progress fails with [`io::ErrorKind::WouldBlock`].
pub trait Socket {
    /// Send bytes with `fds` attached to the first byte. Returns bytes accepted.
    fn send_with_fds(&mut self, bytes: &[u8], fds: &[RawFd]) -> io::Result<usize>;

    /// Send bytes without ancillary data. Returns bytes accepted.
    fn send(&mut self, bytes: &[u8]) -> io::Result<usize>;

    /// Receive up to `buf.len()` bytes, appending any descriptors to `fds`.
    ///
    /// `Ok(0)` means the peer closed the stream.
    fn recv_with_fds(&mut self, buf: &mut [u8], fds: &mut VecDeque<OwnedFd>) -> io::Result<usize>;

    /// Block until the socket is readable, or writable when `writable` is set.
    fn wait(&mut self, _writable: bool) -> io::Result<()> {
        Ok(())
    }

    /// Stop all further I/O.
    fn shutdown(&mut self) {}

    /// Underlying descriptor, for registration with an external poller.
    fn raw_fd(&self) -> Option<RawFd> {
        None
    }
}

impl Socket for UnixStream {
    fn send_with_fds(&mut self, bytes: &[u8], fds: &[RawFd]) -> io::Result<usize> {
        if fds.is_empty() {
            return Socket::send(self, bytes);
        }

        let fd_bytes = mem::size_of_val(fds);
        // SAFETY: CMSG_SPACE is a pure size computation
        let space = unsafe { libc::CMSG_SPACE(fd_bytes as libc::c_uint) } as usize;
        // u64 storage keeps the buffer aligned for cmsghdr
        let mut control = vec![0u64; space.div_ceil(mem::size_of::<u64>())];

        let mut iov = libc::iovec {
            iov_base: bytes.as_ptr() as *mut libc::c_void,
            iov_len: bytes.len(),
        };
        // SAFETY: msghdr is plain data; all-zero is a valid empty header
        let mut msg: libc::msghdr = unsafe { mem::zeroed() };
        msg.msg_iov = &mut iov;
        msg.msg_iovlen = 1;
        msg.msg_control = control.as_mut_ptr().cast();
        msg.msg_controllen = space as _;

        // SAFETY: msg_control points at `space` writable bytes, enough for one
        // header plus `fd_bytes` of payload, so the first header and its data
        // area are in bounds.
        unsafe {
            let cmsg = libc::CMSG_FIRSTHDR(&msg);
            (*cmsg).cmsg_level = libc::SOL_SOCKET;
            (*cmsg).cmsg_type = libc::SCM_RIGHTS;
            (*cmsg).cmsg_len = libc::CMSG_LEN(fd_bytes as libc::c_uint) as _;
            ptr::copy_nonoverlapping(fds.as_ptr().cast::<u8>(), libc::CMSG_DATA(cmsg), fd_bytes);
        }

        // SAFETY: every pointer in msg refers to live buffers owned by this frame
        let sent = unsafe { libc::sendmsg(self.as_raw_fd(), &msg, SEND_FLAGS) };
        if sent < 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(sent as usize)
        }
    }

    fn send(&mut self, bytes: &[u8]) -> io::Result<usize> {
        // SAFETY: the pointer and length describe the borrowed slice
        let sent = unsafe {
            libc::send(
                self.as_raw_fd(),
                bytes.as_ptr().cast(),
                bytes.len(),
                SEND_FLAGS,
            )
        };
        if sent < 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(sent as usize)
        }
    }

    fn recv_with_fds(&mut self, buf: &mut [u8], fds: &mut VecDeque<OwnedFd>) -> io::Result<usize> {
        let fd_bytes = MAX_FDS_PER_RECV * mem::size_of::<RawFd>();
        // SAFETY: CMSG_SPACE is a pure size computation
        let space = unsafe { libc::CMSG_SPACE(fd_bytes as libc::c_uint) } as usize;
        let mut control = vec![0u64; space.div_ceil(mem::size_of::<u64>())];

        let mut iov = libc::iovec {
            iov_base: buf.as_mut_ptr().cast(),
            iov_len: buf.len(),
        };
        // SAFETY: msghdr is plain data; all-zero is a valid empty header
        let mut msg: libc::msghdr = unsafe { mem::zeroed() };
        msg.msg_iov = &mut iov;
        msg.msg_iovlen = 1;
        msg.msg_control = control.as_mut_ptr().cast();
        msg.msg_controllen = space as _;

        // SAFETY: iov and control describe writable buffers that outlive the call
        let received = unsafe { libc::recvmsg(self.as_raw_fd(), &mut msg, RECV_FLAGS) };
        if received < 0 {
            return Err(io::Error::last_os_error());
        }

        if msg.msg_flags & libc::MSG_CTRUNC != 0 {
            tracing::warn!("control data truncated; some file descriptors were dropped");
        }

        // SAFETY: the kernel filled msg_control with msg_controllen bytes of
        // well-formed control messages; CMSG_FIRSTHDR/CMSG_NXTHDR stay within
        // that range and return null at the end.
        unsafe {
            let mut cmsg = libc::CMSG_FIRSTHDR(&msg);
            while !cmsg.is_null() {
                if (*cmsg).cmsg_level == libc::SOL_SOCKET && (*cmsg).cmsg_type == libc::SCM_RIGHTS {
                    let data = libc::CMSG_DATA(cmsg);
                    let header_len = data as usize - cmsg as usize;
                    let count = ((*cmsg).cmsg_len as usize - header_len) / mem::size_of::<RawFd>();
                    for i in 0..count {
                        let raw = ptr::read_unaligned(data.cast::<RawFd>().add(i));
                        // Each received descriptor is new and owned by nobody else
                        fds.push_back(OwnedFd::from_raw_fd(raw));
                    }
                }
                cmsg = libc::CMSG_NXTHDR(&msg, cmsg);
            }
        }

        Ok(received as usize)
    }

    fn wait(&mut self, writable: bool) -> io::Result<()> {
        let mut events = libc::POLLIN;
        if writable {
            events |= libc::POLLOUT;
        }
        let mut pollfd = libc::pollfd {
            fd: self.as_raw_fd(),
            events,
            revents: 0,
        };
        loop {
            // SAFETY: pollfd is a valid single-element array for the call's duration
            let ready = unsafe { libc::poll(&mut pollfd, 1, -1) };
            if ready >= 0 {
                return Ok(());
            }
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::Interrupted {
                return Err(err);
            }
        }
    }

    fn shutdown(&mut self) {
        let _ = UnixStream::shutdown(self, Shutdown::Both);
    }

    fn raw_fd(&self) -> Option<RawFd> {
        Some(self.as_raw_fd())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::{Read, Seek, SeekFrom, Write};

    fn pair() -> (UnixStream, UnixStream) {
        let (a, b) = UnixStream::pair().unwrap();
        a.set_nonblocking(true).unwrap();
        b.set_nonblocking(true).unwrap();
        (a, b)
    }

    #[test]
    fn test_bytes_without_fds() {
        let (mut a, mut b) = pair();
        assert_eq!(Socket::send(&mut a, b"ping").unwrap(), 4);

        let mut buf = [0u8; 16];
        let mut fds = VecDeque::new();
        let n = b.recv_with_fds(&mut buf, &mut fds).unwrap();
        assert_eq!(&buf[..n], b"ping");
        assert!(fds.is_empty());
    }

    #[test]
    fn test_fd_passing() {
        let (mut a, mut b) = pair();

        let path = std::env::temp_dir().join(format!("waylink-fd-{}", std::process::id()));
        let mut file = File::options()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .unwrap();
        file.write_all(b"shared").unwrap();
        std::fs::remove_file(&path).unwrap();

        let sent = a.send_with_fds(b"message!", &[file.as_raw_fd()]).unwrap();
        assert_eq!(sent, 8);

        let mut buf = [0u8; 64];
        let mut fds = VecDeque::new();
        let n = b.recv_with_fds(&mut buf, &mut fds).unwrap();
        assert_eq!(&buf[..n], b"message!");
        assert_eq!(fds.len(), 1);

        // The received descriptor refers to the same open file.
        let mut received = File::from(fds.pop_front().unwrap());
        assert_ne!(received.as_raw_fd(), file.as_raw_fd());
        received.seek(SeekFrom::Start(0)).unwrap();
        let mut contents = String::new();
        received.read_to_string(&mut contents).unwrap();
        assert_eq!(contents, "shared");
    }

    #[test]
    fn test_recv_would_block() {
        let (_a, mut b) = pair();
        let mut buf = [0u8; 8];
        let err = b.recv_with_fds(&mut buf, &mut VecDeque::new()).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::WouldBlock);
    }

    #[test]
    fn test_recv_after_peer_close() {
        let (a, mut b) = pair();
        drop(a);
        let mut buf = [0u8; 8];
        assert_eq!(b.recv_with_fds(&mut buf, &mut VecDeque::new()).unwrap(), 0);
    }
}
