//! One side of a proxied connection: a plain TCP socket before Enhanced RDP
//! Security is negotiated, or a TLS stream afterward. Both variants expose
//! the same read/write surface so the forwarding loop doesn't care which
//! one it's holding.

use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::os::fd::{AsRawFd, RawFd};

use openssl::ssl::SslStream;

pub enum Channel {
    Plain(TcpStream),
    Tls(SslStream<TcpStream>),
}

impl Channel {
    pub fn raw_fd(&self) -> RawFd {
        match self {
            Channel::Plain(s) => s.as_raw_fd(),
            Channel::Tls(s) => s.get_ref().as_raw_fd(),
        }
    }

    /// Mirrors the reference tool's `read_data`: one 4096-byte read, then
    /// keep reading while the stream keeps handing back full 4096-byte
    /// chunks (a cheap signal that more is already queued).
    pub fn read_available(&mut self) -> io::Result<Vec<u8>> {
        let mut out = Vec::new();
        loop {
            let mut buf = [0u8; 4096];
            let n = match self {
                Channel::Plain(s) => s.read(&mut buf)?,
                Channel::Tls(s) => s.read(&mut buf)?,
            };
            out.extend_from_slice(&buf[..n]);
            if n != 4096 {
                break;
            }
        }
        Ok(out)
    }

    pub fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        match self {
            Channel::Plain(s) => s.write_all(data),
            Channel::Tls(s) => s.write_all(data),
        }
    }
}
