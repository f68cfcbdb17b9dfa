//! TLS wrap for the upgraded connection. Client-side terminates with the
//! operator-supplied certificate/key; server-side first attempts the
//! legacy `RC4-SHA` cipher suite real RDP servers still advertise for
//! Enhanced RDP Security, falling back to the library default on failure.

use std::net::TcpStream;

use anyhow::{Context, Result};
use openssl::ssl::{SslAcceptor, SslConnector, SslFiletype, SslMethod, SslStream};

pub fn build_acceptor(certfile: &str, keyfile: &str) -> Result<SslAcceptor> {
    let mut builder = SslAcceptor::mozilla_intermediate_v5(SslMethod::tls())
        .context("failed to initialize TLS acceptor")?;
    builder
        .set_private_key_file(keyfile, SslFiletype::PEM)
        .with_context(|| format!("failed to load key file {keyfile}"))?;
    builder
        .set_certificate_chain_file(certfile)
        .with_context(|| format!("failed to load certificate file {certfile}"))?;
    builder.check_private_key().context("certificate/key mismatch")?;
    Ok(builder.build())
}

/// Wrap the already-connected client socket server-side, terminating TLS
/// with our forged certificate.
pub fn accept_client(acceptor: &SslAcceptor, stream: TcpStream) -> Result<SslStream<TcpStream>> {
    acceptor.accept(stream).context("TLS handshake with client failed")
}

/// Wrap the outbound socket to the real server, first with `RC4-SHA` (what
/// the reference tool assumes the target still speaks), then with the
/// library's default cipher list if that's refused.
pub fn connect_server(stream: TcpStream) -> Result<SslStream<TcpStream>> {
    match connect_with_ciphers(&stream, Some("RC4-SHA")) {
        Ok(s) => Ok(s),
        Err(_) => connect_with_ciphers(&stream, None),
    }
}

fn connect_with_ciphers(stream: &TcpStream, ciphers: Option<&str>) -> Result<SslStream<TcpStream>> {
    let mut builder = SslConnector::builder(SslMethod::tls()).context("failed to initialize TLS connector")?;
    builder.set_verify(openssl::ssl::SslVerifyMode::NONE);
    if let Some(list) = ciphers {
        builder.set_cipher_list(list).context("unsupported cipher list")?;
    }
    let connector = builder.build();
    let stream = stream.try_clone().context("failed to clone socket for TLS connect")?;
    connector
        .configure()
        .context("failed to configure TLS connector")?
        .verify_hostname(false)
        .connect("", stream)
        .map_err(|e| anyhow::anyhow!("TLS handshake with target server failed: {e}"))
}
