//! Runs every extractor over one already-decrypted frame, in the same
//! order the reference tool's `parse_rdp_packet` checks its regexes.
//! Every extractor always runs — for its session-state side effects —
//! even when an earlier one already produced the line this frame will
//! log; a parse failure from any one of them is swallowed, never
//! propagated, since the next PDU may still be useful.

use rdp_mitm_proto::extract;
use rdp_mitm_proto::session::Session;

/// Returns the finding line to log for this frame, if any.
pub fn parse_frame(bytes: &[u8], from_client: bool, session: &mut Session) -> Option<String> {
    let mut finding = None;

    if let Ok(Some(line)) = extract::extract_client_info(bytes) {
        finding = Some(line);
    }
    if let Some(line) = extract::extract_server_challenge(bytes, session) {
        finding = Some(line);
    }
    if let Ok(Some(line)) = extract::extract_ntlmv2(bytes, session) {
        finding = Some(line);
    }
    if let Some(line) = extract::extract_client_random(bytes, session) {
        finding = Some(line);
    }
    if let Ok(Some(line)) = extract::extract_server_cert(bytes, session) {
        finding = Some(line);
    }
    if from_client {
        if let Some(info) = extract::extract_keyboard_layout(bytes) {
            session.captured.keyboard_info = Some(info);
            finding = Some(format!(
                "Keyboard layout: {:#x} type={} subtype={} funckey={}",
                info.layout, info.kind, info.subtype, info.funckey
            ));
        }
    }

    if finding.is_none() && bytes.len() > 3 && matches!(bytes[bytes.len() - 2], 0..=3) {
        finding = extract::extract_key_press(bytes);
    }

    finding
}
