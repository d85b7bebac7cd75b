//! adb host protocol framing.
//!
//! Requests and payloads are prefixed with their byte length as four hex
//! digits. Every request is answered with `OKAY` or with `FAIL` followed by a
//! length-prefixed message.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

use crate::{
    device::{DeviceState, RawDevice},
    error::BridgeError,
};

const OKAY: &[u8; 4] = b"OKAY";
const FAIL: &[u8; 4] = b"FAIL";
const MAX_PAYLOAD: usize = 0xFFFF;

/// Frame `payload` as a host request.
///
/// # Errors
/// Fails if the payload does not fit in a four-digit length header.
pub fn encode_request(payload: &str) -> Result<Vec<u8>, BridgeError> {
    if payload.len() > MAX_PAYLOAD {
        return Err(BridgeError::Protocol(format!(
            "request of {} bytes exceeds the {MAX_PAYLOAD} byte limit",
            payload.len()
        )));
    }
    let mut frame = format!("{:04x}", payload.len()).into_bytes();
    frame.extend_from_slice(payload.as_bytes());
    Ok(frame)
}

/// Send one request and wait for its `OKAY`.
///
/// # Errors
/// I/O failures, a `FAIL` reply or an unknown status word.
pub async fn send_request<S>(stream: &mut S, payload: &str) -> Result<(), BridgeError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    debug!("adb <- {payload}");
    stream.write_all(&encode_request(payload)?).await?;
    stream.flush().await?;
    read_status(stream, payload).await
}

/// Read the four-byte status that answers `request`.
///
/// # Errors
/// [`BridgeError::Rejected`] on `FAIL`, [`BridgeError::Protocol`] on anything
/// that is neither `OKAY` nor `FAIL`.
pub async fn read_status<S>(stream: &mut S, request: &str) -> Result<(), BridgeError>
where
    S: AsyncRead + Unpin,
{
    let mut status = [0u8; 4];
    stream.read_exact(&mut status).await?;
    match &status {
        OKAY => Ok(()),
        FAIL => {
            let message = read_length_prefixed(stream).await?;
            Err(BridgeError::Rejected {
                request: request.to_string(),
                message,
            })
        }
        other => Err(BridgeError::Protocol(format!(
            "unexpected status {:?} for `{request}`",
            String::from_utf8_lossy(other)
        ))),
    }
}

/// Read one length-prefixed payload, or `None` if the peer closed the
/// connection cleanly before the next header.
///
/// # Errors
/// I/O failures, a malformed header, or a connection closed mid-frame.
pub async fn read_frame<S>(stream: &mut S) -> Result<Option<String>, BridgeError>
where
    S: AsyncRead + Unpin,
{
    let mut header = [0u8; 4];
    let mut filled = 0;
    while filled < header.len() {
        let read = stream.read(&mut header[filled..]).await?;
        if read == 0 {
            if filled == 0 {
                return Ok(None);
            }
            return Err(BridgeError::Protocol(
                "connection closed inside a length header".to_string(),
            ));
        }
        filled += read;
    }

    let len = parse_length(&header)?;
    let mut body = vec![0u8; len];
    stream.read_exact(&mut body).await?;
    Ok(Some(String::from_utf8_lossy(&body).into_owned()))
}

/// Read one length-prefixed payload that must be present.
///
/// # Errors
/// Same as [`read_frame`], plus an error when the connection is already closed.
pub async fn read_length_prefixed<S>(stream: &mut S) -> Result<String, BridgeError>
where
    S: AsyncRead + Unpin,
{
    read_frame(stream).await?.ok_or_else(|| {
        BridgeError::Protocol("connection closed before the expected payload".to_string())
    })
}

fn parse_length(header: &[u8; 4]) -> Result<usize, BridgeError> {
    std::str::from_utf8(header)
        .ok()
        .and_then(|digits| usize::from_str_radix(digits, 16).ok())
        .ok_or_else(|| {
            BridgeError::Protocol(format!(
                "invalid length header {:?}",
                String::from_utf8_lossy(header)
            ))
        })
}

/// Parse the `serial<TAB>state` lines of `host:devices` and
/// `host:track-devices`.
#[must_use]
pub fn parse_device_list(payload: &str) -> Vec<RawDevice> {
    payload
        .lines()
        .map(|line| line.trim_end_matches('\r'))
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| {
            let Some((serial, state)) = line.split_once('\t') else {
                debug!("Skipping malformed device line {line:?}");
                return None;
            };
            let serial = serial.trim();
            if serial.is_empty() {
                debug!("Skipping device line without serial {line:?}");
                return None;
            }
            Some(RawDevice::new(serial, DeviceState::from_adb(state.trim())))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use tokio::io::duplex;

    use super::*;

    #[test]
    fn requests_carry_hex_length() {
        assert_eq!(encode_request("host:devices").unwrap(), b"000chost:devices");
        assert_eq!(
            encode_request("host:transport:emulator-5554").unwrap(),
            b"001chost:transport:emulator-5554"
        );
    }

    #[test]
    fn oversized_request_is_rejected() {
        let payload = "x".repeat(MAX_PAYLOAD + 1);
        assert!(matches!(
            encode_request(&payload),
            Err(BridgeError::Protocol(_))
        ));
    }

    #[tokio::test]
    async fn okay_status_is_accepted() {
        let (mut client, mut server) = duplex(64);
        server.write_all(b"OKAY").await.unwrap();
        read_status(&mut client, "host:version").await.unwrap();
    }

    #[tokio::test]
    async fn fail_status_carries_server_message() {
        let (mut client, mut server) = duplex(64);
        server.write_all(b"FAIL0010device not found").await.unwrap();

        let err = read_status(&mut client, "host:transport:abc")
            .await
            .unwrap_err();
        match err {
            BridgeError::Rejected { request, message } => {
                assert_eq!(request, "host:transport:abc");
                assert_eq!(message, "device not found");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn unknown_status_is_a_protocol_error() {
        let (mut client, mut server) = duplex(64);
        server.write_all(b"WHAT").await.unwrap();
        assert!(matches!(
            read_status(&mut client, "host:version").await,
            Err(BridgeError::Protocol(_))
        ));
    }

    #[tokio::test]
    async fn frames_are_split_on_length_headers() {
        let (mut client, mut server) = duplex(256);
        server
            .write_all(b"0010serial-1\tdevice\n0000")
            .await
            .unwrap();
        drop(server);

        assert_eq!(
            read_frame(&mut client).await.unwrap().as_deref(),
            Some("serial-1\tdevice\n")
        );
        assert_eq!(read_frame(&mut client).await.unwrap().as_deref(), Some(""));
        assert_eq!(read_frame(&mut client).await.unwrap(), None);
    }

    #[tokio::test]
    async fn truncated_header_is_an_error() {
        let (mut client, mut server) = duplex(64);
        server.write_all(b"00").await.unwrap();
        drop(server);
        assert!(matches!(
            read_frame(&mut client).await,
            Err(BridgeError::Protocol(_))
        ));
    }

    #[tokio::test]
    async fn send_request_writes_frame_and_reads_status() {
        let (mut client, mut server) = duplex(64);
        let server_task = tokio::spawn(async move {
            let mut request = [0u8; 16];
            server.read_exact(&mut request).await.unwrap();
            server.write_all(b"OKAY").await.unwrap();
            request
        });

        send_request(&mut client, "host:devices").await.unwrap();
        assert_eq!(&server_task.await.unwrap(), b"000chost:devices");
    }

    #[test]
    fn device_list_skips_blank_and_malformed_lines() {
        let devices = parse_device_list(
            "emulator-5554\tdevice\r\n\nR58M12ABC\tunauthorized\ngarbage line\n\toffline\n",
        );
        assert_eq!(
            devices,
            vec![
                RawDevice::new("emulator-5554", DeviceState::Device),
                RawDevice::new("R58M12ABC", DeviceState::Unauthorized),
            ]
        );
    }
}
