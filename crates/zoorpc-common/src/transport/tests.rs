//! Integration tests for the transport layer
//!
//! These tests verify frame encoding against the wire layout and exercise
//! the TCP transport against a local listener.

#[cfg(test)]
mod tests {
    use crate::protocol::responses::{ResponsePayload, STATUS_OK, STATUS_SERVER_ERROR};
    use crate::protocol::{Argument, Invocation, Request, Response, Value, ZoorpcError};
    use crate::transport::frame::{
        FrameHeader, FLAG_REQUEST, FLAG_TWO_WAY, HESSIAN2_SERIALIZATION_ID,
    };
    use crate::transport::{body_length, DubboCodec, FrameTransport, HEADER_LENGTH};
    use std::collections::BTreeMap;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn sample_request() -> Request {
        let invocation = Invocation::new("com.example.UserService", "findUser")
            .with_version(Some("1.0.0".to_string()))
            .with_group(Some("blue".to_string()))
            .with_timeout(2500)
            .with_attachment("remote.application", "billing")
            .with_arguments(vec![
                Argument::new(42i64),
                Argument::typed("java.lang.String", "active"),
            ]);
        Request::new(invocation).with_id(77)
    }

    #[test]
    fn test_request_header() {
        let frame = DubboCodec::encode_request(&sample_request()).unwrap();

        assert_eq!(&frame[..2], &[0xda, 0xbb]);
        assert_eq!(
            frame[2],
            FLAG_REQUEST | FLAG_TWO_WAY | HESSIAN2_SERIALIZATION_ID
        );
        assert_eq!(frame[2], 0xc2);
        assert_eq!(frame[3], 0);
        assert_eq!(&frame[4..12], &77u64.to_be_bytes());
        assert_eq!(body_length(&frame).unwrap(), frame.len() - HEADER_LENGTH);
    }

    #[test]
    fn test_request_body_starts_with_identity() {
        let frame = DubboCodec::encode_request(&sample_request()).unwrap();
        let body = &frame[HEADER_LENGTH..];

        // "2.5.3.6" as a compact string
        assert_eq!(body[0], 7);
        assert_eq!(&body[1..8], b"2.5.3.6");
        assert_eq!(body[8], "com.example.UserService".len() as u8);
    }

    #[test]
    fn test_encoding_is_deterministic() {
        let request = sample_request();
        assert_eq!(
            DubboCodec::encode_request(&request).unwrap(),
            DubboCodec::encode_request(&request).unwrap()
        );
    }

    #[test]
    fn test_decode_request_restores_invocation() {
        let request = sample_request();
        let frame = DubboCodec::encode_request(&request).unwrap();
        let decoded = DubboCodec::decode_request(&frame).unwrap();

        assert_eq!(decoded, request);
        assert_eq!(
            decoded.invocation.attachments.get("remote.application").map(String::as_str),
            Some("billing")
        );
    }

    #[test]
    fn test_empty_argument_request_round_trip() {
        let request =
            Request::new(Invocation::new("com.example.ClockService", "now")).with_id(78);
        assert_eq!(request.invocation.parameter_descriptors(), "");

        let frame = DubboCodec::encode_request(&request).unwrap();
        let decoded = DubboCodec::decode_request(&frame).unwrap();

        assert_eq!(decoded, request);
        assert!(decoded.invocation.arguments.is_empty());
    }

    #[test]
    fn test_request_over_limit_is_refused() {
        let mut request = sample_request();
        request.invocation = request
            .invocation
            .with_max_body_len(64)
            .with_arguments(vec![Argument::new("x".repeat(100))]);

        assert!(matches!(
            DubboCodec::encode_request(&request),
            Err(ZoorpcError::PayloadTooLarge { limit: 64, .. })
        ));
    }

    #[test]
    fn test_response_value() {
        let frame = DubboCodec::encode_response(&Response::success(5, Value::Long(9))).unwrap();
        assert_eq!(frame[3], STATUS_OK);
        assert_eq!(DubboCodec::decode(&frame).unwrap(), Value::Long(9));
    }

    #[test]
    fn test_response_null_value() {
        let frame = DubboCodec::encode_response(&Response::success(5, Value::Null)).unwrap();
        // marker 2 and nothing else
        assert_eq!(&frame[HEADER_LENGTH..], &[0x92]);
        assert_eq!(DubboCodec::decode(&frame).unwrap(), Value::Null);
    }

    #[test]
    fn test_response_with_attachments() {
        let mut attachments = BTreeMap::new();
        attachments.insert("trace".to_string(), "abc".to_string());
        let response = Response::success(6, Value::from("ok")).with_attachments(attachments);

        let frame = DubboCodec::encode_response(&response).unwrap();
        assert_eq!(frame[HEADER_LENGTH], 0x94);

        let decoded = DubboCodec::decode_response(&frame).unwrap();
        assert_eq!(decoded, response);
    }

    #[test]
    fn test_response_exception_is_remote_fault() {
        let exception = Value::Object {
            class: "java.lang.RuntimeException".to_string(),
            fields: vec![
                ("detailMessage".to_string(), Value::from("boom")),
                ("stackTrace".to_string(), Value::List(vec![])),
            ],
        };
        let frame = DubboCodec::encode_response(&Response::exception(8, exception)).unwrap();

        match DubboCodec::decode(&frame) {
            Err(ZoorpcError::RemoteFault { class, message, .. }) => {
                assert_eq!(class.as_deref(), Some("java.lang.RuntimeException"));
                assert_eq!(message, "boom");
            }
            other => panic!("expected remote fault, got {:?}", other),
        }
    }

    #[test]
    fn test_response_error_status() {
        let frame = DubboCodec::encode_response(&Response::error(
            8,
            STATUS_SERVER_ERROR,
            "provider crashed",
        ))
        .unwrap();

        let decoded = DubboCodec::decode_response(&frame).unwrap();
        assert_eq!(
            decoded.payload,
            ResponsePayload::Error("provider crashed".to_string())
        );
        assert!(matches!(
            DubboCodec::decode(&frame),
            Err(ZoorpcError::RemoteStatus { status: STATUS_SERVER_ERROR, .. })
        ));
    }

    #[test]
    fn test_deeply_nested_response_is_an_error() {
        // marker 1, then single-element lists nested far past the decoder limit
        let mut body = vec![0x91];
        body.extend(std::iter::repeat(0x79).take(200_000));
        body.push(b'N');

        let mut frame = Vec::new();
        FrameHeader {
            flag: HESSIAN2_SERIALIZATION_ID,
            status: STATUS_OK,
            request_id: 9,
            body_length: body.len(),
        }
        .write(&mut frame)
        .unwrap();
        frame.extend_from_slice(&body);

        assert!(matches!(
            DubboCodec::decode(&frame),
            Err(ZoorpcError::Serialization(_))
        ));
    }

    #[test]
    fn test_decode_rejects_malformed_frames() {
        assert!(DubboCodec::decode(&[0xda, 0xbb, 0x02]).is_err());

        let mut frame = DubboCodec::encode_response(&Response::success(1, Value::Int(1))).unwrap();
        frame.truncate(frame.len() - 1);
        assert!(matches!(
            DubboCodec::decode(&frame),
            Err(ZoorpcError::InvalidResponse(_))
        ));

        let mut frame = DubboCodec::encode_response(&Response::success(1, Value::Int(1))).unwrap();
        frame[HEADER_LENGTH] = 0x99; // marker 9
        assert!(matches!(
            DubboCodec::decode(&frame),
            Err(ZoorpcError::InvalidResponse(_))
        ));

        let request_frame = DubboCodec::encode_request(&sample_request()).unwrap();
        assert!(DubboCodec::decode_response(&request_frame).is_err());
    }

    #[tokio::test]
    async fn test_transport_round_trip_with_split_writes() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 4096];
            let n = socket.read(&mut buf).await.unwrap();
            let request = DubboCodec::decode_request(&buf[..n]).unwrap();

            let reply = DubboCodec::encode_response(&Response::success(
                request.id,
                Value::from("x".repeat(20_000)),
            ))
            .unwrap();
            // header split across writes, then the body in pieces
            socket.write_all(&reply[..7]).await.unwrap();
            socket.flush().await.unwrap();
            for piece in reply[7..].chunks(3000) {
                socket.write_all(piece).await.unwrap();
                socket.flush().await.unwrap();
            }
        });

        let transport = FrameTransport::new(1024 * 1024);
        let mut stream = transport.connect(&addr).await.unwrap();
        let request = sample_request();
        transport
            .send_frame(&mut stream, &DubboCodec::encode_request(&request).unwrap())
            .await
            .unwrap();

        let frame = transport.receive_frame(&mut stream).await.unwrap();
        let response = DubboCodec::decode_response(&frame).unwrap();
        assert_eq!(response.id, request.id);
        assert_eq!(response.into_result().unwrap(), Value::from("x".repeat(20_000)));
    }

    #[tokio::test]
    async fn test_transport_reports_bytes_before_close() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let reply = DubboCodec::encode_response(&Response::success(1, Value::Int(3))).unwrap();
            socket.write_all(&reply[..10]).await.unwrap();
            socket.shutdown().await.unwrap();
        });

        let transport = FrameTransport::new(1024);
        let mut stream = transport.connect(&addr).await.unwrap();
        let err = transport.receive_frame(&mut stream).await.unwrap_err();
        assert!(matches!(err, ZoorpcError::ConnectionClosed { received: 10 }));
        assert!(!err.is_failover_eligible());
    }

    #[tokio::test]
    async fn test_transport_close_without_bytes() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            drop(socket);
        });

        let transport = FrameTransport::new(1024);
        let mut stream = transport.connect(&addr).await.unwrap();
        let err = transport.receive_frame(&mut stream).await.unwrap_err();
        assert!(matches!(err, ZoorpcError::ConnectionClosed { received: 0 }));
        assert!(err.is_failover_eligible());
    }
}
