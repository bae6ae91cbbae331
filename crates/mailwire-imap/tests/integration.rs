//! Engine-level tests over mock streams, plus the parser round-trip
//! property.

#![allow(clippy::unwrap_used, missing_docs)]

use mailwire_imap::{
    Command, FetchAttribute, FetchItem, FetchItems, ImapConnection, Mailbox, Response,
    ResponseParser, SequenceSet, Status, UntaggedResponse,
};
use mailwire_net::MailStream;
use proptest::prelude::*;

mod engine {
    use super::*;
    use mailwire_imap::{Dispatch, UnsolicitedHandler};

    /// Runs a scripted server on a local socket. Each step optionally
    /// asserts the exact client bytes (`None` reads and discards one
    /// line), then sends the scripted reply.
    async fn connect_scripted(script: Vec<(Option<Vec<u8>>, Vec<u8>)>) -> ImapConnection {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            use tokio::io::{AsyncReadExt, AsyncWriteExt};
            let (mut sock, _) = listener.accept().await.unwrap();
            sock.write_all(b"* OK IMAP4rev1 ready\r\n").await.unwrap();

            for (expect, reply) in script {
                match expect {
                    Some(expect) => {
                        let mut got = vec![0u8; expect.len()];
                        sock.read_exact(&mut got).await.unwrap();
                        assert_eq!(
                            got,
                            expect,
                            "client sent {:?}",
                            String::from_utf8_lossy(&got)
                        );
                    }
                    None => {
                        // Read one line without asserting its content.
                        let mut line = Vec::new();
                        let mut byte = [0u8; 1];
                        loop {
                            sock.read_exact(&mut byte).await.unwrap();
                            line.push(byte[0]);
                            if line.ends_with(b"\r\n") {
                                break;
                            }
                        }
                    }
                }
                sock.write_all(&reply).await.unwrap();
            }
        });

        let tcp = tokio::net::TcpStream::connect(addr).await.unwrap();
        ImapConnection::from_stream(MailStream::plain(tcp), "127.0.0.1")
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn login_and_select() {
        let mut conn = connect_scripted(vec![
            (
                Some(b"A0001 LOGIN joe sesame\r\n".to_vec()),
                b"A0001 OK LOGIN completed\r\n".to_vec(),
            ),
            (
                Some(b"A0002 SELECT INBOX\r\n".to_vec()),
                b"* 17 EXISTS\r\n* 2 RECENT\r\n* FLAGS (\\Seen \\Deleted)\r\n\
                  * OK [UIDVALIDITY 3857529045] UIDs valid\r\n\
                  A0002 OK [READ-WRITE] SELECT completed\r\n"
                    .to_vec(),
            ),
        ])
        .await;

        conn.login("joe", "sesame").await.unwrap();
        assert!(conn.is_authenticated());

        let status = conn.select(&Mailbox::new("INBOX")).await.unwrap();
        assert_eq!(status.exists, 17);
        assert_eq!(status.recent, 2);
        assert!(!status.read_only);
        assert_eq!(status.uid_validity.unwrap().get(), 3_857_529_045);
        assert_eq!(conn.selected().unwrap().0.as_str(), "INBOX");
    }

    #[tokio::test]
    async fn fetch_with_literal_body() {
        let mut conn = connect_scripted(vec![(
            Some(b"A0001 FETCH 1 BODY.PEEK[HEADER]\r\n".to_vec()),
            b"* 1 FETCH (BODY[HEADER] {23}\r\nSubject: hi\r\nDate: x\r\n\r\n)\r\n\
              A0001 OK FETCH completed\r\n"
                .to_vec(),
        )])
        .await;

        let set = SequenceSet::single(1).unwrap();
        let items = FetchItems::Items(vec![FetchAttribute::Body {
            section: Some("HEADER".to_string()),
            peek: true,
            partial: None,
        }]);
        let result = conn.fetch(&set, items, false).await.unwrap();

        assert_eq!(result.len(), 1);
        let (seq, items) = &result[0];
        assert_eq!(seq.get(), 1);
        match &items[0] {
            FetchItem::Body { section, data, .. } => {
                assert_eq!(section.as_deref(), Some("HEADER"));
                assert_eq!(
                    data.as_deref(),
                    Some(b"Subject: hi\r\nDate: x\r\n\r\n".as_slice())
                );
            }
            other => panic!("expected Body, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn literal_argument_waits_for_continuation() {
        let mut conn = connect_scripted(vec![
            (
                Some(b"A0001 LOGIN joe {5}\r\n".to_vec()),
                b"+ Ready for literal\r\n".to_vec(),
            ),
            (
                Some("p\u{e4}ss\r\n".as_bytes().to_vec()),
                b"A0001 OK LOGIN completed\r\n".to_vec(),
            ),
        ])
        .await;

        conn.login("joe", "p\u{e4}ss").await.unwrap();
        assert!(conn.is_authenticated());
    }

    #[tokio::test]
    async fn unsolicited_dispatch_order_and_attachment() {
        struct Recorder {
            seen: std::sync::Arc<std::sync::Mutex<Vec<String>>>,
        }
        impl UnsolicitedHandler for Recorder {
            fn handle(&mut self, response: &UntaggedResponse) -> Dispatch {
                match response {
                    UntaggedResponse::Exists(n) => {
                        self.seen.lock().unwrap().push(format!("exists:{n}"));
                        Dispatch::Consumed
                    }
                    UntaggedResponse::Expunge(seq) => {
                        self.seen.lock().unwrap().push(format!("expunge:{seq}"));
                        Dispatch::Consumed
                    }
                    _ => Dispatch::Pass,
                }
            }
        }

        let seen = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let mut conn = connect_scripted(vec![(
            Some(b"A0001 NOOP\r\n".to_vec()),
            b"* 3 EXPUNGE\r\n* 22 EXISTS\r\n* 1 RECENT\r\nA0001 OK NOOP completed\r\n".to_vec(),
        )])
        .await;
        conn.register_handler(Box::new(Recorder {
            seen: std::sync::Arc::clone(&seen),
        }));

        let leftover = conn.noop().await.unwrap();

        // Handlers saw the consumed responses in arrival order.
        assert_eq!(
            seen.lock().unwrap().as_slice(),
            ["expunge:3".to_string(), "exists:22".to_string()]
        );
        // The RECENT response was not consumed and rides on the outcome.
        assert_eq!(leftover, vec![UntaggedResponse::Recent(1)]);
    }

    #[tokio::test]
    async fn authenticate_falls_back_across_mechanisms() {
        // CRAM-MD5 is advertised and rejected; PLAIN then succeeds.
        let mut conn = connect_scripted(vec![
            (
                Some(b"A0001 CAPABILITY\r\n".to_vec()),
                b"* CAPABILITY IMAP4rev1 AUTH=CRAM-MD5 AUTH=PLAIN\r\n\
                  A0001 OK CAPABILITY completed\r\n"
                    .to_vec(),
            ),
            (
                Some(b"A0002 AUTHENTICATE CRAM-MD5\r\n".to_vec()),
                b"+ PDE4OTYuNjk3MTcwOTUyQHBvc3RvZmZpY2UucmVzdG9uLm1jaS5uZXQ+\r\n".to_vec(),
            ),
            (
                // The digest line depends on the HMAC; content not asserted.
                None,
                b"A0002 NO authentication failed\r\n".to_vec(),
            ),
            (
                Some(b"A0003 AUTHENTICATE PLAIN am9lAGpvZQBzZXNhbWU=\r\n".to_vec()),
                b"A0003 OK authenticated\r\n".to_vec(),
            ),
        ])
        .await;

        conn.capability().await.unwrap();
        let creds = mailwire_sasl::Credentials::new("joe", "sesame");
        conn.authenticate(&creds, None, None).await.unwrap();
        assert!(conn.is_authenticated());
    }

    #[tokio::test]
    async fn expunge_collects_sequence_numbers() {
        let mut conn = connect_scripted(vec![(
            Some(b"A0001 EXPUNGE\r\n".to_vec()),
            b"* 3 EXPUNGE\r\n* 3 EXPUNGE\r\n* 5 EXPUNGE\r\nA0001 OK EXPUNGE completed\r\n"
                .to_vec(),
        )])
        .await;

        let expunged = conn.expunge().await.unwrap();
        let nums: Vec<u32> = expunged.iter().map(|s| s.get()).collect();
        assert_eq!(nums, vec![3, 3, 5]);
    }

    #[tokio::test]
    async fn no_completion_maps_to_error() {
        let mut conn = connect_scripted(vec![(
            Some(b"A0001 SELECT Missing\r\n".to_vec()),
            b"A0001 NO [TRYCREATE] no such mailbox\r\n".to_vec(),
        )])
        .await;

        let err = conn.select(&Mailbox::new("Missing")).await.unwrap_err();
        assert!(matches!(err, mailwire_imap::Error::No(_)));
        // A NO completion does not poison the connection.
        assert!(conn.is_open());
    }
}

mod store {
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use mailwire_imap::{OpenMode, Store};
    use mailwire_net::ProtocolConfig;

    fn config(port: u16) -> ProtocolConfig {
        let mut map = BTreeMap::new();
        map.insert("mail.imap.host".to_string(), "127.0.0.1".to_string());
        map.insert("mail.imap.port".to_string(), port.to_string());
        ProtocolConfig::new("imap", Arc::new(map))
    }

    /// One scripted IMAP session: asserts each client line, sends each
    /// reply.
    async fn scripted_server(script: Vec<(&'static str, &'static str)>) -> u16 {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        tokio::spawn(async move {
            use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
            let (sock, _) = listener.accept().await.unwrap();
            let (read, mut write) = sock.into_split();
            let mut reader = BufReader::new(read);

            write.write_all(b"* OK IMAP4rev1 ready\r\n").await.unwrap();

            for (expect, reply) in script {
                let mut line = String::new();
                reader.read_line(&mut line).await.unwrap();
                assert_eq!(line.trim_end_matches("\r\n"), expect, "client sent {line:?}");
                write.write_all(reply.as_bytes()).await.unwrap();
            }
        });

        port
    }

    #[tokio::test]
    async fn store_pools_and_reuses_one_connection() {
        // The handshake connection goes back to the pool; the folder open
        // validates it with NOOP and reuses it. Store close logs it out.
        let port = scripted_server(vec![
            ("A0001 CAPABILITY", "* CAPABILITY IMAP4rev1\r\nA0001 OK done\r\n"),
            ("A0002 LOGIN joe sesame", "A0002 OK LOGIN completed\r\n"),
            ("A0003 NOOP", "A0003 OK NOOP completed\r\n"),
            (
                "A0004 EXAMINE INBOX",
                "* 3 EXISTS\r\n* 0 RECENT\r\nA0004 OK [READ-ONLY] done\r\n",
            ),
            ("A0005 NOOP", "A0005 OK NOOP completed\r\n"),
            (
                "A0006 FETCH 1:3 FLAGS",
                "* 1 FETCH (FLAGS (\\Seen))\r\n* 2 FETCH (FLAGS ())\r\n\
                 * 3 FETCH (FLAGS (\\Deleted))\r\nA0006 OK FETCH completed\r\n",
            ),
            // Store close: the open folder is closed first, then the
            // pooled connection is logged out.
            ("A0007 NOOP", "A0007 OK NOOP completed\r\n"),
            ("A0008 CLOSE", "A0008 OK CLOSE completed\r\n"),
            ("A0009 LOGOUT", "* BYE bye\r\nA0009 OK LOGOUT completed\r\n"),
        ])
        .await;

        let store = Store::new(config(port));
        store.connect("joe", "sesame").await.unwrap();
        assert!(store.is_connected());

        let folder = store.open_folder("INBOX", OpenMode::ReadOnly).await.unwrap();
        assert_eq!(folder.message_count().await, 3);

        let fetched = folder
            .fetch(
                &mailwire_imap::SequenceSet::range(1, 3).unwrap(),
                mailwire_imap::FetchItems::Items(vec![mailwire_imap::FetchAttribute::Flags]),
            )
            .await
            .unwrap();
        assert_eq!(fetched.len(), 3);

        store.close().await.unwrap();
        assert!(!store.is_connected());
    }
}

/// Serializes a response value back to its wire form. Test-side inverse
/// of the parser for the round-trip property.
fn serialize(response: &Response) -> Vec<u8> {
    let mut out = Vec::new();
    match response {
        Response::Tagged {
            tag,
            status,
            code,
            text,
        } => {
            out.extend_from_slice(tag.as_str().as_bytes());
            out.push(b' ');
            out.extend_from_slice(status.as_str().as_bytes());
            out.push(b' ');
            if let Some(code) = code {
                out.extend_from_slice(code.to_wire().as_bytes());
                out.push(b' ');
            }
            out.extend_from_slice(text.as_bytes());
        }
        Response::Continuation { text } => {
            out.push(b'+');
            if let Some(text) = text {
                out.push(b' ');
                out.extend_from_slice(text.as_bytes());
            }
        }
        Response::Untagged(untagged) => {
            out.extend_from_slice(b"* ");
            match untagged {
                UntaggedResponse::Exists(n) => {
                    out.extend_from_slice(format!("{n} EXISTS").as_bytes());
                }
                UntaggedResponse::Recent(n) => {
                    out.extend_from_slice(format!("{n} RECENT").as_bytes());
                }
                UntaggedResponse::Expunge(seq) => {
                    out.extend_from_slice(format!("{seq} EXPUNGE").as_bytes());
                }
                UntaggedResponse::Search(nums) => {
                    out.extend_from_slice(b"SEARCH");
                    for n in nums {
                        out.extend_from_slice(format!(" {n}").as_bytes());
                    }
                }
                UntaggedResponse::Flags(flags) => {
                    out.extend_from_slice(b"FLAGS ");
                    out.extend_from_slice(flags.to_wire().as_bytes());
                }
                UntaggedResponse::Capability(caps) => {
                    out.extend_from_slice(b"CAPABILITY");
                    for cap in caps {
                        out.push(b' ');
                        out.extend_from_slice(cap.as_atom().as_bytes());
                    }
                }
                other => panic!("serializer does not cover {other:?}"),
            }
        }
    }
    out.extend_from_slice(b"\r\n");
    out
}

prop_compose! {
    fn arb_tag()(n in 1u32..9999) -> String {
        format!("A{n:04}")
    }
}

fn arb_status() -> impl Strategy<Value = Status> {
    prop_oneof![
        Just(Status::Ok),
        Just(Status::No),
        Just(Status::Bad),
    ]
}

fn arb_text() -> impl Strategy<Value = String> {
    // Completion text: printable ASCII without CR/LF, not starting with [.
    "[A-Za-z][A-Za-z0-9 .,-]{0,40}"
}

fn arb_untagged() -> impl Strategy<Value = UntaggedResponse> {
    prop_oneof![
        (1u32..100_000).prop_map(UntaggedResponse::Exists),
        (1u32..100_000).prop_map(UntaggedResponse::Recent),
        (1u32..100_000).prop_map(|n| {
            UntaggedResponse::Expunge(mailwire_imap::SeqNum::new(n).unwrap())
        }),
        proptest::collection::vec(1u32..100_000, 0..8).prop_map(|nums| {
            UntaggedResponse::Search(
                nums.into_iter()
                    .map(|n| mailwire_imap::SeqNum::new(n).unwrap())
                    .collect(),
            )
        }),
    ]
}

fn arb_response() -> impl Strategy<Value = Response> {
    prop_oneof![
        (arb_tag(), arb_status(), arb_text()).prop_map(|(tag, status, text)| {
            Response::Tagged {
                tag: mailwire_imap::Tag::new(tag),
                status,
                code: None,
                text,
            }
        }),
        arb_untagged().prop_map(Response::Untagged),
        proptest::option::of(arb_text())
            .prop_map(|text| Response::Continuation { text }),
    ]
}

proptest! {
    /// Parsing is the inverse of serialization for generated responses.
    #[test]
    fn parse_serialize_roundtrip(response in arb_response()) {
        let wire = serialize(&response);
        let parsed = ResponseParser::parse(&wire).unwrap();
        prop_assert_eq!(parsed, response);
    }
}

#[test]
fn command_serialization_has_no_bare_newlines() {
    let cmd = Command::Login {
        username: "user".to_string(),
        password: "secret".to_string(),
    };
    for part in cmd.parts("A0001") {
        if let mailwire_imap::CommandPart::Text(text) = part {
            let mut i = 0;
            while i < text.len() {
                if text[i] == b'\n' {
                    assert!(i > 0 && text[i - 1] == b'\r', "bare LF in command");
                }
                i += 1;
            }
            assert!(text.ends_with(b"\r\n") || text.ends_with(b"}\r\n"));
        }
    }
}

