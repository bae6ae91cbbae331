//! Engine tests over a scripted local server.

#![allow(clippy::unwrap_used, missing_docs)]

use std::collections::BTreeMap;
use std::sync::Arc;

use mailwire_net::ProtocolConfig;
use mailwire_nntp::{Error, NntpConnection};

/// Sends `welcome`, then for each step asserts one client line and sends
/// the (possibly empty) reply.
async fn scripted_server(
    welcome: &'static str,
    script: Vec<(&'static str, &'static str)>,
) -> u16 {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
        let (sock, _) = listener.accept().await.unwrap();
        let (read, mut write) = sock.into_split();
        let mut reader = BufReader::new(read);

        write.write_all(welcome.as_bytes()).await.unwrap();

        for (expect, reply) in script {
            let mut line = String::new();
            reader.read_line(&mut line).await.unwrap();
            assert_eq!(line.trim_end_matches("\r\n"), expect, "client sent {line:?}");
            if !reply.is_empty() {
                write.write_all(reply.as_bytes()).await.unwrap();
            }
        }
    });

    port
}

fn config(port: u16) -> ProtocolConfig {
    let mut map = BTreeMap::new();
    map.insert("mail.nntp.host".to_string(), "127.0.0.1".to_string());
    map.insert("mail.nntp.port".to_string(), port.to_string());
    ProtocolConfig::new("nntp", Arc::new(map))
}

#[tokio::test]
async fn welcome_classifies_posting_permission() {
    let port = scripted_server(
        "200 news.example.com ready\r\n",
        vec![(
            "LIST EXTENSIONS",
            "202 extensions\r\nSASL PLAIN\r\nOVER\r\n.\r\n",
        )],
    )
    .await;

    let conn = NntpConnection::connect(&config(port)).await.unwrap();
    assert!(conn.posting_allowed());
    assert_eq!(conn.capabilities().get("SASL"), Some("PLAIN"));
    assert!(conn.capabilities().contains("OVER"));
}

#[tokio::test]
async fn read_only_welcome() {
    let port = scripted_server(
        "201 news.example.com no posting\r\n",
        vec![("LIST EXTENSIONS", "500 what?\r\n")],
    )
    .await;

    let conn = NntpConnection::connect(&config(port)).await.unwrap();
    assert!(!conn.posting_allowed());
}

#[tokio::test]
async fn authinfo_user_pass_two_step() {
    let port = scripted_server(
        "200 ready\r\n",
        vec![
            ("AUTHINFO USER joe", "381 password required\r\n"),
            ("AUTHINFO PASS sesame", "281 authenticated\r\n"),
        ],
    )
    .await;

    let tcp = tokio::net::TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    let mut conn = NntpConnection::from_stream(
        mailwire_net::MailStream::plain(tcp),
        "127.0.0.1",
    )
    .await
    .unwrap();

    conn.authinfo_user_pass("joe", "sesame").await.unwrap();
    assert!(conn.is_authenticated());
}

#[tokio::test]
async fn authinfo_user_accepted_without_password() {
    let port = scripted_server(
        "200 ready\r\n",
        vec![("AUTHINFO USER trusted", "281 authenticated\r\n")],
    )
    .await;

    let tcp = tokio::net::TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    let mut conn = NntpConnection::from_stream(
        mailwire_net::MailStream::plain(tcp),
        "127.0.0.1",
    )
    .await
    .unwrap();

    conn.authinfo_user_pass("trusted", "ignored").await.unwrap();
    assert!(conn.is_authenticated());
}

#[tokio::test]
async fn authinfo_simple_continuation() {
    let port = scripted_server(
        "200 ready\r\n",
        vec![
            ("AUTHINFO SIMPLE", "350 continue\r\n"),
            ("joe sesame", "250 ok\r\n"),
        ],
    )
    .await;

    let tcp = tokio::net::TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    let mut conn = NntpConnection::from_stream(
        mailwire_net::MailStream::plain(tcp),
        "127.0.0.1",
    )
    .await
    .unwrap();

    conn.authinfo_simple("joe", "sesame").await.unwrap();
    assert!(conn.is_authenticated());
}

#[tokio::test]
async fn post_is_dot_stuffed() {
    let port = scripted_server(
        "200 ready\r\n",
        vec![
            ("POST", "340 send article\r\n"),
            // The article arrives line by line, stuffed, then the terminator.
            ("Subject: test", ""),
            ("", ""),
            ("..leading dot", ""),
            ("body", ""),
            (".", "240 article received\r\n"),
        ],
    )
    .await;

    let tcp = tokio::net::TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    let mut conn = NntpConnection::from_stream(
        mailwire_net::MailStream::plain(tcp),
        "127.0.0.1",
    )
    .await
    .unwrap();

    conn.post(b"Subject: test\r\n\r\n.leading dot\r\nbody\r\n")
        .await
        .unwrap();
}

#[tokio::test]
async fn post_refused_on_read_only_connection() {
    let port = scripted_server("201 no posting\r\n", Vec::new()).await;

    let tcp = tokio::net::TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    let mut conn = NntpConnection::from_stream(
        mailwire_net::MailStream::plain(tcp),
        "127.0.0.1",
    )
    .await
    .unwrap();

    // from_stream leaves posting_allowed at the welcome's verdict (201).
    let err = conn.post(b"x").await.unwrap_err();
    assert!(matches!(err, Error::PostingNotAllowed));
}

#[tokio::test]
async fn group_and_article_reads() {
    let port = scripted_server(
        "200 ready\r\n",
        vec![
            ("GROUP comp.lang.rust", "211 1234 3000234 3002567 comp.lang.rust\r\n"),
            (
                "ARTICLE <id@example.com>",
                "220 3000234 <id@example.com>\r\nSubject: hi\r\n\r\n..stuffed\r\n.\r\n",
            ),
        ],
    )
    .await;

    let tcp = tokio::net::TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    let mut conn = NntpConnection::from_stream(
        mailwire_net::MailStream::plain(tcp),
        "127.0.0.1",
    )
    .await
    .unwrap();

    let group = conn.group("comp.lang.rust").await.unwrap();
    assert_eq!(group.count, 1234);
    assert_eq!(group.first, 3_000_234);
    assert_eq!(group.last, 3_002_567);

    let article = conn.article("<id@example.com>").await.unwrap();
    assert_eq!(article, b"Subject: hi\r\n\r\n.stuffed\r\n");
}
