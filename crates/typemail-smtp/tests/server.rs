//! Integration tests for the server connection.
//!
//! Each test drives one connection over an in-memory pipe with raw SMTP lines.

mod common;

use common::{Accounts, Peer, spawn_connection};
use typemail_smtp::server::{ConnectionEvent, ServerConfig};

const GREETING: &str = "220 localhost ESMTP @typemail/smtp";

fn messages(events: &[ConnectionEvent]) -> Vec<&typemail_smtp::Message> {
    events
        .iter()
        .filter_map(|event| match event {
            ConnectionEvent::Message(message) => Some(message),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn test_sample_session() {
    let (stream, handle) = spawn_connection(ServerConfig::default());
    let mut peer = Peer::new(stream);

    peer.expect(GREETING).await;
    peer.send("EHLO client.example.com").await;
    assert_eq!(
        peer.reply().await,
        [
            "250-localhost, greeting accepted.",
            "250-SMTPUTF8",
            "250-PIPELINING",
            "250-8BITMIME",
            "250 SIZE 10000000",
        ]
    );

    peer.command("MAIL FROM:<a@localhost>", "250 Ok").await;
    peer.command("RCPT TO:<b@localhost>", "250 Ok").await;
    peer.command("DATA", "354 Start mail input; end with <CRLF>.<CRLF>")
        .await;
    peer.send("Test").await;
    peer.command(".", "250 Ok").await;
    peer.command("QUIT", "221 Bye").await;
    peer.expect_closed().await;

    let events = handle.await.unwrap();
    let received = messages(&events);
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].sender, "a@localhost");
    assert_eq!(received[0].recipients, ["b@localhost"]);
    assert_eq!(received[0].message, "Test");
    assert!(matches!(events.last(), Some(ConnectionEvent::Closed)));
}

#[tokio::test]
async fn test_verbs_are_case_insensitive() {
    let (stream, handle) = spawn_connection(ServerConfig::default());
    let mut peer = Peer::new(stream);

    peer.expect(GREETING).await;
    peer.command("helo client", "250 localhost, greeting accepted.")
        .await;
    peer.command("mail from:<a@localhost>", "250 Ok").await;
    peer.command("rcpt to:<b@localhost>", "250 Ok").await;
    peer.command("rcpt to:<b@localhost>", "250 Ok").await;
    peer.command("data", "354 Start mail input; end with <CRLF>.<CRLF>")
        .await;
    peer.send("Subject: hi").await;
    peer.send("").await;
    peer.send("..leading dot").await;
    peer.command(".", "250 Ok").await;
    peer.command("quit", "221 Bye").await;

    let events = handle.await.unwrap();
    let received = messages(&events);
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].recipients, ["b@localhost", "b@localhost"]);
    assert_eq!(received[0].message, "Subject: hi\r\n\r\n.leading dot");
}

#[tokio::test]
async fn test_rcpt_before_mail_is_out_of_sequence() {
    let (stream, handle) = spawn_connection(ServerConfig::default());
    let mut peer = Peer::new(stream);

    peer.expect(GREETING).await;
    peer.command("HELO client", "250 localhost, greeting accepted.")
        .await;
    peer.command("RCPT TO:<b@localhost>", "503 Bad sequence of commands")
        .await;
    peer.expect_closed().await;

    let events = handle.await.unwrap();
    assert!(messages(&events).is_empty());
}

#[tokio::test]
async fn test_data_without_recipients_is_out_of_sequence() {
    let (stream, _handle) = spawn_connection(ServerConfig::default());
    let mut peer = Peer::new(stream);

    peer.expect(GREETING).await;
    peer.command("HELO client", "250 localhost, greeting accepted.")
        .await;
    peer.command("MAIL FROM:<a@localhost>", "250 Ok").await;
    peer.command("DATA", "503 Bad sequence of commands").await;
    peer.expect_closed().await;
}

#[tokio::test]
async fn test_second_helo_is_out_of_sequence() {
    let (stream, _handle) = spawn_connection(ServerConfig::default());
    let mut peer = Peer::new(stream);

    peer.expect(GREETING).await;
    peer.command("HELO client", "250 localhost, greeting accepted.")
        .await;
    peer.command("EHLO client", "503 Bad sequence of commands").await;
    peer.expect_closed().await;
}

#[tokio::test]
async fn test_missing_sender_is_a_syntax_error() {
    let (stream, _handle) = spawn_connection(ServerConfig::default());
    let mut peer = Peer::new(stream);

    peer.expect(GREETING).await;
    peer.command("HELO client", "250 localhost, greeting accepted.")
        .await;
    peer.command("MAIL", "501 Syntax error in parameters")
        .await;
    peer.expect_closed().await;
}

#[tokio::test]
async fn test_rset_clears_transaction() {
    let (stream, _handle) = spawn_connection(ServerConfig::default());
    let mut peer = Peer::new(stream);

    peer.expect(GREETING).await;
    peer.command("HELO client", "250 localhost, greeting accepted.")
        .await;
    peer.command("MAIL FROM:<a@localhost>", "250 Ok").await;
    peer.command("RSET", "250 Ok").await;
    peer.command("RCPT TO:<b@localhost>", "503 Bad sequence of commands")
        .await;
}

#[tokio::test]
async fn test_declared_size_too_large() {
    let config = ServerConfig::builder().max_size(100).build().unwrap();
    let (stream, handle) = spawn_connection(config);
    let mut peer = Peer::new(stream);

    peer.expect(GREETING).await;
    peer.send("EHLO client").await;
    assert_eq!(peer.reply().await.last().unwrap(), "250 SIZE 100");
    peer.command("MAIL FROM:<a@localhost> SIZE=101", "552 Maximum message size exceeded")
        .await;
    peer.expect_closed().await;

    let events = handle.await.unwrap();
    assert!(messages(&events).is_empty());
    assert!(events.iter().any(|event| matches!(
        event,
        ConnectionEvent::Rejected { sender, .. } if sender == "a@localhost"
    )));
}

#[tokio::test]
async fn test_body_too_large() {
    let config = ServerConfig::builder().max_size(10).build().unwrap();
    let (stream, handle) = spawn_connection(config);
    let mut peer = Peer::new(stream);

    peer.expect(GREETING).await;
    peer.command("HELO client", "250 localhost, greeting accepted.")
        .await;
    peer.command("MAIL FROM:<a@localhost> SIZE=5", "250 Ok").await;
    peer.command("RCPT TO:<b@localhost>", "250 Ok").await;
    peer.command("DATA", "354 Start mail input; end with <CRLF>.<CRLF>")
        .await;
    peer.send("this line is longer than ten bytes").await;
    peer.expect("552 Maximum message size exceeded").await;
    peer.expect_closed().await;

    let events = handle.await.unwrap();
    assert!(messages(&events).is_empty());
}

#[tokio::test]
async fn test_body_line_longer_than_command_limit() {
    let (stream, handle) = spawn_connection(ServerConfig::default());
    let mut peer = Peer::new(stream);
    let long_line = "x".repeat(2 * 1024 * 1024);

    peer.expect(GREETING).await;
    peer.command("HELO client", "250 localhost, greeting accepted.")
        .await;
    peer.command("MAIL FROM:<a@localhost>", "250 Ok").await;
    peer.command("RCPT TO:<b@localhost>", "250 Ok").await;
    peer.command("DATA", "354 Start mail input; end with <CRLF>.<CRLF>")
        .await;
    peer.send(&long_line).await;
    peer.command(".", "250 Ok").await;
    peer.command("QUIT", "221 Bye").await;

    let events = handle.await.unwrap();
    let received = messages(&events);
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].message.len(), long_line.len());
    assert!(!events.iter().any(|event| matches!(event, ConnectionEvent::Error(_))));
}

#[tokio::test]
async fn test_quit_before_greeting() {
    let (stream, handle) = spawn_connection(ServerConfig::default());
    let mut peer = Peer::new(stream);

    peer.expect(GREETING).await;
    peer.command("NOOP", "250 Ok").await;
    peer.command("QUIT", "221 Bye").await;
    peer.expect_closed().await;

    let events = handle.await.unwrap();
    assert!(matches!(events.as_slice(), [ConnectionEvent::Closed]));
}

#[tokio::test]
async fn test_peer_hangup_is_not_an_error() {
    let (stream, handle) = spawn_connection(ServerConfig::default());
    let mut peer = Peer::new(stream);

    peer.expect(GREETING).await;
    drop(peer);

    let events = handle.await.unwrap();
    assert!(matches!(events.as_slice(), [ConnectionEvent::Closed]));
}

fn auth_config() -> ServerConfig<Accounts> {
    ServerConfig::builder()
        .auth_methods(["PLAIN", "LOGIN"])
        .authenticator(Accounts)
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_ehlo_advertises_auth() {
    let (stream, _handle) = spawn_connection(auth_config());
    let mut peer = Peer::new(stream);

    peer.expect(GREETING).await;
    peer.send("EHLO client").await;
    let reply = peer.reply().await;
    assert!(reply.contains(&"250-AUTH PLAIN LOGIN".to_string()));
    assert!(!reply.iter().any(|line| line.contains("STARTTLS")));
}

#[tokio::test]
async fn test_auth_plain_inline() {
    let (stream, _handle) = spawn_connection(auth_config());
    let mut peer = Peer::new(stream);

    peer.expect(GREETING).await;
    peer.command("HELO client", "250 localhost, greeting accepted.")
        .await;
    peer.command("AUTH PLAIN AHVzZXIAcGFzcw==", "235 Authentication successful")
        .await;
    peer.command("QUIT", "221 Bye").await;
}

#[tokio::test]
async fn test_auth_plain_challenge() {
    let (stream, _handle) = spawn_connection(auth_config());
    let mut peer = Peer::new(stream);

    peer.expect(GREETING).await;
    peer.command("HELO client", "250 localhost, greeting accepted.")
        .await;
    peer.command("auth plain", "334 ").await;
    peer.command("AHVzZXIAcGFzcw==", "235 Authentication successful")
        .await;
}

#[tokio::test]
async fn test_auth_login() {
    let (stream, _handle) = spawn_connection(auth_config());
    let mut peer = Peer::new(stream);

    peer.expect(GREETING).await;
    peer.command("HELO client", "250 localhost, greeting accepted.")
        .await;
    peer.command("AUTH LOGIN", "334 VXNlcm5hbWU6").await;
    peer.command("dXNlcg==", "334 UGFzc3dvcmQ6").await;
    peer.command("cGFzcw==", "235 Authentication successful")
        .await;
}

#[tokio::test]
async fn test_auth_login_bad_password() {
    let (stream, _handle) = spawn_connection(auth_config());
    let mut peer = Peer::new(stream);

    peer.expect(GREETING).await;
    peer.command("HELO client", "250 localhost, greeting accepted.")
        .await;
    peer.command("AUTH LOGIN dXNlcg==", "334 UGFzc3dvcmQ6").await;
    peer.command("d3Jvbmc=", "535 Bad username or password").await;
    peer.expect_closed().await;
}

#[tokio::test]
async fn test_unoffered_mechanism() {
    let (stream, _handle) = spawn_connection(auth_config());
    let mut peer = Peer::new(stream);

    peer.expect(GREETING).await;
    peer.command("HELO client", "250 localhost, greeting accepted.")
        .await;
    peer.command("AUTH CRAM-MD5", "504 Not implemented")
        .await;
    peer.expect_closed().await;
}

#[tokio::test]
async fn test_hangup_during_auth_challenge() {
    let (stream, handle) = spawn_connection(auth_config());
    let mut peer = Peer::new(stream);

    peer.expect(GREETING).await;
    peer.command("HELO client", "250 localhost, greeting accepted.")
        .await;
    peer.command("AUTH LOGIN", "334 VXNlcm5hbWU6").await;
    drop(peer);

    let events = handle.await.unwrap();
    assert!(matches!(events.as_slice(), [ConnectionEvent::Closed]));
}
