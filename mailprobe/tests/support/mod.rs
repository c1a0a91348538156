//! Test support utilities for probe runs
#![allow(dead_code, clippy::unwrap_used)] // Test utility module - not all helpers used in every test

use std::net::SocketAddr;

use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::TcpListener,
    task::JoinHandle,
};

/// Reply the scripted server sends for each command verb
#[derive(Debug, Clone)]
pub struct Script {
    pub greeting: &'static str,
    pub ehlo: &'static str,
    pub mail: &'static str,
    pub rcpt: &'static str,
    pub data: &'static str,
    pub body: &'static str,
    pub quit: &'static str,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            greeting: "220 myhostname ESMTP Postfix (Ubuntu)\r\n",
            ehlo: "250-myhostname\r\n250-PIPELINING\r\n250 SMTPUTF8\r\n",
            mail: "250 2.1.0 Ok\r\n",
            rcpt: "250 2.1.5 Ok\r\n",
            data: "354 End data with <CR><LF>.<CR><LF>\r\n",
            body: "250 2.0.0 Ok: queued as C7CAA3F279\r\n",
            quit: "221 2.0.0 Bye\r\n",
        }
    }
}

/// Serves a single connection following `script`, returning the lines the
/// client sent
pub async fn serve_once(script: Script) -> (SocketAddr, JoinHandle<Vec<String>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let handle = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut reader = BufReader::new(stream);
        let mut received = Vec::new();
        let mut in_data = false;

        reader
            .get_mut()
            .write_all(script.greeting.as_bytes())
            .await
            .unwrap();

        loop {
            let mut line = String::new();
            if reader.read_line(&mut line).await.unwrap_or(0) == 0 {
                break;
            }
            received.push(line.trim_end().to_string());

            let reply = if in_data {
                if line != ".\r\n" {
                    continue;
                }
                in_data = false;
                script.body
            } else if line.starts_with("EHLO") {
                script.ehlo
            } else if line.starts_with("MAIL FROM:") {
                script.mail
            } else if line.starts_with("RCPT TO:") {
                script.rcpt
            } else if line.starts_with("DATA") {
                in_data = script.data.starts_with("354");
                script.data
            } else if line.starts_with("QUIT") {
                reader.get_mut().write_all(script.quit.as_bytes()).await.unwrap();
                break;
            } else {
                "500 Unknown command\r\n"
            };

            reader.get_mut().write_all(reply.as_bytes()).await.unwrap();
        }

        received
    });

    (addr, handle)
}
