//! Minimal NNTP posting session
//!
//! Just enough of the protocol to upload articles: connect (plain TCP or
//! implicit TLS), authenticate with AUTHINFO, POST, QUIT. Article bodies are
//! produced dot-safe by the encoder, so posting never rewrites payload bytes
//! and the lengths recorded in the index stay exact.

use crate::error::{Error, Result};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

trait Wire: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> Wire for T {}

/// One connection to an NNTP server
pub struct NntpSession {
    stream: BufReader<Box<dyn Wire>>,
}

impl NntpSession {
    /// Connect and consume the server greeting.
    ///
    /// With `tls` set, an implicit-TLS handshake is performed first;
    /// `allow_insecure_tls` skips certificate verification for self-signed
    /// servers.
    pub async fn connect(
        host: &str,
        port: u16,
        tls: bool,
        allow_insecure_tls: bool,
    ) -> Result<Self> {
        let tcp = TcpStream::connect((host, port)).await?;
        let wire: Box<dyn Wire> = if tls {
            let connector = native_tls::TlsConnector::builder()
                .danger_accept_invalid_certs(allow_insecure_tls)
                .build()?;
            let connector = tokio_native_tls::TlsConnector::from(connector);
            Box::new(connector.connect(host, tcp).await?)
        } else {
            Box::new(tcp)
        };
        Self::from_stream(wire).await
    }

    async fn from_stream(wire: Box<dyn Wire>) -> Result<Self> {
        let mut session = Self {
            stream: BufReader::new(wire),
        };
        let (code, line) = session.read_response().await?;
        if code != 200 && code != 201 {
            return Err(Error::Nntp(format!("unexpected greeting: {line}")));
        }
        Ok(session)
    }

    async fn read_response(&mut self) -> Result<(u16, String)> {
        let mut line = String::new();
        let n = self.stream.read_line(&mut line).await?;
        if n == 0 {
            return Err(Error::Nntp("connection closed by server".to_string()));
        }
        let line = line.trim_end().to_string();
        let code = line
            .get(..3)
            .and_then(|code| code.parse::<u16>().ok())
            .ok_or_else(|| Error::Nntp(format!("malformed response: {line}")))?;
        Ok((code, line))
    }

    async fn command(&mut self, command: &str) -> Result<(u16, String)> {
        self.stream.write_all(command.as_bytes()).await?;
        self.stream.write_all(b"\r\n").await?;
        self.stream.flush().await?;
        self.read_response().await
    }

    /// AUTHINFO USER/PASS exchange
    pub async fn authenticate(&mut self, username: &str, password: &str) -> Result<()> {
        let (code, line) = self.command(&format!("AUTHINFO USER {username}")).await?;
        match code {
            281 => return Ok(()),
            381 => {}
            _ => return Err(Error::Nntp(format!("authentication rejected: {line}"))),
        }
        let (code, line) = self.command(&format!("AUTHINFO PASS {password}")).await?;
        if code != 281 {
            return Err(Error::Nntp(format!("authentication failed: {line}")));
        }
        Ok(())
    }

    /// Post one article, writing the body in `wire_chunk_size` slices.
    pub async fn post(&mut self, body: &[u8], wire_chunk_size: u64) -> Result<()> {
        let (code, line) = self.command("POST").await?;
        if code != 340 {
            return Err(Error::Nntp(format!("server refused POST: {line}")));
        }
        for piece in body.chunks(wire_chunk_size.max(1) as usize) {
            self.stream.write_all(piece).await?;
        }
        if !body.ends_with(b"\r\n") {
            self.stream.write_all(b"\r\n").await?;
        }
        self.stream.write_all(b".\r\n").await?;
        self.stream.flush().await?;

        let (code, line) = self.read_response().await?;
        if code != 240 {
            return Err(Error::Nntp(format!("article not accepted: {line}")));
        }
        Ok(())
    }

    /// Close the session. Failures here are soft; callers log a warning.
    pub async fn quit(mut self) -> Result<()> {
        let (code, line) = self.command("QUIT").await?;
        if code != 205 {
            return Err(Error::Nntp(format!("unexpected QUIT reply: {line}")));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::io::Builder;

    async fn session(mock: tokio_test::io::Mock) -> NntpSession {
        NntpSession::from_stream(Box::new(mock)).await.unwrap()
    }

    #[tokio::test]
    async fn greeting_is_consumed() {
        let mock = Builder::new().read(b"200 news.example.com ready\r\n").build();
        session(mock).await;
    }

    #[tokio::test]
    async fn bad_greeting_is_fatal() {
        let mock = Builder::new().read(b"502 no thanks\r\n").build();
        let err = NntpSession::from_stream(Box::new(mock)).await.err().unwrap();
        assert!(err.to_string().contains("unexpected greeting"));
    }

    #[tokio::test]
    async fn authenticate_runs_user_pass_exchange() {
        let mock = Builder::new()
            .read(b"200 ready\r\n")
            .write(b"AUTHINFO USER alice\r\n")
            .read(b"381 password required\r\n")
            .write(b"AUTHINFO PASS secret\r\n")
            .read(b"281 authenticated\r\n")
            .build();
        let mut session = session(mock).await;
        session.authenticate("alice", "secret").await.unwrap();
    }

    #[tokio::test]
    async fn authenticate_accepts_user_only_servers() {
        let mock = Builder::new()
            .read(b"200 ready\r\n")
            .write(b"AUTHINFO USER alice\r\n")
            .read(b"281 authenticated\r\n")
            .build();
        let mut session = session(mock).await;
        session.authenticate("alice", "unused").await.unwrap();
    }

    #[tokio::test]
    async fn rejected_credentials_are_fatal() {
        let mock = Builder::new()
            .read(b"200 ready\r\n")
            .write(b"AUTHINFO USER alice\r\n")
            .read(b"381 password required\r\n")
            .write(b"AUTHINFO PASS wrong\r\n")
            .read(b"481 bad credentials\r\n")
            .build();
        let mut session = session(mock).await;
        let err = session.authenticate("alice", "wrong").await.err().unwrap();
        assert!(err.to_string().contains("authentication failed"));
    }

    #[tokio::test]
    async fn post_sends_body_and_terminator() {
        let mock = Builder::new()
            .read(b"200 ready\r\n")
            .write(b"POST\r\n")
            .read(b"340 send article\r\n")
            .write(b"Subject: x\r\n\r\nbody\r\n")
            .write(b".\r\n")
            .read(b"240 article received\r\n")
            .build();
        let mut session = session(mock).await;
        session.post(b"Subject: x\r\n\r\nbody\r\n", 10_240).await.unwrap();
    }

    #[tokio::test]
    async fn post_failure_surfaces_server_message() {
        let mock = Builder::new()
            .read(b"200 ready\r\n")
            .write(b"POST\r\n")
            .read(b"440 posting not allowed\r\n")
            .build();
        let mut session = session(mock).await;
        let err = session.post(b"x\r\n", 1024).await.err().unwrap();
        assert!(err.to_string().contains("posting not allowed"));
    }

    #[tokio::test]
    async fn quit_expects_205() {
        let mock = Builder::new()
            .read(b"200 ready\r\n")
            .write(b"QUIT\r\n")
            .read(b"205 goodbye\r\n")
            .build();
        session(mock).await.quit().await.unwrap();
    }
}
