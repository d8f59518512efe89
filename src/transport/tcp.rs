use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::time::{timeout, Duration};

use crate::codec;
use crate::protocol::Message;
use crate::transport::Transport;

/// Default timeout for writing one frame.
const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(10);

const READ_CHUNK: usize = 8 * 1024;

pub struct TcpTransport {
    stream: TcpStream,
    read_buf: Vec<u8>,
    write_timeout: Duration,
}

impl TcpTransport {
    pub fn new(stream: TcpStream) -> Self {
        Self::with_timeout(stream, DEFAULT_WRITE_TIMEOUT)
    }

    pub fn with_timeout(stream: TcpStream, write_timeout: Duration) -> Self {
        Self {
            stream,
            read_buf: Vec::with_capacity(READ_CHUNK),
            write_timeout,
        }
    }

    pub async fn connect<A: ToSocketAddrs>(addr: A) -> anyhow::Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        Ok(Self::new(stream))
    }
}

fn io_error(e: std::io::Error) -> anyhow::Error {
    match e.kind() {
        std::io::ErrorKind::BrokenPipe | std::io::ErrorKind::ConnectionReset => {
            anyhow::anyhow!("Connection closed by peer")
        }
        _ => anyhow::anyhow!("I/O error: {}", e),
    }
}

#[async_trait::async_trait]
impl Transport for TcpTransport {
    async fn send(&mut self, msg: Message) -> anyhow::Result<()> {
        let frame = codec::encode_frame(&msg)?;
        timeout(self.write_timeout, self.stream.write_all(&frame))
            .await
            .map_err(|_| anyhow::anyhow!("Send timeout after {:?}", self.write_timeout))?
            .map_err(io_error)
    }

    /// Buffered so that dropping the future between reads loses nothing.
    async fn recv(&mut self) -> anyhow::Result<Message> {
        loop {
            if let Some(msg) = codec::try_decode(&mut self.read_buf)? {
                return Ok(msg);
            }
            self.read_buf.reserve(READ_CHUNK);
            let n = self.stream.read_buf(&mut self.read_buf).await.map_err(io_error)?;
            if n == 0 {
                return Err(anyhow::anyhow!("Connection closed by peer"));
            }
        }
    }
}
