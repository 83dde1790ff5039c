//! Trait abstraction for the uplink serial port to enable testing

use async_trait::async_trait;
use std::io;
use std::pin::Pin;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio_serial::{ClearBuffer, SerialPort};

/// Line-oriented serial I/O towards the gateway modem
#[async_trait]
pub trait UplinkPort: Send {
    /// Write all data to the port
    async fn write_all(&mut self, data: &[u8]) -> io::Result<()>;

    /// Flush the output buffer
    async fn flush(&mut self) -> io::Result<()>;

    /// Read up to and including the next `\n`; returns 0 at end of stream
    async fn read_line(&mut self, buf: &mut String) -> io::Result<usize>;

    /// Drop every byte received but not yet read
    async fn discard_input(&mut self) -> io::Result<()>;
}

/// Wrapper around tokio_serial::SerialStream that implements UplinkPort
pub struct TokioSerialPort {
    port: BufReader<tokio_serial::SerialStream>,
}

impl TokioSerialPort {
    pub fn new(port: tokio_serial::SerialStream) -> Self {
        Self {
            port: BufReader::new(port),
        }
    }
}

#[async_trait]
impl UplinkPort for TokioSerialPort {
    async fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        self.port.write_all(data).await
    }

    async fn flush(&mut self) -> io::Result<()> {
        self.port.flush().await
    }

    async fn read_line(&mut self, buf: &mut String) -> io::Result<usize> {
        self.port.read_line(buf).await
    }

    async fn discard_input(&mut self) -> io::Result<()> {
        // Bytes already pulled into the BufReader, then the driver's queue
        let buffered = self.port.buffer().len();
        Pin::new(&mut self.port).consume(buffered);
        self.port.get_ref().clear(ClearBuffer::Input).map_err(io::Error::from)
    }
}
