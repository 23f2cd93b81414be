use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::io;
use std::time::Duration;

/// Byte-duplex transport as the session sees it: a non-blocking availability
/// probe on the read side and synchronous writes on the other. Implemented
/// by the serial port for real use and by scripted fakes in tests.
pub trait Transport: Send {
    /// Bytes ready to read without blocking.
    fn bytes_to_read(&mut self) -> io::Result<usize>;
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;
    fn write_all(&mut self, buf: &[u8]) -> io::Result<()>;
}

impl Transport for Box<dyn SerialPort> {
    fn bytes_to_read(&mut self) -> io::Result<usize> {
        SerialPort::bytes_to_read(self.as_ref())
            .map(|n| n as usize)
            .map_err(io::Error::from)
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        io::Read::read(self, buf)
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        io::Write::write_all(self, buf)?;
        io::Write::flush(self)
    }
}

/// Open `dev` at 8N1, no flow control, with a read timeout short enough to
/// be effectively non-blocking.
pub fn open_port(dev: &str, baud: u32) -> Result<Box<dyn SerialPort>, serialport::Error> {
    serialport::new(dev, baud)
        .timeout(Duration::from_millis(100))
        .data_bits(DataBits::Eight)
        .parity(Parity::None)
        .stop_bits(StopBits::One)
        .flow_control(FlowControl::None)
        .open()
}
