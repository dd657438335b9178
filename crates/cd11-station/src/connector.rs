use std::net::{Ipv4Addr, SocketAddr, TcpStream};
use std::time::{Duration, Instant};

use cd11_frame::{
    Cd11Frame, ConnectionBody, FrameConfig, FrameError, FrameFactory, FrameReader, FrameWriter,
    RawFrame,
};

use crate::error::{Result, StationError};
use crate::handshake::request_connection;

/// Ask the broker at `broker` where `station_name` should send its data (blocking).
///
/// `station_type` is the node type announced in the request, normally `IDC`.
pub fn connect_to_broker(
    broker: SocketAddr,
    factory: &FrameFactory,
    station_name: &str,
    station_type: &str,
    timeout: Duration,
) -> Result<ConnectionBody> {
    let stream = TcpStream::connect_timeout(&broker, timeout)?;
    let local_ip = match stream.local_addr()? {
        SocketAddr::V4(addr) => *addr.ip(),
        SocketAddr::V6(_) => Ipv4Addr::UNSPECIFIED,
    };
    let request = factory.connection_request(station_name, station_type, local_ip, 0)?;

    let mut link = StationLink::from_stream(stream, timeout)?;
    request_connection(&mut link.reader, &mut link.writer, &request, timeout)
}

/// Blocking frame connection from the station's point of view.
pub struct StationLink {
    reader: FrameReader<TcpStream>,
    writer: FrameWriter<TcpStream>,
}

impl StationLink {
    pub fn connect(addr: SocketAddr, timeout: Duration) -> Result<Self> {
        let stream = TcpStream::connect_timeout(&addr, timeout)?;
        Self::from_stream(stream, timeout)
    }

    /// Wrap an open stream. `timeout` bounds each blocking socket call.
    pub fn from_stream(stream: TcpStream, timeout: Duration) -> Result<Self> {
        let reader_stream = stream.try_clone()?;
        let config = FrameConfig {
            read_timeout: Some(timeout),
            write_timeout: Some(timeout),
            ..FrameConfig::default()
        };
        Ok(Self {
            reader: FrameReader::with_config_tcp(reader_stream, config.clone())?,
            writer: FrameWriter::with_config_tcp(stream, config)?,
        })
    }

    pub fn send(&mut self, frame: &Cd11Frame) -> Result<()> {
        Ok(self.writer.write_frame(frame)?)
    }

    /// Forward bytes already framed, such as a corrupted frame in a test.
    pub fn send_raw(&mut self, frame: &RawFrame) -> Result<()> {
        Ok(self.writer.write_raw(frame)?)
    }

    /// Wait up to `limit` for the next frame.
    pub fn recv(&mut self, limit: Duration) -> Result<RawFrame> {
        let deadline = Instant::now() + limit;
        match self.reader.read_frame_until(|| Instant::now() >= deadline) {
            Ok(frame) => Ok(frame),
            Err(FrameError::Timeout) => Err(StationError::Timeout(limit)),
            Err(err) => Err(err.into()),
        }
    }

    pub fn peer_addr(&self) -> Result<SocketAddr> {
        Ok(self.writer.get_ref().peer_addr()?)
    }

    pub fn shutdown(self) -> Result<()> {
        self.writer.get_ref().shutdown(std::net::Shutdown::Both)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::net::TcpListener;
    use std::thread;

    use cd11_frame::FrameType;

    use super::*;

    #[test]
    fn link_exchanges_frames() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("listener should bind");
        let addr = listener.local_addr().expect("listener should have address");

        let server = thread::spawn(move || {
            let (stream, _) = listener.accept().expect("accept should succeed");
            let mut link = StationLink::from_stream(stream, Duration::from_secs(2))
                .expect("server link should build");
            let raw = link.recv(Duration::from_secs(2)).expect("server should read");
            link.send_raw(&raw).expect("server should echo");
        });

        let mut link = StationLink::connect(addr, Duration::from_secs(2)).expect("connect");
        link.send(&FrameFactory::new().alert("echo").expect("alert"))
            .expect("client send");
        let echoed = link.recv(Duration::from_secs(2)).expect("client read");
        assert_eq!(echoed.frame_type(), FrameType::Alert);
        assert_eq!(link.peer_addr().expect("peer addr"), addr);

        server.join().expect("server thread should join");
        link.shutdown().expect("shutdown");
    }

    #[test]
    fn request_announces_station_type() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("listener should bind");
        let addr = listener.local_addr().expect("listener should have address");

        let broker = thread::spawn(move || {
            let (stream, _) = listener.accept().expect("accept should succeed");
            let mut link = StationLink::from_stream(stream, Duration::from_secs(2))
                .expect("broker link should build");
            let raw = link.recv(Duration::from_secs(2)).expect("broker should read");
            let request = Cd11Frame::decode(&raw)
                .expect("request should decode")
                .into_connection_request()
                .expect("should be a connection request");
            let response = FrameFactory::new()
                .connection_response(Ipv4Addr::LOCALHOST, 8100, None, None)
                .expect("response");
            link.send(&response).expect("broker should answer");
            request
        });

        let response = connect_to_broker(
            addr,
            &FrameFactory::new(),
            "AAA",
            "NDC",
            Duration::from_secs(2),
        )
        .expect("broker should answer");
        assert_eq!(response.port, 8100);

        let request = broker.join().expect("broker thread should join");
        assert_eq!(request.name, "AAA");
        assert_eq!(request.node_type, "NDC");
    }

    #[test]
    fn recv_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("listener should bind");
        let addr = listener.local_addr().expect("listener should have address");
        let _server = thread::spawn(move || {
            let (_stream, _) = listener.accept().expect("accept should succeed");
            thread::sleep(Duration::from_millis(300));
        });

        let mut link = StationLink::connect(addr, Duration::from_millis(20)).expect("connect");
        let err = link.recv(Duration::from_millis(60)).unwrap_err();
        assert!(matches!(err, StationError::Timeout(_)));
    }
}
