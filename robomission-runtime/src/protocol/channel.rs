// Copyright (C) 2024 Laixer Equipment B.V.
// All rights reserved.
//
// This software may be modified and distributed under the terms
// of the included license.  See the LICENSE file for details.

use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, WriteHalf};
use tokio::net::{TcpStream, ToSocketAddrs};

use crate::core::Program;
use crate::event::EventLatch;

use super::instruction::{parse_event, Instruction};

#[derive(Debug)]
pub enum ChannelError {
    /// Connection to the bridge could not be established.
    Connect(std::io::Error),
    /// Transport failure.
    Io(std::io::Error),
    /// The bridge closed the connection.
    Disconnected,
    /// A program is still registered on the controller, clear it first.
    StaleProgram,
    /// Start requested without a registered program.
    NoProgramUploaded,
}

impl ChannelError {
    /// Check if the error is a sequencing bug of the caller rather than a
    /// transport failure.
    pub fn is_sequencing_bug(&self) -> bool {
        matches!(
            self,
            ChannelError::StaleProgram | ChannelError::NoProgramUploaded
        )
    }
}

impl std::fmt::Display for ChannelError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChannelError::Connect(e) => write!(f, "failed to connect: {}", e),
            ChannelError::Io(e) => write!(f, "transport error: {}", e),
            ChannelError::Disconnected => write!(f, "controller disconnected"),
            ChannelError::StaleProgram => {
                write!(f, "previous program still registered, clear it first")
            }
            ChannelError::NoProgramUploaded => write!(f, "no program uploaded"),
        }
    }
}

impl std::error::Error for ChannelError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ChannelError::Connect(e) | ChannelError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ChannelError {
    fn from(e: std::io::Error) -> Self {
        use std::io::ErrorKind;

        match e.kind() {
            ErrorKind::BrokenPipe | ErrorKind::ConnectionReset | ErrorKind::UnexpectedEof => {
                ChannelError::Disconnected
            }
            _ => ChannelError::Io(e),
        }
    }
}

/// Command channel to the motion controller.
///
/// The channel writes instructions to the bridge, each prefixed with the
/// name of the target device. Inbound lines are handled by a background
/// reader, which is the only task raising events on the latch.
///
/// The channel keeps track of the registered program. Uploading requires
/// a cleared controller, starting requires an uploaded program.
pub struct Channel<T> {
    writer: WriteHalf<T>,
    target: String,
    latch: EventLatch,
    program: Option<Program>,
    /// Set while segments are being sent. A failed upload leaves a partial
    /// program on the controller which must be cleared.
    upload_pending: bool,
    reader: tokio::task::JoinHandle<()>,
}

impl Channel<TcpStream> {
    /// Connect to the bridge.
    pub async fn connect(
        address: impl ToSocketAddrs,
        target: impl ToString,
        latch: EventLatch,
    ) -> Result<Self, ChannelError> {
        let stream = TcpStream::connect(address)
            .await
            .map_err(ChannelError::Connect)?;

        let sock_ref = socket2::SockRef::from(&stream);

        let mut keep_alive = socket2::TcpKeepalive::new();
        keep_alive = keep_alive.with_time(Duration::from_secs(2));
        keep_alive = keep_alive.with_interval(Duration::from_secs(2));

        sock_ref
            .set_tcp_keepalive(&keep_alive)
            .map_err(ChannelError::Connect)?;
        sock_ref.set_nodelay(true).map_err(ChannelError::Connect)?;

        if let Ok(address) = stream.peer_addr() {
            log::debug!("Connected to bridge at {}", address);
        }

        Ok(Self::from_stream(stream, target, latch))
    }
}

impl<T: AsyncRead + AsyncWrite + Send + 'static> Channel<T> {
    /// Construct a channel on top of an established stream.
    ///
    /// This spawns the inbound reader and must be called from within a
    /// runtime.
    pub fn from_stream(stream: T, target: impl ToString, latch: EventLatch) -> Self {
        let (reader, writer) = tokio::io::split(stream);
        let target = target.to_string();

        Self {
            writer,
            reader: tokio::spawn(read_events(reader, target.clone(), latch.clone())),
            target,
            latch,
            program: None,
            upload_pending: false,
        }
    }

    /// Event latch fed by this channel.
    #[inline]
    pub fn latch(&self) -> &EventLatch {
        &self.latch
    }

    /// Program currently registered on the controller.
    #[inline]
    pub fn program(&self) -> Option<&Program> {
        self.program.as_ref()
    }

    /// Discard the program on the controller and reset all events.
    pub async fn clear(&mut self) -> Result<(), ChannelError> {
        self.send(&Instruction::Clear).await?;

        self.upload_pending = false;

        if let Some(program) = self.program.take() {
            log::debug!("Program '{}' cleared", program.name());
        }

        self.latch.clear();

        Ok(())
    }

    /// Upload a program.
    ///
    /// The controller stores the program but does not execute it.
    pub async fn upload(&mut self, program: Program) -> Result<(), ChannelError> {
        if self.program.is_some() || self.upload_pending {
            return Err(ChannelError::StaleProgram);
        }

        log::debug!("Uploading program {}", program);

        self.upload_pending = true;

        for segment in program.segments() {
            self.send(&Instruction::Add(segment.clone())).await?;
        }

        self.upload_pending = false;
        self.program = Some(program);

        Ok(())
    }

    /// Start the uploaded program.
    ///
    /// This does not wait for the controller to begin execution.
    pub async fn start(&mut self) -> Result<(), ChannelError> {
        let name = match &self.program {
            Some(program) => program.name().to_string(),
            None => return Err(ChannelError::NoProgramUploaded),
        };

        self.send(&Instruction::Start).await?;

        log::debug!("Program '{}' started", name);

        Ok(())
    }

    /// Halt the controller.
    pub async fn stop(&mut self) -> Result<(), ChannelError> {
        self.send(&Instruction::Stop).await
    }

    /// Suppress or resume controller messages.
    pub async fn mute(&mut self, mute: bool) -> Result<(), ChannelError> {
        self.send(&Instruction::Mute(mute)).await
    }

    async fn send(&mut self, instruction: &Instruction) -> Result<(), ChannelError> {
        let line = format!("{} {}\n", self.target, instruction);

        log::trace!("TX: {}", line.trim_end());

        self.writer.write_all(line.as_bytes()).await?;
        self.writer.flush().await?;

        Ok(())
    }
}

impl<T> Drop for Channel<T> {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

/// Read inbound lines and raise events on the latch.
///
/// When the stream ends the latch is marked disconnected so that
/// waiters do not block forever.
async fn read_events<R: AsyncRead + Unpin>(reader: R, target: String, latch: EventLatch) {
    let mut lines = BufReader::new(reader).lines();

    loop {
        match lines.next_line().await {
            Ok(Some(line)) => match parse_event(&line, &target) {
                Some(Ok(index)) => {
                    log::debug!("Event {} received", index);
                    latch.raise(index);
                }
                Some(Err(e)) => log::warn!("Invalid event notification '{}': {}", line, e),
                None => log::trace!("RX: {}", line),
            },
            Ok(None) => {
                log::warn!("Bridge closed the connection");
                break;
            }
            Err(e) => {
                log::error!("Failed to read from bridge: {}", e);
                break;
            }
        }
    }

    latch.disconnect();
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};

    use super::*;
    use crate::core::{Condition, Motion, ProgramBuilder, Segment, SensorSet};
    use crate::event::WaitError;

    fn program(name: &str, segments: Vec<Segment>) -> Program {
        let sensors = SensorSet::default();
        let mut builder = ProgramBuilder::new(name, &sensors);
        builder.extend(segments).unwrap();
        builder.finalize().unwrap()
    }

    fn drive() -> Program {
        program(
            "drive",
            vec![Motion::until(Condition::distance(2.5))
                .velocity(0.5)
                .edge_right(0.0)
                .into()],
        )
    }

    fn channel() -> (Channel<DuplexStream>, DuplexStream) {
        let (host, controller) = tokio::io::duplex(4096);
        (Channel::from_stream(host, "regbot", EventLatch::new()), controller)
    }

    async fn read_lines(controller: &mut DuplexStream, count: usize) -> Vec<String> {
        let mut reader = BufReader::new(controller);
        let mut lines = Vec::with_capacity(count);

        for _ in 0..count {
            let mut line = String::new();
            reader.read_line(&mut line).await.unwrap();
            lines.push(line);
        }

        lines
    }

    #[tokio::test]
    async fn test_program_lifecycle() {
        let (mut channel, mut controller) = channel();

        channel.clear().await.unwrap();
        channel.upload(drive()).await.unwrap();
        assert_eq!(channel.program().unwrap().name(), "drive");
        channel.start().await.unwrap();

        let lines = read_lines(&mut controller, 3).await;

        assert_eq!(
            lines,
            vec![
                "regbot mclear\n",
                "regbot madd vel=0.5, edger=0:dist=2.5\n",
                "regbot start\n",
            ]
        );
    }

    #[tokio::test]
    async fn test_upload_without_clear() {
        let (mut channel, _controller) = channel();

        channel.clear().await.unwrap();
        channel.upload(drive()).await.unwrap();

        let result = channel.upload(drive()).await;

        assert!(matches!(result, Err(ChannelError::StaleProgram)));
        assert!(result.unwrap_err().is_sequencing_bug());

        channel.clear().await.unwrap();
        assert!(channel.program().is_none());
        assert!(channel.upload(drive()).await.is_ok());
    }

    #[tokio::test]
    async fn test_failed_upload_requires_clear() {
        let (mut channel, controller) = channel();

        drop(controller);

        assert!(matches!(
            channel.upload(drive()).await,
            Err(ChannelError::Disconnected)
        ));
        assert!(channel.program().is_none());
        assert!(matches!(
            channel.upload(drive()).await,
            Err(ChannelError::StaleProgram)
        ));
        assert!(matches!(
            channel.start().await,
            Err(ChannelError::NoProgramUploaded)
        ));
    }

    #[tokio::test]
    async fn test_foreign_events_ignored() {
        let (channel, mut controller) = channel();

        controller
            .write_all(b"teensy event 0
teensy:event 0
regbot event 1
")
            .await
            .unwrap();

        let latch = channel.latch().clone();
        assert_eq!(
            latch.wait_for(1, Some(Duration::from_secs(1))).await,
            Ok(())
        );
        assert!(!latch.is_set(0));
    }

    #[tokio::test]
    async fn test_start_without_upload() {
        let (mut channel, _controller) = channel();

        assert!(matches!(
            channel.start().await,
            Err(ChannelError::NoProgramUploaded)
        ));

        channel.upload(drive()).await.unwrap();
        channel.clear().await.unwrap();

        assert!(matches!(
            channel.start().await,
            Err(ChannelError::NoProgramUploaded)
        ));
    }

    #[tokio::test]
    async fn test_control_commands() {
        let (mut channel, mut controller) = channel();

        channel.mute(true).await.unwrap();
        channel.stop().await.unwrap();
        channel.mute(false).await.unwrap();

        let lines = read_lines(&mut controller, 3).await;

        assert_eq!(lines, vec!["regbot mute 1\n", "regbot stop\n", "regbot mute 0\n"]);
    }

    #[tokio::test]
    async fn test_inbound_events() {
        let (channel, mut controller) = channel();

        controller
            .write_all(b"# hbt 0.1\nevent 33\nevent x\nregbot event 2\n")
            .await
            .unwrap();

        let latch = channel.latch().clone();
        assert_eq!(
            latch.wait_for(2, Some(Duration::from_secs(1))).await,
            Ok(())
        );
        assert!(!latch.is_disconnected());
    }

    #[tokio::test]
    async fn test_clear_resets_events() {
        let (mut channel, mut controller) = channel();

        controller.write_all(b"event 0\n").await.unwrap();

        let latch = channel.latch().clone();
        while !latch.is_set(0) {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }

        channel.clear().await.unwrap();

        assert_eq!(
            latch.wait_for(0, Some(Duration::from_millis(20))).await,
            Err(WaitError::Timeout)
        );
    }

    #[tokio::test]
    async fn test_disconnect_releases_waiter() {
        let (mut channel, controller) = channel();

        drop(controller);

        let latch = channel.latch().clone();
        assert_eq!(
            latch.wait_for(0, Some(Duration::from_secs(1))).await,
            Err(WaitError::Disconnected)
        );

        assert!(matches!(
            channel.mute(true).await,
            Err(ChannelError::Disconnected)
        ));
    }
}
