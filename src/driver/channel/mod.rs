//! Channel
//!
//! 연결 하나의 바이트 전송 계층입니다. 쓰기는 버퍼에 쌓였다가 flush 시점에
//! 한꺼번에 전송되고, 읽기는 채널마다 하나씩 도는 리더 태스크가 프레임을
//! 디코딩해 [`Inbound`] 큐로 밀어 넣습니다.
//!
//! 수신 타임아웃은 설정([`Channel::set_receive_timeout`])과 활성화
//! ([`Channel::start_receive_timeout`])가 분리되어 있어, 응답을 기다리는
//! 요청이 있을 때만 동작합니다.

mod stream;
mod tls;

#[cfg(test)]
pub(crate) mod testing;

pub use stream::ClientStream;
pub use tls::tls_connector;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::io::{AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::codec::FramedRead;

use crate::bolt::{BoltError, BoltResponse, BoltResponseCodec, BoltResult, BoltVersion, Handshake};

use super::config::{DriverConfig, ServerAddress, TrustStrategy};
use super::error::{DriverError, DriverResult};
use super::logging::Logger;

/// 리더 태스크가 디코딩한 응답 (또는 전송 실패)
pub type Inbound = mpsc::UnboundedReceiver<BoltResult<BoltResponse>>;

// ============================================================================
// Channel - 채널 인터페이스
// ============================================================================

/// 이중 바이트 스트림
#[async_trait]
pub trait Channel: Send + Sync {
    /// 서버 주소
    fn address(&self) -> &ServerAddress;

    /// TLS 사용 여부
    fn is_encrypted(&self) -> bool;

    /// 인코딩된 메시지를 버퍼에 쓰고, `flush` 면 즉시 전송
    async fn write(&self, bytes: Bytes, flush: bool) -> DriverResult<()>;

    /// 수신 타임아웃 설정 (활성화는 별도)
    fn set_receive_timeout(&self, timeout: Duration);

    /// 수신 타임아웃 활성화
    fn start_receive_timeout(&self);

    /// 수신 타임아웃 비활성화
    fn stop_receive_timeout(&self);

    /// 열림 여부
    fn is_open(&self) -> bool;

    /// 닫기 (여러 번 호출해도 안전)
    async fn close(&self);
}

/// 핸드셰이크까지 끝난 채널
pub struct OpenedChannel {
    pub channel: Arc<dyn Channel>,
    pub version: BoltVersion,
    pub inbound: Inbound,
}

/// 주소로 채널을 여는 쪽
#[async_trait]
pub trait ChannelConnector: Send + Sync {
    async fn open(&self, address: &ServerAddress) -> DriverResult<OpenedChannel>;
}

// ============================================================================
// ReceiveTimeout - 수신 타임아웃 상태
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct ReceiveTimeout {
    configured: Option<Duration>,
    armed: bool,
}

impl ReceiveTimeout {
    fn active(&self) -> Option<Duration> {
        if self.armed {
            self.configured
        } else {
            None
        }
    }
}

// ============================================================================
// TcpChannel - TCP/TLS 채널
// ============================================================================

/// TCP 또는 TLS 위의 채널
pub struct TcpChannel {
    address: ServerAddress,
    encrypted: bool,
    writer: tokio::sync::Mutex<Option<WriteHalf<ClientStream>>>,
    buffer: Mutex<BytesMut>,
    timeout: watch::Sender<ReceiveTimeout>,
    open: AtomicBool,
    reader: Mutex<Option<JoinHandle<()>>>,
    logger: Logger,
}

impl TcpChannel {
    /// 핸드셰이크가 끝난 스트림으로 채널을 만들고 리더 태스크를 시작합니다.
    pub fn start(address: ServerAddress, stream: ClientStream, logger: Logger) -> (Self, Inbound) {
        let encrypted = stream.is_tls();
        let (read_half, write_half) = tokio::io::split(stream);
        let (timeout_tx, timeout_rx) = watch::channel(ReceiveTimeout::default());
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

        let frames = FramedRead::new(read_half, BoltResponseCodec::new());
        let reader = tokio::spawn(read_loop(frames, timeout_rx, inbound_tx));

        let channel = Self {
            address,
            encrypted,
            writer: tokio::sync::Mutex::new(Some(write_half)),
            buffer: Mutex::new(BytesMut::with_capacity(8192)),
            timeout: timeout_tx,
            open: AtomicBool::new(true),
            reader: Mutex::new(Some(reader)),
            logger,
        };
        (channel, inbound_rx)
    }

    async fn flush_buffer(&self) -> DriverResult<()> {
        let pending = self.buffer.lock().split();
        if pending.is_empty() {
            return Ok(());
        }
        let mut writer = self.writer.lock().await;
        let writer = writer
            .as_mut()
            .ok_or_else(|| DriverError::service_unavailable(format!("Channel to {} is closed", self.address)))?;
        writer.write_all(&pending).await?;
        writer.flush().await?;
        Ok(())
    }
}

async fn read_loop(
    mut frames: FramedRead<ReadHalf<ClientStream>, BoltResponseCodec>,
    mut timeout: watch::Receiver<ReceiveTimeout>,
    inbound: mpsc::UnboundedSender<BoltResult<BoltResponse>>,
) {
    loop {
        let active = timeout.borrow_and_update().active();
        let next = match active {
            Some(limit) => tokio::select! {
                frame = frames.next() => frame,
                changed = timeout.changed() => {
                    if changed.is_err() {
                        return;
                    }
                    continue;
                }
                _ = tokio::time::sleep(limit) => Some(Err(BoltError::ReceiveTimeout {
                    millis: limit.as_millis() as u64,
                })),
            },
            None => tokio::select! {
                frame = frames.next() => frame,
                changed = timeout.changed() => {
                    if changed.is_err() {
                        return;
                    }
                    continue;
                }
            },
        };

        match next {
            Some(Ok(response)) => {
                if inbound.send(Ok(response)).is_err() {
                    return;
                }
            }
            Some(Err(e)) => {
                let _ = inbound.send(Err(e));
                return;
            }
            None => {
                let _ = inbound.send(Err(BoltError::ConnectionClosed));
                return;
            }
        }
    }
}

#[async_trait]
impl Channel for TcpChannel {
    fn address(&self) -> &ServerAddress {
        &self.address
    }

    fn is_encrypted(&self) -> bool {
        self.encrypted
    }

    async fn write(&self, bytes: Bytes, flush: bool) -> DriverResult<()> {
        if !self.is_open() {
            return Err(DriverError::service_unavailable(format!(
                "Channel to {} is closed",
                self.address
            )));
        }
        self.buffer.lock().extend_from_slice(&bytes);
        if flush {
            self.flush_buffer().await?;
        }
        Ok(())
    }

    fn set_receive_timeout(&self, timeout: Duration) {
        self.timeout.send_modify(|state| state.configured = Some(timeout));
    }

    fn start_receive_timeout(&self) {
        self.timeout.send_if_modified(|state| !std::mem::replace(&mut state.armed, true));
    }

    fn stop_receive_timeout(&self) {
        self.timeout.send_if_modified(|state| std::mem::replace(&mut state.armed, false));
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    async fn close(&self) {
        if !self.open.swap(false, Ordering::AcqRel) {
            return;
        }
        let _ = self.flush_buffer().await;
        if let Some(mut writer) = self.writer.lock().await.take() {
            let _ = writer.shutdown().await;
        }
        if let Some(reader) = self.reader.lock().take() {
            reader.abort();
        }
        self.logger.debug(format!("Channel to {} closed", self.address));
    }
}

impl Drop for TcpChannel {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.get_mut().take() {
            reader.abort();
        }
    }
}

// ============================================================================
// TcpConnector - TCP 연결 생성
// ============================================================================

/// TCP 연결, TLS 업그레이드, 핸드셰이크를 수행하는 커넥터
#[derive(Debug, Clone)]
pub struct TcpConnector {
    encrypted: bool,
    trust_strategy: TrustStrategy,
    handshake: Handshake,
    logger: Logger,
}

impl TcpConnector {
    pub fn new(config: &DriverConfig, logger: Logger) -> Self {
        Self {
            encrypted: config.encrypted,
            trust_strategy: config.trust_strategy.clone(),
            handshake: Handshake::new(),
            logger,
        }
    }

    /// 제안할 버전 슬롯 변경
    pub fn with_handshake(mut self, handshake: Handshake) -> Self {
        self.handshake = handshake;
        self
    }
}

#[async_trait]
impl ChannelConnector for TcpConnector {
    async fn open(&self, address: &ServerAddress) -> DriverResult<OpenedChannel> {
        let tcp = TcpStream::connect(address.as_socket_addr()).await.map_err(|e| {
            DriverError::service_unavailable(format!("Failed to connect to server {}: {}", address, e))
        })?;
        tcp.set_nodelay(true).ok();

        let mut stream = if self.encrypted {
            let (connector, server_name) = tls_connector(&self.trust_strategy, &address.host)?;
            let tls = connector.connect(server_name, tcp).await.map_err(|e| {
                DriverError::service_unavailable(format!("TLS handshake with {} failed: {}", address, e))
            })?;
            ClientStream::Tls { stream: tls }
        } else {
            ClientStream::Plain { stream: tcp }
        };

        let version = self.handshake.perform(&mut stream).await?;
        self.logger
            .debug(format!("Negotiated Bolt {} with {}", version, address));

        let (channel, inbound) = TcpChannel::start(address.clone(), stream, self.logger.clone());
        Ok(OpenedChannel {
            channel: Arc::new(channel),
            version,
            inbound,
        })
    }
}
