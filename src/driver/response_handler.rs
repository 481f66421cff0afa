//! Response Handler
//!
//! 연결마다 하나씩 존재하는 FIFO 디스패처입니다. 요청을 보낼 때 등록한
//! 옵저버가 큐의 순서대로 응답을 받습니다.
//!
//! - RECORD 는 맨 앞 옵저버에 전달만 하고,
//! - SUCCESS / FAILURE / IGNORED 는 맨 앞 옵저버를 꺼내 종료시킵니다.
//!
//! 대기 중인 옵저버가 없는데 응답이 오면 프로토콜 위반이며 연결 수준의
//! 치명적 에러로 보고됩니다.

use std::collections::VecDeque;
use std::fmt;

use tokio::sync::oneshot;

use crate::bolt::{BoltResponse, PackStreamValue, SuccessMessage};

use super::error::{DriverError, DriverResult, ServerError};

// ============================================================================
// ResponseObserver - 응답 옵저버
// ============================================================================

/// 요청 하나에 대응하는 콜백 묶음
///
/// `on_completed` 와 `on_error` 중 정확히 하나가 정확히 한 번 호출됩니다.
pub trait ResponseObserver: Send {
    /// RECORD 수신
    fn on_record(&mut self, _fields: Vec<PackStreamValue>) {}

    /// SUCCESS 수신
    fn on_completed(&mut self, metadata: SuccessMessage);

    /// FAILURE / IGNORED 수신 또는 연결 실패
    fn on_error(&mut self, error: DriverError);
}

/// 카운트 변경 콜백
pub type CountChanged = Box<dyn Fn(usize) + Send + Sync>;

// ============================================================================
// ResponseHandler - 응답 디스패처
// ============================================================================

/// 응답 디스패처
pub struct ResponseHandler {
    observers: VecDeque<Box<dyn ResponseObserver>>,
    current_failure: Option<ServerError>,
    on_count_changed: Option<CountChanged>,
}

impl ResponseHandler {
    pub fn new() -> Self {
        Self {
            observers: VecDeque::new(),
            current_failure: None,
            on_count_changed: None,
        }
    }

    /// 대기 옵저버 수가 바뀔 때마다 호출될 콜백
    pub fn with_count_changed(mut self, callback: impl Fn(usize) + Send + Sync + 'static) -> Self {
        self.on_count_changed = Some(Box::new(callback));
        self
    }

    /// 대기 중인 옵저버 수
    pub fn pending(&self) -> usize {
        self.observers.len()
    }

    /// 이전 FAILURE (다음 SUCCESS 까지 유지)
    pub fn current_failure(&self) -> Option<&ServerError> {
        self.current_failure.as_ref()
    }

    /// 옵저버 등록
    pub fn enqueue(&mut self, observer: Box<dyn ResponseObserver>) {
        self.observers.push_back(observer);
        self.notify_count();
    }

    /// 응답 하나를 맨 앞 옵저버에 전달
    pub fn handle_response(&mut self, response: BoltResponse) -> DriverResult<()> {
        if self.observers.is_empty() {
            return Err(DriverError::protocol(format!(
                "Unexpected {} with no pending request",
                response.name()
            )));
        }

        match response {
            BoltResponse::Record(record) => {
                if let Some(observer) = self.observers.front_mut() {
                    observer.on_record(record.fields);
                }
            }
            BoltResponse::Success(metadata) => {
                // 실패 상태는 RESET 의 SUCCESS 로 풀림
                self.current_failure = None;
                if let Some(mut observer) = self.dequeue() {
                    observer.on_completed(metadata);
                }
            }
            BoltResponse::Failure(failure) => {
                let error = ServerError::from(failure);
                self.current_failure = Some(error.clone());
                if let Some(mut observer) = self.dequeue() {
                    observer.on_error(DriverError::Server(error));
                }
            }
            BoltResponse::Ignored => {
                let error = match &self.current_failure {
                    Some(failure) => DriverError::Server(failure.clone()),
                    None => DriverError::protocol(
                        "Ignored either because of an error or RESET",
                    ),
                };
                if let Some(mut observer) = self.dequeue() {
                    observer.on_error(error);
                }
            }
        }
        Ok(())
    }

    /// 모든 대기 옵저버를 에러로 종료
    pub fn fail_all(&mut self, error: DriverError) {
        let observers: Vec<_> = self.observers.drain(..).collect();
        if !observers.is_empty() {
            self.notify_count();
        }
        for mut observer in observers {
            observer.on_error(error.clone());
        }
    }

    fn dequeue(&mut self) -> Option<Box<dyn ResponseObserver>> {
        let observer = self.observers.pop_front();
        self.notify_count();
        observer
    }

    fn notify_count(&self) {
        if let Some(callback) = &self.on_count_changed {
            callback(self.observers.len());
        }
    }
}

impl Default for ResponseHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ResponseHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseHandler")
            .field("pending", &self.observers.len())
            .field("current_failure", &self.current_failure)
            .finish()
    }
}

// ============================================================================
// Observers - 기본 옵저버
// ============================================================================

/// 레코드와 요약을 모은 결과
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CollectedResponse {
    pub records: Vec<Vec<PackStreamValue>>,
    pub summary: SuccessMessage,
}

/// 응답을 모아 [`PendingResponse`] 로 넘기는 옵저버
pub struct ResponseCollector {
    records: Vec<Vec<PackStreamValue>>,
    tx: Option<oneshot::Sender<DriverResult<CollectedResponse>>>,
}

impl ResponseCollector {
    pub fn new() -> (Self, PendingResponse) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                records: Vec::new(),
                tx: Some(tx),
            },
            PendingResponse { rx },
        )
    }

    pub fn boxed() -> (Box<dyn ResponseObserver>, PendingResponse) {
        let (collector, pending) = Self::new();
        (Box::new(collector), pending)
    }

    fn finish(&mut self, result: DriverResult<CollectedResponse>) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(result);
        }
    }
}

impl ResponseObserver for ResponseCollector {
    fn on_record(&mut self, fields: Vec<PackStreamValue>) {
        self.records.push(fields);
    }

    fn on_completed(&mut self, summary: SuccessMessage) {
        let records = std::mem::take(&mut self.records);
        self.finish(Ok(CollectedResponse { records, summary }));
    }

    fn on_error(&mut self, error: DriverError) {
        self.finish(Err(error));
    }
}

impl Drop for ResponseCollector {
    fn drop(&mut self) {
        self.finish(Err(DriverError::service_unavailable(
            "Connection dropped before the response arrived",
        )));
    }
}

/// [`ResponseCollector`] 의 결과 대기
#[derive(Debug)]
pub struct PendingResponse {
    rx: oneshot::Receiver<DriverResult<CollectedResponse>>,
}

impl PendingResponse {
    pub async fn wait(self) -> DriverResult<CollectedResponse> {
        self.rx
            .await
            .map_err(|_| DriverError::internal("Response observer dropped"))?
    }
}

/// 결과를 버리는 옵저버 (GOODBYE 전, 파이프라인의 앞 요청 등)
#[derive(Debug, Default)]
pub struct DiscardObserver;

impl ResponseObserver for DiscardObserver {
    fn on_completed(&mut self, _metadata: SuccessMessage) {}

    fn on_error(&mut self, _error: DriverError) {}
}

// ============================================================================
// Tests
// ============================================================================
