//! Cancelable Job Controller
//!
//! 순차 작업 체인을 하나의 데드라인 아래에서 실행합니다.
//!
//! - 각 작업은 이전 작업의 결과와 공유 [`CancelationToken`] 을 받습니다.
//! - 타임아웃이 먼저 오면 호출자는 즉시 `reason()` 에러를 받고, 토큰은 취소
//!   상태가 됩니다. 작업 자체는 강제로 중단되지 않습니다.
//! - 타임아웃 이후에 끝난 작업의 결과는 `on_timeout` 훅으로 전달되어 정리에
//!   쓰입니다 (예: 늦게 열린 연결 닫기).

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::oneshot;

use super::error::{DriverError, DriverResult};

// ============================================================================
// CancelationToken - 취소 토큰
// ============================================================================

/// 취소 여부를 알려주는 불변 토큰
#[derive(Clone)]
pub struct CancelationToken {
    predicate: Arc<dyn Fn() -> bool + Send + Sync>,
}

impl CancelationToken {
    pub fn new(predicate: impl Fn() -> bool + Send + Sync + 'static) -> Self {
        Self {
            predicate: Arc::new(predicate),
        }
    }

    /// 절대 취소되지 않는 토큰
    pub fn never() -> Self {
        Self::new(|| false)
    }

    /// 플래그 기반 토큰
    pub fn from_flag(flag: Arc<AtomicBool>) -> Self {
        Self::new(move || flag.load(Ordering::Acquire))
    }

    pub fn is_cancelation_requested(&self) -> bool {
        (self.predicate)()
    }

    /// 둘 중 하나라도 취소되면 취소되는 토큰
    pub fn combine(a: &CancelationToken, b: &CancelationToken) -> CancelationToken {
        let (a, b) = (a.clone(), b.clone());
        Self::new(move || a.is_cancelation_requested() || b.is_cancelation_requested())
    }

    /// 취소되었으면 `error` (없으면 기본 취소 에러) 반환
    pub fn throw_if_cancelation_requested(&self, error: Option<DriverError>) -> DriverResult<()> {
        if self.is_cancelation_requested() {
            return Err(error.unwrap_or_else(|| DriverError::cancelled("Operation was canceled")));
        }
        Ok(())
    }
}

impl Default for CancelationToken {
    fn default() -> Self {
        Self::never()
    }
}

impl fmt::Debug for CancelationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelationToken")
            .field("requested", &self.is_cancelation_requested())
            .finish()
    }
}

// ============================================================================
// Job - 작업
// ============================================================================

type JobFn<I, O> = Box<dyn FnOnce(I, CancelationToken) -> BoxFuture<'static, DriverResult<O>> + Send>;
type TimeoutHook<O> = Box<dyn FnOnce(O) -> BoxFuture<'static, ()> + Send>;
type HookSlot<O> = Arc<Mutex<Option<TimeoutHook<O>>>>;
type Step<I, O> =
    Box<dyn FnOnce(I, CancelationToken, Arc<AtomicBool>) -> BoxFuture<'static, DriverResult<O>> + Send>;

/// 체인의 한 단계
pub struct Job<I, O> {
    run: JobFn<I, O>,
    on_timeout: Option<TimeoutHook<O>>,
}

impl<I, O> Job<I, O>
where
    I: Send + 'static,
    O: Send + 'static,
{
    pub fn new<F, Fut>(run: F) -> Self
    where
        F: FnOnce(I, CancelationToken) -> Fut + Send + 'static,
        Fut: Future<Output = DriverResult<O>> + Send + 'static,
    {
        Self {
            run: Box::new(move |input, token| run(input, token).boxed()),
            on_timeout: None,
        }
    }

    /// 타임아웃 이후에 끝난 결과를 받을 정리 훅
    pub fn with_on_timeout<F, Fut>(mut self, hook: F) -> Self
    where
        F: FnOnce(O) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.on_timeout = Some(Box::new(move |value| hook(value).boxed()));
        self
    }
}

/// 순차 작업 체인
pub struct JobChain<I, O> {
    step: Step<I, O>,
    last_hook: HookSlot<O>,
}

impl<I, O> JobChain<I, O>
where
    I: Send + 'static,
    O: Send + 'static,
{
    pub fn new(job: Job<I, O>) -> Self {
        let last_hook: HookSlot<O> = Arc::new(Mutex::new(job.on_timeout));
        let slot = last_hook.clone();
        let run = job.run;
        Self {
            step: Box::new(move |input: I, token: CancelationToken, timed_out: Arc<AtomicBool>| {
                async move {
                    let result = run(input, token).await;
                    abandon_if_timed_out(result, &timed_out, &slot).await
                }
                .boxed()
            }),
            last_hook,
        }
    }

    /// 다음 작업 연결
    pub fn then<P>(self, next: Job<O, P>) -> JobChain<I, P>
    where
        P: Send + 'static,
    {
        let tail = JobChain::new(next);
        let head = self.step;
        let tail_step = tail.step;
        JobChain {
            step: Box::new(move |input: I, token: CancelationToken, timed_out: Arc<AtomicBool>| {
                async move {
                    let value = head(input, token.clone(), timed_out.clone()).await?;
                    tail_step(value, token, timed_out).await
                }
                .boxed()
            }),
            last_hook: tail.last_hook,
        }
    }
}

impl<I, O> From<Job<I, O>> for JobChain<I, O>
where
    I: Send + 'static,
    O: Send + 'static,
{
    fn from(job: Job<I, O>) -> Self {
        JobChain::new(job)
    }
}

async fn abandon_if_timed_out<O>(
    result: DriverResult<O>,
    timed_out: &AtomicBool,
    slot: &HookSlot<O>,
) -> DriverResult<O> {
    if !timed_out.load(Ordering::Acquire) {
        return result;
    }
    if let Ok(value) = result {
        let hook = slot.lock().take();
        if let Some(hook) = hook {
            hook(value).await;
        }
    }
    Err(DriverError::cancelled("Job settled after the operation timed out"))
}

// ============================================================================
// TimeoutConfig - 타임아웃 설정
// ============================================================================

/// `run_with_timeout` 설정
#[derive(Clone)]
pub struct TimeoutConfig {
    pub timeout: Option<Duration>,
    reason: Arc<dyn Fn() -> DriverError + Send + Sync>,
    pub cancelation: Option<CancelationToken>,
}

impl TimeoutConfig {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self {
            timeout,
            reason: Arc::new(|| DriverError::timeout("Operation timed out")),
            cancelation: None,
        }
    }

    /// 타임아웃 시 반환할 에러
    pub fn with_reason(mut self, reason: impl Fn() -> DriverError + Send + Sync + 'static) -> Self {
        self.reason = Arc::new(reason);
        self
    }

    /// 호출자 쪽 취소 토큰 (컨트롤러 토큰과 OR 결합)
    pub fn with_cancelation(mut self, token: CancelationToken) -> Self {
        self.cancelation = Some(token);
        self
    }

    pub fn reason(&self) -> DriverError {
        (self.reason)()
    }
}

impl fmt::Debug for TimeoutConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimeoutConfig")
            .field("timeout", &self.timeout)
            .field("cancelation", &self.cancelation)
            .finish()
    }
}

// ============================================================================
// run_with_timeout - 실행
// ============================================================================

/// 체인을 데드라인 안에서 실행
///
/// 먼저 정해진 결과 하나만 반환됩니다. 타임아웃 이후 작업이 에러로 끝나도
/// 다시 반환되지 않습니다.
pub async fn run_with_timeout<I, O>(config: TimeoutConfig, chain: JobChain<I, O>, input: I) -> DriverResult<O>
where
    I: Send + 'static,
    O: Send + 'static,
{
    let timed_out = Arc::new(AtomicBool::new(false));
    let own = CancelationToken::from_flag(timed_out.clone());
    let token = match &config.cancelation {
        Some(outer) => CancelationToken::combine(outer, &own),
        None => own,
    };

    let JobChain { step, last_hook } = chain;
    let (tx, mut rx) = oneshot::channel();
    let flag = timed_out.clone();
    tokio::spawn(async move {
        let result = step(input, token, flag).await;
        // 타임아웃 직후 도착한 값은 마지막 작업의 훅으로 정리
        if let Err(Ok(value)) = tx.send(result) {
            let hook = last_hook.lock().take();
            if let Some(hook) = hook {
                hook(value).await;
            }
        }
    });

    let Some(limit) = config.timeout else {
        return rx
            .await
            .map_err(|_| DriverError::internal("Job task ended without a result"))?;
    };

    match tokio::time::timeout(limit, &mut rx).await {
        Ok(result) => result.map_err(|_| DriverError::internal("Job task ended without a result"))?,
        Err(_) => {
            timed_out.store(true, Ordering::Release);
            rx.close();
            match rx.try_recv() {
                Ok(result) => result,
                Err(_) => Err(config.reason()),
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::sleep;

    fn add(n: i64) -> Job<i64, i64> {
        Job::new(move |value, _token| async move { Ok(value + n) })
    }

    #[tokio::test]
    async fn test_jobs_run_in_sequence() {
        let chain = JobChain::new(add(1)).then(add(10)).then(Job::new(|v: i64, _| async move {
            Ok(format!("v={}", v))
        }));
        let result = run_with_timeout(TimeoutConfig::new(None), chain, 1).await.unwrap();
        assert_eq!(result, "v=12");
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_before_timeout() {
        let chain = JobChain::new(add(1)).then(Job::new(|_: i64, _| async move {
            Err::<i64, _>(DriverError::protocol("bad handshake"))
        }));
        let err = run_with_timeout(TimeoutConfig::new(Some(Duration::from_secs(5))), chain, 0)
            .await
            .unwrap_err();
        assert!(matches!(err, DriverError::Protocol(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_rejects_with_reason_and_runs_hook() {
        let (hook_tx, hook_rx) = oneshot::channel();
        let slow = Job::new(|v: i64, _| async move {
            sleep(Duration::from_secs(2)).await;
            Ok(v * 7)
        })
        .with_on_timeout(move |value| async move {
            let _ = hook_tx.send(value);
        });

        let config = TimeoutConfig::new(Some(Duration::from_secs(1)))
            .with_reason(|| DriverError::service_unavailable("handshake took too long"));
        let err = run_with_timeout(config, JobChain::new(slow), 1).await.unwrap_err();
        assert!(matches!(err, DriverError::ServiceUnavailable(_)));

        assert_eq!(hook_rx.await.unwrap(), 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_stops_chain_and_cleans_up_middle_job() {
        let (hook_tx, hook_rx) = oneshot::channel();
        let (ran_tx, mut ran_rx) = oneshot::channel::<()>();
        let slow = Job::new(|v: i64, _| async move {
            sleep(Duration::from_secs(3)).await;
            Ok(v)
        })
        .with_on_timeout(move |value| async move {
            let _ = hook_tx.send(value);
        });
        let never_reached = Job::new(move |v: i64, _| async move {
            let _ = ran_tx.send(());
            Ok(v)
        });

        let chain = JobChain::new(slow).then(never_reached);
        let err = run_with_timeout(TimeoutConfig::new(Some(Duration::from_secs(1))), chain, 5)
            .await
            .unwrap_err();
        assert!(matches!(err, DriverError::Timeout(_)));
        assert_eq!(hook_rx.await.unwrap(), 5);
        assert!(ran_rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_jobs_observe_cancelation() {
        let (aborted_tx, aborted_rx) = oneshot::channel();
        let polling = Job::new(move |_: (), token: CancelationToken| async move {
            loop {
                if let Err(e) = token.throw_if_cancelation_requested(None) {
                    let _ = aborted_tx.send(e.clone());
                    return Err::<(), _>(e);
                }
                sleep(Duration::from_millis(100)).await;
            }
        });

        let result = run_with_timeout(
            TimeoutConfig::new(Some(Duration::from_millis(250))),
            JobChain::new(polling),
            (),
        )
        .await;
        assert!(matches!(result, Err(DriverError::Timeout(_))));
        assert!(matches!(aborted_rx.await.unwrap(), DriverError::Cancelled(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_outer_cancelation_is_combined() {
        let outer = Arc::new(AtomicBool::new(true));
        let config = TimeoutConfig::new(Some(Duration::from_secs(10)))
            .with_cancelation(CancelationToken::from_flag(outer));
        let job = Job::new(|_: (), token: CancelationToken| async move {
            token.throw_if_cancelation_requested(Some(DriverError::cancelled("caller gave up")))
        });
        let err = run_with_timeout(config, JobChain::new(job), ()).await.unwrap_err();
        assert_eq!(err.to_string(), DriverError::cancelled("caller gave up").to_string());
    }

    #[test]
    fn test_combine_is_or() {
        let a = Arc::new(AtomicBool::new(false));
        let b = Arc::new(AtomicBool::new(false));
        let combined = CancelationToken::combine(
            &CancelationToken::from_flag(a.clone()),
            &CancelationToken::from_flag(b.clone()),
        );
        assert!(!combined.is_cancelation_requested());
        b.store(true, Ordering::SeqCst);
        assert!(combined.is_cancelation_requested());
        b.store(false, Ordering::SeqCst);
        a.store(true, Ordering::SeqCst);
        assert!(combined.is_cancelation_requested());
        assert!(!CancelationToken::never().is_cancelation_requested());
    }
}
