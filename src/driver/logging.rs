//! Logging
//!
//! 명시적으로 생성되어 하위 구성요소로 전달되는 로거입니다. 전역 상태를
//! 쓰지 않으며, 기본 출력은 `tracing` 이벤트입니다.

use std::fmt;
use std::sync::Arc;

/// 로그 레벨
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum LogLevel {
    /// 디버그
    Debug,
    /// 정보
    #[default]
    Info,
    /// 경고
    Warn,
    /// 에러
    Error,
}

impl LogLevel {
    /// 문자열 표현
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 사용자 정의 로그 싱크
pub type LogSink = Arc<dyn Fn(LogLevel, &str) + Send + Sync>;

#[derive(Clone)]
enum Output {
    Tracing,
    Sink(LogSink),
    Disabled,
}

/// 드라이버 로거
///
/// 설정된 레벨 미만의 메시지는 버립니다. 복제 비용이 낮아 풀, 프로바이더,
/// 연결마다 하나씩 들고 다닙니다.
#[derive(Clone)]
pub struct Logger {
    level: LogLevel,
    output: Output,
}

impl Logger {
    /// `tracing` 으로 출력하는 로거
    pub fn tracing(level: LogLevel) -> Self {
        Self {
            level,
            output: Output::Tracing,
        }
    }

    /// 사용자 정의 싱크로 출력하는 로거
    pub fn with_sink(level: LogLevel, sink: impl Fn(LogLevel, &str) + Send + Sync + 'static) -> Self {
        Self {
            level,
            output: Output::Sink(Arc::new(sink)),
        }
    }

    /// 아무것도 출력하지 않는 로거
    pub fn none() -> Self {
        Self {
            level: LogLevel::Error,
            output: Output::Disabled,
        }
    }

    /// 설정된 레벨
    pub fn level(&self) -> LogLevel {
        self.level
    }

    /// 해당 레벨이 출력되는지
    pub fn is_enabled(&self, level: LogLevel) -> bool {
        !matches!(self.output, Output::Disabled) && level >= self.level
    }

    /// 로그 출력
    pub fn log(&self, level: LogLevel, message: &str) {
        if !self.is_enabled(level) {
            return;
        }
        match &self.output {
            Output::Tracing => match level {
                LogLevel::Debug => tracing::debug!(target: "zeta4g_driver_core", "{}", message),
                LogLevel::Info => tracing::info!(target: "zeta4g_driver_core", "{}", message),
                LogLevel::Warn => tracing::warn!(target: "zeta4g_driver_core", "{}", message),
                LogLevel::Error => tracing::error!(target: "zeta4g_driver_core", "{}", message),
            },
            Output::Sink(sink) => sink(level, message),
            Output::Disabled => {}
        }
    }

    pub fn debug(&self, message: impl AsRef<str>) {
        self.log(LogLevel::Debug, message.as_ref());
    }

    pub fn info(&self, message: impl AsRef<str>) {
        self.log(LogLevel::Info, message.as_ref());
    }

    pub fn warn(&self, message: impl AsRef<str>) {
        self.log(LogLevel::Warn, message.as_ref());
    }

    pub fn error(&self, message: impl AsRef<str>) {
        self.log(LogLevel::Error, message.as_ref());
    }
}

impl Default for Logger {
    fn default() -> Self {
        Self::tracing(LogLevel::default())
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let output = match self.output {
            Output::Tracing => "tracing",
            Output::Sink(_) => "sink",
            Output::Disabled => "disabled",
        };
        f.debug_struct("Logger")
            .field("level", &self.level)
            .field("output", &output)
            .finish()
    }
}
