//! 日志宏
//!
//! 在调用点自动捕获文件、行号和模块路径，供 `%F`/`%C` 占位符使用。
//!
//! # 示例
//!
//! ```ignore
//! use logx::*;
//!
//! // 简单日志
//! info!(logger, "application started");
//!
//! // 带消息替换的日志
//! info!(logger, "user {user} logged in", "{user}" => "alice");
//! ```

/// 记录 TRACE 级别日志
#[macro_export]
macro_rules! trace {
    ($logger:expr, $msg:expr) => {
        $logger.log(
            $crate::LogLevel::Trace,
            $msg,
            $crate::LogContext::new()
                .with_caller($crate::CallSite::new(file!(), line!(), module_path!())),
        )
    };
    ($logger:expr, $msg:expr, $($key:expr => $value:expr),* $(,)?) => {
        $logger.log(
            $crate::LogLevel::Trace,
            $msg,
            $crate::LogContext::new()
                .with_caller($crate::CallSite::new(file!(), line!(), module_path!()))
                $(.with_value($key, $value))*,
        )
    };
}

/// 记录 DEBUG 级别日志
#[macro_export]
macro_rules! debug {
    ($logger:expr, $msg:expr) => {
        $logger.log(
            $crate::LogLevel::Debug,
            $msg,
            $crate::LogContext::new()
                .with_caller($crate::CallSite::new(file!(), line!(), module_path!())),
        )
    };
    ($logger:expr, $msg:expr, $($key:expr => $value:expr),* $(,)?) => {
        $logger.log(
            $crate::LogLevel::Debug,
            $msg,
            $crate::LogContext::new()
                .with_caller($crate::CallSite::new(file!(), line!(), module_path!()))
                $(.with_value($key, $value))*,
        )
    };
}

/// 记录 INFO 级别日志
///
/// # 示例
///
/// ```ignore
/// info!(logger, "user logged in");
/// info!(logger, "user {user} did {action}", "{user}" => "alice", "{action}" => "login");
/// ```
#[macro_export]
macro_rules! info {
    ($logger:expr, $msg:expr) => {
        $logger.log(
            $crate::LogLevel::Info,
            $msg,
            $crate::LogContext::new()
                .with_caller($crate::CallSite::new(file!(), line!(), module_path!())),
        )
    };
    ($logger:expr, $msg:expr, $($key:expr => $value:expr),* $(,)?) => {
        $logger.log(
            $crate::LogLevel::Info,
            $msg,
            $crate::LogContext::new()
                .with_caller($crate::CallSite::new(file!(), line!(), module_path!()))
                $(.with_value($key, $value))*,
        )
    };
}

/// 记录 WARN 级别日志
#[macro_export]
macro_rules! warn {
    ($logger:expr, $msg:expr) => {
        $logger.log(
            $crate::LogLevel::Warn,
            $msg,
            $crate::LogContext::new()
                .with_caller($crate::CallSite::new(file!(), line!(), module_path!())),
        )
    };
    ($logger:expr, $msg:expr, $($key:expr => $value:expr),* $(,)?) => {
        $logger.log(
            $crate::LogLevel::Warn,
            $msg,
            $crate::LogContext::new()
                .with_caller($crate::CallSite::new(file!(), line!(), module_path!()))
                $(.with_value($key, $value))*,
        )
    };
}

/// 记录 ERROR 级别日志
#[macro_export]
macro_rules! error {
    ($logger:expr, $msg:expr) => {
        $logger.log(
            $crate::LogLevel::Error,
            $msg,
            $crate::LogContext::new()
                .with_caller($crate::CallSite::new(file!(), line!(), module_path!())),
        )
    };
    ($logger:expr, $msg:expr, $($key:expr => $value:expr),* $(,)?) => {
        $logger.log(
            $crate::LogLevel::Error,
            $msg,
            $crate::LogContext::new()
                .with_caller($crate::CallSite::new(file!(), line!(), module_path!()))
                $(.with_value($key, $value))*,
        )
    };
}

#[cfg(test)]
mod tests {
    use crate::logger::{Logger, LoggerConfig};
    use crate::target::{FileTarget, FileTargetConfig, LogTarget};
    use std::sync::Arc;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_macro_captures_call_site() {
        let dir = TempDir::new().unwrap();
        let log_path = dir.path().join("app.log");
        let target = Arc::new(
            FileTarget::new(FileTargetConfig {
                base_path: log_path.to_string_lossy().to_string(),
                ..Default::default()
            })
            .unwrap(),
        );
        target.init().await.unwrap();

        let config: LoggerConfig = json5::from_str(
            r#"
            { formatter: { template: ["%L", "%F", "%M"] } }
            "#,
        )
        .unwrap();
        let logger = Logger::new(config, vec![target]).unwrap();

        crate::info!(logger, "from macro");
        logger.flush(true).await;

        let contents = std::fs::read_to_string(&log_path).unwrap();
        assert!(contents.starts_with("INFO | "));
        // 调用位置被捕获进 %F
        assert!(contents.contains("macros.rs"));
        assert!(contents.trim_end().ends_with("from macro"));
    }

    #[tokio::test]
    async fn test_macro_with_substitutions() {
        let dir = TempDir::new().unwrap();
        let log_path = dir.path().join("app.log");
        let target = Arc::new(
            FileTarget::new(FileTargetConfig {
                base_path: log_path.to_string_lossy().to_string(),
                ..Default::default()
            })
            .unwrap(),
        );
        target.init().await.unwrap();

        let config: LoggerConfig = json5::from_str(
            r#"
            { formatter: { template: ["%L", "%M"] } }
            "#,
        )
        .unwrap();
        let logger = Logger::new(config, vec![target]).unwrap();

        crate::error!(
            logger,
            "user {user} failed {action}",
            "{user}" => "alice",
            "{action}" => "login",
        );
        logger.flush(true).await;

        let contents = std::fs::read_to_string(&log_path).unwrap();
        assert_eq!(contents, "ERROR | user alice failed login\n");
    }
}
