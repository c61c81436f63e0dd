//! logx - 异步缓冲日志管道
//!
//! 面向并发服务进程的日志库：日志调用经占位符模板渲染为有序字段记录，
//! 再异步派发到可插拔的输出目标，调用方永远不会被落盘 IO 阻塞。
//!
//! # 特性
//!
//! - 占位符模板：级别、消息、时间戳、请求信息、调用位置、内存占用等固定集合，配置期校验
//! - 文件目标：多生产者队列 + 单写入循环，按落盘文件分批写入，按大小切分，句柄池管理
//! - 终端目标：按记录颜色标记着色输出
//! - 级别白名单过滤（大小写不敏感），入队前生效
//! - 显式生命周期：shutdown 恰好一次完成最后的强制刷新
//! - 完全异步，基于 tokio
//!
//! # 快速开始
//!
//! ```rust,no_run
//! use logx::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     // 使用 json5::from_str 构建配置
//!     let target_config: FileTargetConfig = json5::from_str(r#"
//!         {
//!             base_path: "logs/app.log",
//!             max_file_size_kb: 10240,
//!             max_log_files: 5,
//!         }
//!     "#)?;
//!     let logger_config: LoggerConfig = json5::from_str(r#"
//!         {
//!             formatter: {
//!                 app_name: "demo",
//!                 template: ["%n", "%T", "%L", "%M"],
//!             },
//!             tick_interval_seconds: 5,
//!         }
//!     "#)?;
//!
//!     let target: Arc<dyn LogTarget> = Arc::new(FileTarget::new(target_config)?);
//!     let logger = Logger::new(logger_config, vec![target])?;
//!
//!     // 使用 Logger
//!     logger.info("Application started");
//!     logger.error("Connection failed");
//!
//!     // 退出前由宿主显式关闭，完成最后一轮强制刷新
//!     logger.shutdown().await;
//!
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod formatter;
pub mod level;
pub mod logger;
pub mod macros;
pub mod record;
pub mod target;
pub mod template;

// 重新导出核心类型
pub use error::{LogError, Result};
pub use formatter::{TemplateFormatter, TemplateFormatterConfig};
pub use level::LogLevel;
pub use logger::{Logger, LoggerConfig};
pub use record::{CallSite, LogContext, LogRecord, RecordBody};
pub use target::{
    ConsoleStream, ConsoleTarget, ConsoleTargetConfig, FileTarget, FileTargetConfig, LogTarget,
};
pub use template::Placeholder;
