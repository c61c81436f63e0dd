use thiserror::Error;

/// 日志模块统一错误类型
///
/// 构造期错误（配置、占位符、打开目标文件失败）会同步返回给调用方；
/// 写入循环内部的运行时 IO 错误不会出现在这里，它们被就地抑制并输出诊断信息。
#[derive(Error, Debug)]
pub enum LogError {
    #[error("配置错误: {0}")]
    Configuration(String),

    #[error("不支持的占位符: {code}")]
    UnsupportedPlaceholder { code: String },

    #[error("无法打开日志文件: {path}")]
    DestinationOpen {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("目标已关闭")]
    TargetClosed,
}

/// 日志模块统一 Result 类型
pub type Result<T> = std::result::Result<T, LogError>;
