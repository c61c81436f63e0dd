use crate::error::{LogError, Result};

/// 模板占位符
///
/// 固定集合，在构造配置时整体校验；出现未知代码立即失败，
/// 不会延迟到格式化阶段才发现。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Placeholder {
    /// `%n` 应用名称
    AppName,
    /// `%L` 日志级别（按调用方传入的值输出）
    Level,
    /// `%M` 日志消息（去除分隔符并做上下文替换）
    Message,
    /// `%T` 高精度时间戳（秒级格式 + 固定宽度小数）
    Timestamp,
    /// `%t` 秒级时间戳
    TimestampSec,
    /// `%Q` 请求/关联 ID，缺省时生成新的唯一 ID
    RequestId,
    /// `%H` 主机标识
    Host,
    /// `%P` 进程 ID
    Pid,
    /// `%D` 部署/传输标记，默认 cli
    Transport,
    /// `%R` 请求路径，去除配置的根路径前缀
    Route,
    /// `%m` 请求方法，统一小写
    Method,
    /// `%I` 本机网络地址
    LocalIp,
    /// `%F` 调用位置（文件:行号）
    CallerFile,
    /// `%C` 调用位置（模块路径）
    CallerModule,
    /// `%U` 当前内存占用
    MemUsage,
    /// `%u` 内存占用峰值
    MemPeak,
}

impl Placeholder {
    /// 从 `%X` 代码解析占位符，未知代码返回错误
    pub fn from_code(code: &str) -> Result<Self> {
        match code {
            "%n" => Ok(Placeholder::AppName),
            "%L" => Ok(Placeholder::Level),
            "%M" => Ok(Placeholder::Message),
            "%T" => Ok(Placeholder::Timestamp),
            "%t" => Ok(Placeholder::TimestampSec),
            "%Q" => Ok(Placeholder::RequestId),
            "%H" => Ok(Placeholder::Host),
            "%P" => Ok(Placeholder::Pid),
            "%D" => Ok(Placeholder::Transport),
            "%R" => Ok(Placeholder::Route),
            "%m" => Ok(Placeholder::Method),
            "%I" => Ok(Placeholder::LocalIp),
            "%F" => Ok(Placeholder::CallerFile),
            "%C" => Ok(Placeholder::CallerModule),
            "%U" => Ok(Placeholder::MemUsage),
            "%u" => Ok(Placeholder::MemPeak),
            _ => Err(LogError::UnsupportedPlaceholder {
                code: code.to_string(),
            }),
        }
    }

    /// 占位符对应的 `%X` 代码
    pub fn code(&self) -> &'static str {
        match self {
            Placeholder::AppName => "%n",
            Placeholder::Level => "%L",
            Placeholder::Message => "%M",
            Placeholder::Timestamp => "%T",
            Placeholder::TimestampSec => "%t",
            Placeholder::RequestId => "%Q",
            Placeholder::Host => "%H",
            Placeholder::Pid => "%P",
            Placeholder::Transport => "%D",
            Placeholder::Route => "%R",
            Placeholder::Method => "%m",
            Placeholder::LocalIp => "%I",
            Placeholder::CallerFile => "%F",
            Placeholder::CallerModule => "%C",
            Placeholder::MemUsage => "%U",
            Placeholder::MemPeak => "%u",
        }
    }
}

/// 解析并校验整个模板
///
/// 任意一个代码非法都会让配置构造立即失败
pub fn parse_template(codes: &[String]) -> Result<Vec<Placeholder>> {
    codes.iter().map(|code| Placeholder::from_code(code)).collect()
}
