use crate::error::{LogError, Result};
use crate::record::LogRecord;
use crate::target::{LineFilter, LogTarget};
use colored::{Color, Colorize};
use serde::Deserialize;
use smart_default::SmartDefault;
use std::io::{self, Write};

/// 输出流
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsoleStream {
    Stdout,
    Stderr,
}

/// ConsoleTarget 配置
#[derive(Debug, Clone, Deserialize, SmartDefault)]
#[serde(default)]
pub struct ConsoleTargetConfig {
    /// 输出流
    #[default(ConsoleStream::Stdout)]
    pub stream: ConsoleStream,

    /// 是否按记录携带的颜色标记着色
    #[default = true]
    pub colored: bool,

    /// 字段分隔符
    #[default(" | ".to_string())]
    pub split: String,

    /// 级别白名单（大小写不敏感），为空表示不过滤
    pub level_filter: Vec<String>,

    /// 级别字段在行内的位置
    #[default = 1]
    pub level_index: usize,
}

/// 终端输出目标
///
/// 终端写入足够便宜，不走队列，导出时直接逐行写出；
/// 行级原子性由标准流的锁保证。着色表由 colored 提供。
pub struct ConsoleTarget {
    config: ConsoleTargetConfig,
    filter: LineFilter,
}

impl ConsoleTarget {
    /// 从配置创建 ConsoleTarget
    pub fn new(config: ConsoleTargetConfig) -> Result<Self> {
        if config.split.is_empty() {
            return Err(LogError::Configuration("split 不能为空".to_string()));
        }
        let filter = LineFilter::new(&config.split, &config.level_filter, config.level_index);
        Ok(Self { config, filter })
    }
}

#[async_trait::async_trait]
impl LogTarget for ConsoleTarget {
    async fn export(&self, records: &[LogRecord], _flush: bool) -> Result<()> {
        for record in records {
            let Some(line) = self.filter.normalize(record) else {
                continue;
            };
            let line = match (&record.color, self.config.colored) {
                (Some(color), true) => line.as_str().color(Color::from(color.as_str())).to_string(),
                _ => line,
            };
            match self.config.stream {
                ConsoleStream::Stdout => {
                    let mut out = io::stdout().lock();
                    writeln!(out, "{}", line)?;
                }
                ConsoleStream::Stderr => {
                    let mut out = io::stderr().lock();
                    writeln!(out, "{}", line)?;
                }
            }
        }
        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        match self.config.stream {
            ConsoleStream::Stdout => io::stdout().lock().flush()?,
            ConsoleStream::Stderr => io::stderr().lock().flush()?,
        }
        Ok(())
    }
}
