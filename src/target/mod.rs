//! 日志目标
//!
//! 所有目标实现统一的 [`LogTarget`] 契约：`init` 做一次性延迟初始化，
//! `export` 只负责校验与入队、绝不同步执行落盘 IO，`flush` 等待一次强制
//! 排空，`close` 在销毁时把持有的资源恰好释放一次。

pub mod console_target;
pub mod file_target;

use crate::error::Result;
use crate::record::{LogRecord, RecordBody};

pub use console_target::{ConsoleStream, ConsoleTarget, ConsoleTargetConfig};
pub use file_target::{FileTarget, FileTargetConfig};

/// 日志目标 trait
#[async_trait::async_trait]
pub trait LogTarget: Send + Sync {
    /// 一次性延迟初始化（解析并创建目标目录等），在首次投递前调用，
    /// 对同一实例重复调用必须无副作用
    async fn init(&self) -> Result<()> {
        Ok(())
    }

    /// 接收一批记录
    ///
    /// 只做校验与入队，阻塞调用方的开销不得超过这一步；
    /// `flush` 为 true 时额外触发一次立即排空
    async fn export(&self, records: &[LogRecord], flush: bool) -> Result<()>;

    /// 等待一次强制排空完成（默认空操作）
    async fn flush(&self) -> Result<()> {
        Ok(())
    }

    /// 销毁目标，释放全部资源，恰好一次（默认空操作）
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// 行归一化器
///
/// 各目标共享的入队前处理：预拼接的整行先去除首尾空白再按分隔符拆开，
/// 按级别字段位置做大小写不敏感的白名单过滤，再用分隔符重组。
/// 颜色标记单独携带在记录上，天然不会进入重组后的文本。
pub(crate) struct LineFilter {
    split: String,
    levels: Vec<String>,
    level_index: usize,
}

impl LineFilter {
    pub(crate) fn new(split: &str, levels: &[String], level_index: usize) -> Self {
        Self {
            split: split.to_string(),
            levels: levels.iter().map(|level| level.to_lowercase()).collect(),
            level_index,
        }
    }

    /// 归一化一条记录，被过滤掉时返回 None
    pub(crate) fn normalize(&self, record: &LogRecord) -> Option<String> {
        let fields: Vec<String> = match &record.body {
            RecordBody::Fields(fields) => fields.clone(),
            RecordBody::Joined(line) => line
                .trim()
                .split(self.split.as_str())
                .map(|field| field.to_string())
                .collect(),
        };

        if !self.levels.is_empty() {
            // 级别字段缺失的行同样视为未命中白名单
            let level = fields.get(self.level_index)?.to_lowercase();
            if !self.levels.contains(&level) {
                return None;
            }
        }

        Some(fields.join(&self.split))
    }
}
